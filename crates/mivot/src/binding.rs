//! Binding ATTRIBUTE `ref`s to table columns and filling them from rows.

use indexmap::IndexMap;
use log::trace;

use mivot_core::{
    table::{Table, Value},
    tree::{ColumnBinding, NodeId, Tree},
    vocabulary::{NOT_SET, Tag, attr},
};
use mivot_parser::error::{Diagnostic, ErrorCode};

/// Column positions and units of one table, keyed by the FIELD identifier
/// (`ID`, else `name`, else `ref`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMaps {
    indices: IndexMap<String, usize>,
    units: IndexMap<String, Option<String>>,
}

impl ColumnMaps {
    /// Build both maps in one scan of the table fields. A field with an
    /// `ID` is reachable by that `ID` only. A later field sharing an
    /// identifier with an earlier one replaces it.
    pub fn for_table(table: &Table) -> Self {
        let mut maps = Self::default();
        for (index, field) in table.fields().iter().enumerate() {
            let Some(key) = field.identifier() else {
                continue;
            };
            maps.indices.insert(key.to_string(), index);
            maps.units.insert(key.to_string(), field.unit().map(str::to_string));
        }
        maps
    }

    pub fn index(&self, column: &str) -> Option<usize> {
        self.indices.get(column).copied()
    }

    pub fn unit(&self, column: &str) -> Option<&str> {
        self.units.get(column).and_then(|unit| unit.as_deref())
    }

    pub fn indices(&self) -> &IndexMap<String, usize> {
        &self.indices
    }

    pub fn units(&self) -> &IndexMap<String, Option<String>> {
        &self.units
    }

    pub fn into_parts(self) -> (IndexMap<String, usize>, IndexMap<String, Option<String>>) {
        (self.indices, self.units)
    }
}

/// Outcome of [`bind_columns`].
#[derive(Debug, Clone, Default)]
pub struct BindReport {
    /// ATTRIBUTEs newly bound to a column.
    pub bound: usize,
    /// One warning per ATTRIBUTE whose `ref` names no column of the table.
    pub unmatched: Vec<Diagnostic>,
}

/// Attach a [`ColumnBinding`] to every unbound ATTRIBUTE below `root`
/// whose `ref` names a column of `maps`.
///
/// Attributes already bound keep their binding, so binding a subtree twice
/// changes nothing.
pub fn bind_columns(tree: &mut Tree, root: NodeId, maps: &ColumnMaps) -> BindReport {
    let mut report = BindReport::default();
    for id in tree.descendants_tagged(root, &Tag::Attribute) {
        let node = tree.node(id);
        if node.binding().is_some() {
            continue;
        }
        let Some(column) = node.attribute(attr::REF).filter(|column| *column != NOT_SET) else {
            continue;
        };
        match maps.index(column) {
            Some(index) => {
                let unit = maps.unit(column).map(str::to_string);
                tree.node_mut(id).set_binding(ColumnBinding::new(index, unit));
                report.bound += 1;
            }
            None => report.unmatched.push(
                Diagnostic::warning(format!("ATTRIBUTE ref `{column}` matches no column"))
                    .with_optional_label(node.span(), "left unset in every row"),
            ),
        }
    }
    report
}

/// Write the cells of `row` into the bound ATTRIBUTEs below `root`.
///
/// Each filled attribute gets `value` set to the cell text (`NotSet` for
/// null cells) and, when it declares none, the column unit. Pinned
/// attributes are left untouched; with `pin` set, filled attributes are
/// pinned so later fills skip them.
///
/// # Errors
///
/// Returns an `E304` diagnostic when a binding points past the end of the row.
pub fn fill_values(tree: &mut Tree, root: NodeId, row: &[Value], pin: bool) -> Result<usize, Diagnostic> {
    let mut filled = 0;
    for id in tree.descendants_tagged(root, &Tag::Attribute) {
        let node = tree.node_mut(id);
        let Some(binding) = node.binding().filter(|binding| !binding.is_pinned()) else {
            continue;
        };
        let index = binding.index();
        let unit = binding.unit().map(str::to_string);

        let cell = row.get(index).ok_or_else(|| {
            Diagnostic::error(format!(
                "column {index} is bound but the row has {} cells",
                row.len()
            ))
            .with_code(ErrorCode::E304)
            .with_optional_label(node.span(), "bound attribute")
        })?;

        node.set_attribute(attr::VALUE, cell.annotation_text());
        if node.attribute(attr::UNIT).is_none() {
            if let Some(unit) = unit {
                node.set_attribute(attr::UNIT, unit);
            }
        }
        if pin {
            if let Some(binding) = node.binding_mut() {
                binding.pin();
            }
        }
        filled += 1;
    }
    trace!(filled, pinned = pin; "Row values filled");
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use mivot_core::table::Field;
    use mivot_parser::parse_annotation;

    use super::*;

    fn table() -> Table {
        Table::new()
            .with_id("Results")
            .with_field(Field::new().with_id("_ra").with_name("ra").with_unit("deg"))
            .with_field(Field::new().with_name("obj"))
            .with_row(vec![Value::Float(10.5), Value::Null])
    }

    fn template() -> Tree {
        parse_annotation(
            r#"<VODML><TEMPLATES><INSTANCE dmtype="meas:Position">
                <ATTRIBUTE dmrole="meas:Position.ra" dmtype="ivoa:RealQuantity" ref="_ra"/>
                <ATTRIBUTE dmrole="meas:Position.name" dmtype="ivoa:string" ref="obj"/>
                <ATTRIBUTE dmrole="meas:Position.dec" dmtype="ivoa:RealQuantity" ref="_dec"/>
                <ATTRIBUTE dmrole="meas:Position.frame" dmtype="ivoa:string" value="ICRS"/>
            </INSTANCE></TEMPLATES></VODML>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_column_maps_for_table() {
        let maps = ColumnMaps::for_table(&table());
        assert_eq!(maps.index("_ra"), Some(0));
        assert_eq!(maps.index("ra"), None);
        assert_eq!(maps.index("obj"), Some(1));
        assert_eq!(maps.unit("_ra"), Some("deg"));
        assert_eq!(maps.unit("obj"), None);
        assert_eq!(maps, ColumnMaps::for_table(&table()));
    }

    #[test]
    fn test_column_maps_last_field_wins() {
        let table = Table::new()
            .with_field(Field::new().with_name("flux"))
            .with_field(Field::new().with_name("flux").with_unit("mJy"));
        let maps = ColumnMaps::for_table(&table);
        assert_eq!(maps.index("flux"), Some(1));
        assert_eq!(maps.unit("flux"), Some("mJy"));
    }

    #[test]
    fn test_column_maps_id_shadows_name() {
        let table = Table::new()
            .with_field(Field::new().with_id("q").with_unit("km"))
            .with_field(Field::new().with_id("p").with_name("q").with_unit("s"));
        let maps = ColumnMaps::for_table(&table);
        assert_eq!(maps.index("q"), Some(0));
        assert_eq!(maps.unit("q"), Some("km"));
        assert_eq!(maps.index("p"), Some(1));
        assert_eq!(maps.indices().len(), 2);

        let mut tree = parse_annotation(
            r#"<VODML><TEMPLATES><INSTANCE dmtype="test:Pair">
                <ATTRIBUTE dmrole="test:Pair.q" dmtype="ivoa:real" ref="q"/>
            </INSTANCE></TEMPLATES></VODML>"#,
        )
        .unwrap();
        let root = tree.root();
        bind_columns(&mut tree, root, &maps);
        fill_values(&mut tree, root, &[Value::Float(1.5), Value::Float(9.0)], false).unwrap();
        let q = tree.descendants_tagged(root, &Tag::Attribute)[0];
        assert_eq!(tree.node(q).attribute(attr::VALUE), Some("1.5"));
        assert_eq!(tree.node(q).attribute(attr::UNIT), Some("km"));
    }

    #[test]
    fn test_bind_columns_reports_unmatched() {
        let mut tree = template();
        let root = tree.root();
        let report = bind_columns(&mut tree, root, &ColumnMaps::for_table(&table()));
        assert_eq!(report.bound, 2);
        assert_eq!(report.unmatched.len(), 1);
        assert!(report.unmatched[0].severity().is_warning());
        assert_eq!(report.unmatched[0].message(), "ATTRIBUTE ref `_dec` matches no column");

        let again = bind_columns(&mut tree, root, &ColumnMaps::for_table(&table()));
        assert_eq!(again.bound, 0);
    }

    #[test]
    fn test_fill_values() {
        let mut tree = template();
        let root = tree.root();
        bind_columns(&mut tree, root, &ColumnMaps::for_table(&table()));
        let filled = fill_values(&mut tree, root, table().row(0).unwrap(), false).unwrap();
        assert_eq!(filled, 2);

        let attributes = tree.descendants_tagged(root, &Tag::Attribute);
        let ra = tree.node(attributes[0]);
        assert_eq!(ra.attribute(attr::VALUE), Some("10.5"));
        assert_eq!(ra.attribute(attr::UNIT), Some("deg"));
        assert_eq!(tree.node(attributes[1]).attribute(attr::VALUE), Some(NOT_SET));
        assert_eq!(tree.node(attributes[2]).attribute(attr::VALUE), None);
        assert_eq!(tree.node(attributes[3]).attribute(attr::VALUE), Some("ICRS"));
    }

    #[test]
    fn test_pinned_values_are_kept() {
        let mut tree = template();
        let root = tree.root();
        bind_columns(&mut tree, root, &ColumnMaps::for_table(&table()));
        fill_values(&mut tree, root, &[Value::Float(1.0), Value::Text("a".into())], true).unwrap();

        let filled = fill_values(&mut tree, root, &[Value::Float(2.0), Value::Text("b".into())], false).unwrap();
        assert_eq!(filled, 0);
        let ra = tree.descendants_tagged(root, &Tag::Attribute)[0];
        assert_eq!(tree.node(ra).attribute(attr::VALUE), Some("1"));
    }

    #[test]
    fn test_fill_short_row() {
        let mut tree = template();
        let root = tree.root();
        bind_columns(&mut tree, root, &ColumnMaps::for_table(&table()));
        let err = fill_values(&mut tree, root, &[Value::Float(1.0)], false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E304));
    }
}
