//! Reading VOTable documents with TABLEDATA serialization.
//!
//! Cells are typed from their FIELD `datatype`; an empty cell is
//! [`Value::Null`]. A VODML element found in a RESOURCE is kept as raw text
//! on that resource, to be read by [`crate::parse_annotation`] once a
//! viewer is built over it. [`crate::insert_annotation`] splices a block back
//! into the text of a document.

use std::ops::Range;

use log::{debug, info, trace};
use roxmltree::{Document, Node as XmlNode};

use mivot_core::table::{Field, Resource, Table, Value, VoTable};

use crate::{
    Span,
    error::{Diagnostic, ErrorCode, Result},
    xml::malformed_xml,
};

pub(crate) fn read_votable(source: &str) -> Result<VoTable> {
    let document = Document::parse(source).map_err(|err| malformed_xml(source, &err))?;
    let root = votable_root(&document)?;

    let resources = elements(root, "RESOURCE")
        .map(|resource| read_resource(source, resource))
        .collect::<Result<Vec<_>>>()?;

    debug!(resources = resources.len(); "VOTable read");
    Ok(VoTable::new(resources))
}

/// Write `block` into a VOTable document, wrapped in a `RESOURCE type="meta"`.
///
/// The block goes into the first `results` RESOURCE, or the first RESOURCE
/// when none is typed, ahead of its first LINK, TABLE or RESOURCE child.
/// An annotation already carried by that RESOURCE is an `E005` error unless
/// `replace` is set, in which case the new block takes its place.
pub(crate) fn insert_annotation(source: &str, block: &str, replace: bool) -> Result<String> {
    let document = Document::parse(source).map_err(|err| malformed_xml(source, &err))?;
    let root = votable_root(&document)?;

    let target = elements(root, "RESOURCE")
        .find(|resource| resource.attribute("type") == Some("results"))
        .or_else(|| elements(root, "RESOURCE").next())
        .ok_or_else(|| {
            Diagnostic::error("the VOTable has no RESOURCE to annotate")
                .with_code(ErrorCode::E100)
                .with_label(Span::new(root.range()), "no RESOURCE child")
        })?;

    let meta = format!("<RESOURCE type=\"meta\">\n{}\n</RESOURCE>", block.trim_end());
    let existing = target.children().find(|child| {
        child.is_element()
            && match child.tag_name().name() {
                "VODML" => true,
                "RESOURCE" => elements(*child, "VODML").next().is_some(),
                _ => false,
            }
    });

    let (range, replacement) = match existing {
        Some(existing) if !replace => {
            return Err(Diagnostic::error("the RESOURCE already carries an annotation block")
                .with_code(ErrorCode::E005)
                .with_label(Span::new(existing.range()), "existing annotation")
                .with_help("ask for the block to be replaced to overwrite it"));
        }
        Some(existing) => {
            info!(offset = existing.range().start; "Replacing annotation block");
            (existing.range(), meta)
        }
        None => insertion_point(source, target, meta),
    };

    debug!(offset = range.start; "Annotation block written");
    Ok(format!("{}{}{}", &source[..range.start], replacement, &source[range.end..]))
}

/// Where a new child of `resource` is spliced, and the text that goes there.
fn insertion_point(source: &str, resource: XmlNode<'_, '_>, child: String) -> (Range<usize>, String) {
    let before = resource.children().find(|node| {
        node.is_element() && matches!(node.tag_name().name(), "LINK" | "TABLE" | "RESOURCE")
    });
    if let Some(node) = before {
        let start = node.range().start;
        return (start..start, format!("{child}\n"));
    }

    let range = resource.range();
    let text = &source[range.clone()];
    if text.ends_with("/>") {
        // A self-closing RESOURCE is opened up around the new child.
        let name: String = text[1..]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '/')
            .collect();
        let open_end = range.end - 2;
        return (open_end..range.end, format!(">\n{child}\n</{name}>"));
    }
    let close = text.rfind("</").map_or(range.end, |offset| range.start + offset);
    (close..close, format!("{child}\n"))
}

fn votable_root<'a, 'input>(document: &'a Document<'input>) -> Result<XmlNode<'a, 'input>> {
    let root = document.root_element();
    if root.tag_name().name() != "VOTABLE" {
        return Err(Diagnostic::error(format!(
            "expected a VOTABLE document, found `{}`",
            root.tag_name().name()
        ))
        .with_code(ErrorCode::E003)
        .with_label(Span::new(root.range()), "unexpected root element"));
    }
    Ok(root)
}

fn elements<'a, 'input: 'a>(
    node: XmlNode<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

fn read_resource(source: &str, node: XmlNode<'_, '_>) -> Result<Resource> {
    let mut resource = Resource::new();
    if let Some(id) = node.attribute("ID") {
        resource = resource.with_id(id);
    }
    if let Some(name) = node.attribute("name") {
        resource = resource.with_name(name);
    }
    if let Some(kind) = node.attribute("type") {
        resource = resource.with_kind(kind);
    }

    for child in node.children().filter(|child| child.is_element()) {
        match child.tag_name().name() {
            "TABLE" => resource = resource.with_table(read_table(child)?),
            "RESOURCE" => resource = resource.with_resource(read_resource(source, child)?),
            "VODML" => {
                trace!(offset = child.range().start; "Annotation block found");
                resource = resource.with_annotation(&source[child.range()]);
            }
            _ => {}
        }
    }
    Ok(resource)
}

fn read_table(node: XmlNode<'_, '_>) -> Result<Table> {
    let mut table = Table::new();
    if let Some(id) = node.attribute("ID") {
        table = table.with_id(id);
    }
    if let Some(name) = node.attribute("name") {
        table = table.with_name(name);
    }

    let fields: Vec<Field> = elements(node, "FIELD").map(read_field).collect();
    for field in &fields {
        table = table.with_field(field.clone());
    }

    for data in elements(node, "DATA") {
        for serialization in data.children().filter(|child| child.is_element()) {
            if serialization.tag_name().name() != "TABLEDATA" {
                return Err(Diagnostic::error(format!(
                    "unsupported serialization `{}`",
                    serialization.tag_name().name()
                ))
                .with_code(ErrorCode::E004)
                .with_label(Span::new(serialization.range()), "only TABLEDATA can be read")
                .with_help("convert the table to TABLEDATA before mapping it"));
            }
            for tr in elements(serialization, "TR") {
                table = table.with_row(read_row(&fields, tr)?);
            }
        }
    }

    debug!(
        table = table.identifier(),
        fields = table.fields().len(),
        rows = table.row_count();
        "Table read"
    );
    Ok(table)
}

fn read_field(node: XmlNode<'_, '_>) -> Field {
    let mut field = Field::new();
    if let Some(id) = node.attribute("ID") {
        field = field.with_id(id);
    }
    if let Some(name) = node.attribute("name") {
        field = field.with_name(name);
    }
    if let Some(reference) = node.attribute("ref") {
        field = field.with_ref(reference);
    }
    if let Some(unit) = node.attribute("unit") {
        field = field.with_unit(unit);
    }
    if let Some(datatype) = node.attribute("datatype") {
        field = field.with_datatype(datatype);
    }
    if let Some(arraysize) = node.attribute("arraysize") {
        field = field.with_arraysize(arraysize);
    }
    if let Some(ucd) = node.attribute("ucd") {
        field = field.with_ucd(ucd);
    }
    field
}

fn read_row(fields: &[Field], tr: XmlNode<'_, '_>) -> Result<Vec<Value>> {
    let cells: Vec<_> = elements(tr, "TD").collect();
    if cells.len() != fields.len() {
        return Err(Diagnostic::error(format!(
            "row has {} cells but the table declares {} fields",
            cells.len(),
            fields.len()
        ))
        .with_code(ErrorCode::E004)
        .with_label(Span::new(tr.range()), "cell count mismatch"));
    }

    fields
        .iter()
        .zip(cells)
        .map(|(field, td)| {
            let text = td.text().unwrap_or_default();
            parse_cell(field, text).ok_or_else(|| {
                Diagnostic::error(format!(
                    "cannot read `{text}` as {}",
                    field.datatype().unwrap_or("char")
                ))
                .with_code(ErrorCode::E004)
                .with_label(Span::new(td.range()), "invalid cell")
            })
        })
        .collect()
}

/// Type a cell according to its field, or `None` when the text does not fit.
fn parse_cell(field: &Field, text: &str) -> Option<Value> {
    let datatype = field.datatype().unwrap_or("char");
    if matches!(datatype, "char" | "unicodeChar") {
        return Some(if text.is_empty() {
            Value::Null
        } else {
            Value::Text(text.to_string())
        });
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    let is_array = field.arraysize().is_some_and(|size| size.trim() != "1");
    if is_array {
        return Some(Value::Text(trimmed.to_string()));
    }

    match datatype {
        "boolean" | "bit" => match trimmed.to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Some(Value::Bool(true)),
            "f" | "false" | "0" => Some(Value::Bool(false)),
            "?" => Some(Value::Null),
            _ => None,
        },
        "unsignedByte" | "short" | "int" | "long" => trimmed.parse().ok().map(Value::Int),
        "float" | "double" => trimmed.parse().ok().map(Value::Float),
        _ => Some(Value::Text(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;

    const VOTABLE: &str = r#"<?xml version="1.0"?>
<VOTABLE xmlns="http://www.ivoa.net/xml/VOTable/v1.3" version="1.4">
  <RESOURCE type="results">
    <RESOURCE type="meta">
      <VODML xmlns="http://www.ivoa.net/xml/mivot">
        <TEMPLATES/>
      </VODML>
    </RESOURCE>
    <TABLE ID="Results" name="results">
      <FIELD ID="_ra" name="ra" datatype="double" unit="deg"/>
      <FIELD name="obj" datatype="char" arraysize="*"/>
      <FIELD name="count" datatype="long"/>
      <FIELD name="flag" datatype="boolean"/>
      <DATA>
        <TABLEDATA>
          <TR><TD>10.5</TD><TD>M31</TD><TD>3</TD><TD>T</TD></TR>
          <TR><TD/><TD></TD><TD> 4 </TD><TD>?</TD></TR>
        </TABLEDATA>
      </DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

    #[test]
    fn test_read_votable_structure() {
        let votable = read_votable(VOTABLE).unwrap();
        let resource = votable.resource(0).unwrap();
        assert_eq!(resource.kind(), Some("results"));
        assert_eq!(resource.tables().len(), 1);

        let table = &resource.tables()[0];
        assert_eq!(table.identifier(), "Results");
        assert_eq!(table.fields().len(), 4);
        assert_eq!(table.fields()[0].unit(), Some("deg"));
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_read_votable_typed_cells() {
        let votable = read_votable(VOTABLE).unwrap();
        let table = &votable.resource(0).unwrap().tables()[0];

        let first = table.row(0).unwrap();
        match first[0] {
            Value::Float(ra) => assert!(approx_eq!(f64, ra, 10.5)),
            ref other => panic!("unexpected cell {other:?}"),
        }
        assert_eq!(first[1], Value::Text("M31".into()));
        assert_eq!(first[2], Value::Int(3));
        assert_eq!(first[3], Value::Bool(true));

        let second = table.row(1).unwrap();
        assert_eq!(second, &[Value::Null, Value::Null, Value::Int(4), Value::Null]);
    }

    #[test]
    fn test_read_votable_captures_annotation() {
        let votable = read_votable(VOTABLE).unwrap();
        let block = votable.resource(0).unwrap().annotation_block().unwrap();
        assert!(block.starts_with("<VODML"));
        assert!(block.ends_with("</VODML>"));
    }

    #[test]
    fn test_read_votable_cell_count_mismatch() {
        let source = r#"<VOTABLE><RESOURCE><TABLE>
            <FIELD name="a" datatype="int"/>
            <DATA><TABLEDATA><TR><TD>1</TD><TD>2</TD></TR></TABLEDATA></DATA>
        </TABLE></RESOURCE></VOTABLE>"#;
        let err = read_votable(source).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E004));
    }

    #[test]
    fn test_read_votable_bad_cell() {
        let source = r#"<VOTABLE><RESOURCE><TABLE>
            <FIELD name="a" datatype="int"/>
            <DATA><TABLEDATA><TR><TD>one</TD></TR></TABLEDATA></DATA>
        </TABLE></RESOURCE></VOTABLE>"#;
        let err = read_votable(source).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E004));
        assert!(err.message().contains("`one`"));
    }

    #[test]
    fn test_read_votable_rejects_binary() {
        let source = r#"<VOTABLE><RESOURCE><TABLE>
            <FIELD name="a" datatype="int"/>
            <DATA><BINARY><STREAM encoding="base64">AAAA</STREAM></BINARY></DATA>
        </TABLE></RESOURCE></VOTABLE>"#;
        let err = read_votable(source).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E004));
    }

    #[test]
    fn test_insert_annotation_before_table() {
        let source = r#"<VOTABLE>
  <RESOURCE type="results">
    <TABLE ID="Results"><FIELD name="a" datatype="int"/></TABLE>
  </RESOURCE>
</VOTABLE>"#;
        let written = insert_annotation(source, "<VODML>\n  <GLOBALS/>\n</VODML>\n", false).unwrap();
        assert!(written.contains("<RESOURCE type=\"meta\">\n<VODML>\n  <GLOBALS/>\n</VODML>\n</RESOURCE>\n<TABLE"));

        let votable = read_votable(&written).unwrap();
        let resource = votable.resource(0).unwrap();
        assert_eq!(resource.annotation_block(), Some("<VODML>\n  <GLOBALS/>\n</VODML>"));
        assert_eq!(resource.tables().len(), 1);
    }

    #[test]
    fn test_insert_annotation_into_empty_resource() {
        let written = insert_annotation("<VOTABLE><RESOURCE/></VOTABLE>", "<VODML/>", false).unwrap();
        assert_eq!(
            written,
            "<VOTABLE><RESOURCE>\n<RESOURCE type=\"meta\">\n<VODML/>\n</RESOURCE>\n</RESOURCE></VOTABLE>"
        );
    }

    #[test]
    fn test_insert_annotation_existing_block() {
        let err = insert_annotation(VOTABLE, "<VODML><GLOBALS/></VODML>", false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E005));

        let written = insert_annotation(VOTABLE, "<VODML><GLOBALS/></VODML>", true).unwrap();
        assert_eq!(written.matches("<VODML").count(), 1);
        assert!(!written.contains("<TEMPLATES/>"));
        let votable = read_votable(&written).unwrap();
        assert_eq!(
            votable.resource(0).unwrap().annotation_block(),
            Some("<VODML><GLOBALS/></VODML>")
        );
    }

    #[test]
    fn test_insert_annotation_needs_a_resource() {
        let err = insert_annotation("<VOTABLE/>", "<VODML/>", false).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E100));
    }

    #[test]
    fn test_parse_cell_arrays_stay_text() {
        let field = Field::new().with_datatype("double").with_arraysize("2");
        assert_eq!(
            parse_cell(&field, "1.0 2.0"),
            Some(Value::Text("1.0 2.0".into()))
        );
        let scalar = Field::new().with_datatype("double").with_arraysize("1");
        assert_eq!(parse_cell(&scalar, "2"), Some(Value::Float(2.0)));
    }
}
