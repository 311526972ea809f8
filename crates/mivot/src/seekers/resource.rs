//! Table lookups within one VOTable resource.

use indexmap::IndexMap;

use mivot_core::{
    table::{Resource, Table},
    vocabulary::FIRST_TABLE,
};

use crate::binding::ColumnMaps;

/// Finds the tables of a resource and the columns of those tables.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSeeker<'a> {
    resource: &'a Resource,
}

impl<'a> ResourceSeeker<'a> {
    pub fn new(resource: &'a Resource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &'a Resource {
        self.resource
    }

    /// Identifiers of the tables in document order (ID, else name, else
    /// `AnonymousTable`).
    pub fn table_ids(&self) -> Vec<&'a str> {
        self.resource.tables().iter().map(Table::identifier).collect()
    }

    /// The table with the given ID or name. `first_table` selects the first
    /// table of the resource.
    pub fn table(&self, tableref: &str) -> Option<&'a Table> {
        self.table_index(tableref)
            .map(|index| &self.resource.tables()[index])
    }

    /// Position of the table [`Self::table`] would return.
    pub fn table_index(&self, tableref: &str) -> Option<usize> {
        let tables = self.resource.tables();
        if tableref == FIRST_TABLE {
            return (!tables.is_empty()).then_some(0);
        }
        tables
            .iter()
            .position(|table| table.id() == Some(tableref))
            .or_else(|| tables.iter().position(|table| table.name() == Some(tableref)))
            .or_else(|| tables.iter().position(|table| table.identifier() == tableref))
    }

    /// Column positions and units of a table.
    pub fn column_maps(&self, tableref: &str) -> Option<ColumnMaps> {
        self.table(tableref).map(ColumnMaps::for_table)
    }

    /// Column positions keyed by FIELD ID, else name, else ref.
    ///
    /// When two fields share an identifier, the later one wins.
    pub fn column_index_map(&self, tableref: &str) -> Option<IndexMap<String, usize>> {
        self.column_maps(tableref).map(|maps| maps.into_parts().0)
    }

    /// Column units keyed like [`Self::column_index_map`].
    pub fn column_unit_map(&self, tableref: &str) -> Option<IndexMap<String, Option<String>>> {
        self.column_maps(tableref).map(|maps| maps.into_parts().1)
    }
}
