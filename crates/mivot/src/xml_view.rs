//! Queries over a resolved row snapshot.

use mivot_core::{
    instance::{Collection, MivotInstance},
    tree::{NodeId, Tree},
    vocabulary::Tag,
};
use mivot_parser::{
    ViewBuilder,
    error::{Diagnostic, ErrorCode},
};

use crate::error::MivotError;

/// A resolved snapshot returned by [`crate::ModelViewer::xml_view`], searchable
/// by dmrole and dmtype.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlView {
    tree: Tree,
}

impl XmlView {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// The first INSTANCE playing `dmrole`.
    pub fn instance_by_role(&self, dmrole: &str) -> Result<NodeId, MivotError> {
        self.instances_by_role(dmrole).map(|found| found[0])
    }

    /// Every INSTANCE playing `dmrole`, in document order.
    ///
    /// # Errors
    ///
    /// Returns an `E401` lookup error when there is none.
    pub fn instances_by_role(&self, dmrole: &str) -> Result<Vec<NodeId>, MivotError> {
        self.find(&Tag::Instance, |tree, id| tree.node(id).dmrole() == Some(dmrole))
            .ok_or_else(|| not_found(ErrorCode::E401, "dmrole", dmrole))
    }

    /// The first INSTANCE of type `dmtype`.
    pub fn instance_by_type(&self, dmtype: &str) -> Result<NodeId, MivotError> {
        self.instances_by_type(dmtype).map(|found| found[0])
    }

    /// Every INSTANCE of type `dmtype`, in document order.
    ///
    /// # Errors
    ///
    /// Returns an `E400` lookup error when there is none.
    pub fn instances_by_type(&self, dmtype: &str) -> Result<Vec<NodeId>, MivotError> {
        self.find(&Tag::Instance, |tree, id| tree.node(id).dmtype() == Some(dmtype))
            .ok_or_else(|| not_found(ErrorCode::E400, "dmtype", dmtype))
    }

    /// The first COLLECTION playing `dmrole`.
    pub fn collection_by_role(&self, dmrole: &str) -> Result<NodeId, MivotError> {
        self.collections_by_role(dmrole).map(|found| found[0])
    }

    pub fn collections_by_role(&self, dmrole: &str) -> Result<Vec<NodeId>, MivotError> {
        self.find(&Tag::Collection, |tree, id| tree.node(id).dmrole() == Some(dmrole))
            .ok_or_else(|| not_found(ErrorCode::E401, "dmrole", dmrole))
    }

    /// Typed view of an INSTANCE found by one of the queries.
    pub fn instance(&self, id: NodeId) -> Result<MivotInstance, MivotError> {
        Ok(ViewBuilder::new(&self.tree).instance(id)?)
    }

    /// Typed view of a COLLECTION found by one of the queries.
    pub fn collection(&self, id: NodeId) -> Result<Collection, MivotError> {
        Ok(ViewBuilder::new(&self.tree).collection(id)?)
    }

    pub fn to_xml_string(&self) -> String {
        self.tree.to_xml_string()
    }

    fn find(&self, tag: &Tag, predicate: impl Fn(&Tree, NodeId) -> bool) -> Option<Vec<NodeId>> {
        let found: Vec<NodeId> = self
            .tree
            .descendants_tagged(self.tree.root(), tag)
            .into_iter()
            .filter(|id| predicate(&self.tree, *id))
            .collect();
        (!found.is_empty()).then_some(found)
    }
}

fn not_found(code: ErrorCode, what: &str, name: &str) -> MivotError {
    Diagnostic::error(format!("Cannot find {what} {name} in any instances of the VOTable"))
        .with_code(code)
        .into()
}
