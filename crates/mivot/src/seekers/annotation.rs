//! Read-only queries over a parsed annotation block.

use std::fmt;

use indexmap::IndexMap;
use log::debug;

use mivot_core::{
    table::Value,
    tree::{NodeId, Tree},
    vocabulary::{Tag, attr},
};
use mivot_parser::{
    error::{Diagnostic, ErrorCode, ParseError},
    index_templates,
};

/// Where an instance search looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Globals,
    /// The TEMPLATES block of a tableref (`first_table` for the anonymous one).
    Templates(&'a str),
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Globals => write!(f, "GLOBALS"),
            Scope::Templates(tableref) => write!(f, "TEMPLATES tableref={tableref}"),
        }
    }
}

/// dmtypes found at the top of a GLOBALS or TEMPLATES block, by element kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmtypeSummary {
    /// dmtypes of top-level INSTANCE elements.
    pub instances: Vec<String>,
    /// dmtypes of the INSTANCE items of top-level COLLECTION elements.
    pub collections: Vec<String>,
}

/// Indexes the MODEL, GLOBALS and TEMPLATES sections of an annotation block
/// and answers structural queries about them.
///
/// The seeker owns the canonical tree and never mutates it.
#[derive(Debug, Clone)]
pub struct AnnotationSeeker {
    tree: Tree,
    globals: Option<NodeId>,
    templates: IndexMap<String, NodeId>,
}

impl AnnotationSeeker {
    /// Index an annotation tree.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when TEMPLATES tablerefs conflict.
    pub fn new(tree: Tree) -> Result<Self, ParseError> {
        let templates = index_templates(&tree)?;
        let globals = tree.first_child_tagged(tree.root(), &Tag::Globals);
        debug!(
            templates = templates.len(),
            globals = globals.is_some();
            "Annotation indexed"
        );
        Ok(Self {
            tree,
            globals,
            templates,
        })
    }

    /// The canonical annotation tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Declared models: short name to schema URL.
    pub fn models(&self) -> IndexMap<String, Option<String>> {
        self.tree
            .children_tagged(self.tree.root(), &Tag::Model)
            .filter_map(|model| {
                let node = self.tree.node(model);
                let name = node.attribute(attr::NAME)?;
                Some((name.to_string(), node.attribute(attr::URL).map(str::to_string)))
            })
            .collect()
    }

    pub fn globals(&self) -> Option<NodeId> {
        self.globals
    }

    /// Tablerefs of the TEMPLATES blocks, the anonymous one listed as `first_table`.
    pub fn templates_tablerefs(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn has_templates(&self, tableref: &str) -> bool {
        self.templates.contains_key(tableref)
    }

    /// The TEMPLATES block of `tableref`, or the only block when `tableref` is `None`.
    ///
    /// # Errors
    ///
    /// - `E106` if the annotation has no TEMPLATES at all
    /// - `E102` if `tableref` is `None` and several blocks exist
    /// - `E101` if no block is declared for `tableref`
    pub fn templates_block(&self, tableref: Option<&str>) -> Result<NodeId, Diagnostic> {
        if self.templates.is_empty() {
            return Err(Diagnostic::error("the annotation declares no TEMPLATES")
                .with_code(ErrorCode::E106)
                .with_optional_label(self.tree.node(self.tree.root()).span(), "no TEMPLATES"));
        }

        match tableref {
            None if self.templates.len() == 1 => Ok(self.templates[0]),
            None => Err(Diagnostic::error(format!(
                "{} TEMPLATES blocks are declared and no tableref was given",
                self.templates.len()
            ))
            .with_code(ErrorCode::E102)
            .with_help(format!("choose one of {:?}", self.templates_tablerefs()))),
            Some(tableref) => self.templates.get(tableref).copied().ok_or_else(|| {
                Diagnostic::error(format!("unknown tableref `{tableref}`"))
                    .with_code(ErrorCode::E101)
                    .with_help(format!(
                        "declared tablerefs: {:?}",
                        self.templates_tablerefs()
                    ))
            }),
        }
    }

    /// The INSTANCE or COLLECTION heading a TEMPLATES block: the first
    /// top-level INSTANCE, else the first top-level COLLECTION.
    ///
    /// # Errors
    ///
    /// Returns `E205` when the block has neither.
    pub fn head_element(&self, templates: NodeId) -> Result<NodeId, Diagnostic> {
        self.tree
            .first_child_tagged(templates, &Tag::Instance)
            .or_else(|| self.tree.first_child_tagged(templates, &Tag::Collection))
            .ok_or_else(|| {
                let node = self.tree.node(templates);
                Diagnostic::error("no INSTANCE/COLLECTION found in TEMPLATES")
                    .with_code(ErrorCode::E205)
                    .with_optional_label(node.span(), "empty TEMPLATES")
            })
    }

    /// All INSTANCE elements of `scope` with the given dmtype.
    ///
    /// # Errors
    ///
    /// Returns `E400` naming the dmtype and the scope when nothing matches.
    pub fn instances_by_dmtype(&self, dmtype: &str, scope: Scope<'_>) -> Result<Vec<NodeId>, Diagnostic> {
        self.search(scope, |tree, id| tree.node(id).dmtype() == Some(dmtype))
            .and_then(|found| non_empty_result(found, ErrorCode::E400, "dmtype", dmtype, scope))
    }

    /// The first INSTANCE of `scope` with the given dmtype.
    pub fn first_instance_by_dmtype(&self, dmtype: &str, scope: Scope<'_>) -> Result<NodeId, Diagnostic> {
        self.instances_by_dmtype(dmtype, scope).map(|found| found[0])
    }

    /// All INSTANCE elements of `scope` whose dmtype contains `pattern`.
    pub fn instances_by_dmtype_pattern(
        &self,
        pattern: &str,
        scope: Scope<'_>,
    ) -> Result<Vec<NodeId>, Diagnostic> {
        self.search(scope, |tree, id| {
            tree.node(id).dmtype().is_some_and(|dmtype| dmtype.contains(pattern))
        })
        .and_then(|found| non_empty_result(found, ErrorCode::E400, "dmtype pattern", pattern, scope))
    }

    /// All INSTANCE elements of `scope` playing the given dmrole.
    ///
    /// # Errors
    ///
    /// Returns `E401` naming the dmrole and the scope when nothing matches.
    pub fn instances_by_dmrole(&self, dmrole: &str, scope: Scope<'_>) -> Result<Vec<NodeId>, Diagnostic> {
        self.search(scope, |tree, id| tree.node(id).dmrole() == Some(dmrole))
            .and_then(|found| non_empty_result(found, ErrorCode::E401, "dmrole", dmrole, scope))
    }

    /// The first INSTANCE of `scope` playing the given dmrole.
    pub fn first_instance_by_dmrole(&self, dmrole: &str, scope: Scope<'_>) -> Result<NodeId, Diagnostic> {
        self.instances_by_dmrole(dmrole, scope).map(|found| found[0])
    }

    /// Distinct dmtypes of every INSTANCE in `scope`, in document order.
    pub fn instance_dmtypes(&self, scope: Scope<'_>) -> Result<Vec<String>, Diagnostic> {
        let found = self.search(scope, |_, _| true)?;
        let mut dmtypes: Vec<String> = Vec::new();
        for id in found {
            if let Some(dmtype) = self.tree.node(id).dmtype() {
                if !dmtypes.iter().any(|known| known == dmtype) {
                    dmtypes.push(dmtype.to_string());
                }
            }
        }
        Ok(dmtypes)
    }

    /// dmtypes of the top-level GLOBALS instances.
    pub fn globals_instance_dmtypes(&self) -> Vec<String> {
        self.globals_summary().instances
    }

    /// dmtypes of the instances held by top-level GLOBALS collections.
    pub fn globals_collection_dmtypes(&self) -> Vec<String> {
        self.globals_summary().collections
    }

    /// Both GLOBALS dmtype lists at once.
    pub fn globals_summary(&self) -> DmtypeSummary {
        self.globals
            .map(|globals| self.summary_of(globals))
            .unwrap_or_default()
    }

    /// The dmtype summary of every TEMPLATES block, keyed by tableref.
    pub fn templates_summary(&self) -> IndexMap<String, DmtypeSummary> {
        self.templates
            .iter()
            .map(|(tableref, block)| (tableref.clone(), self.summary_of(*block)))
            .collect()
    }

    /// dmids of the top-level GLOBALS instances.
    pub fn globals_instance_dmids(&self) -> Vec<String> {
        self.globals_top_level(&Tag::Instance)
    }

    /// dmids of the top-level GLOBALS collections.
    pub fn globals_collection_dmids(&self) -> Vec<String> {
        self.globals_top_level(&Tag::Collection)
    }

    /// The GLOBALS INSTANCE or COLLECTION identified by `dmid`, at any depth.
    ///
    /// # Errors
    ///
    /// Returns `E402` when no element carries that dmid.
    pub fn globals_element_by_dmid(&self, dmid: &str) -> Result<NodeId, Diagnostic> {
        self.globals
            .into_iter()
            .flat_map(|globals| self.tree.descendants(globals))
            .find(|id| {
                let node = self.tree.node(*id);
                node.tag().is_model_element() && node.tag() != &Tag::Attribute && node.dmid() == Some(dmid)
            })
            .ok_or_else(|| dmid_not_found(dmid, Scope::Globals))
    }

    /// The GLOBALS INSTANCE identified by `dmid`.
    pub fn globals_instance_by_dmid(&self, dmid: &str) -> Result<NodeId, Diagnostic> {
        self.globals_element_by_dmid(dmid)
            .ok()
            .filter(|id| self.tree.node(*id).tag() == &Tag::Instance)
            .ok_or_else(|| dmid_not_found(dmid, Scope::Globals))
    }

    /// The GLOBALS COLLECTION identified by `dmid`.
    pub fn globals_collection(&self, dmid: &str) -> Result<NodeId, Diagnostic> {
        self.globals_element_by_dmid(dmid)
            .ok()
            .filter(|id| self.tree.node(*id).tag() == &Tag::Collection)
            .ok_or_else(|| dmid_not_found(dmid, Scope::Globals))
    }

    /// The INSTANCE identified by `dmid` in the TEMPLATES block of `tableref`.
    pub fn templates_instance_by_dmid(&self, tableref: &str, dmid: &str) -> Result<NodeId, Diagnostic> {
        let block = self.templates_block(Some(tableref))?;
        self.tree
            .descendants_tagged(block, &Tag::Instance)
            .into_iter()
            .find(|id| self.tree.node(*id).dmid() == Some(dmid))
            .ok_or_else(|| dmid_not_found(dmid, Scope::Templates(tableref)))
    }

    /// Items of the GLOBALS collection `dmid` whose PRIMARY_KEY values match
    /// `keys` position by position, in collection order.
    pub fn collection_items_by_keys(&self, dmid: &str, keys: &[Value]) -> Result<Vec<NodeId>, Diagnostic> {
        let collection = self.globals_collection(dmid)?;
        Ok(self
            .tree
            .children(collection)
            .iter()
            .copied()
            .filter(|item| {
                let primary_keys: Vec<NodeId> =
                    self.tree.children_tagged(*item, &Tag::PrimaryKey).collect();
                primary_keys.len() == keys.len()
                    && primary_keys.iter().zip(keys).all(|(primary_key, key)| {
                        self.tree
                            .node(*primary_key)
                            .attribute(attr::VALUE)
                            .is_some_and(|value| key.matches_literal(value))
                    })
            })
            .collect())
    }

    /// The single item of the GLOBALS collection `dmid` whose PRIMARY_KEY is `key`.
    ///
    /// # Errors
    ///
    /// Returns `E403` when no item, or more than one, carries that key.
    pub fn collection_item_by_primary_key(&self, dmid: &str, key: &str) -> Result<NodeId, Diagnostic> {
        let found = self.collection_items_by_keys(dmid, &[Value::Text(key.to_string())])?;
        match found.as_slice() {
            [single] => Ok(*single),
            [] => Err(Diagnostic::error(format!(
                "no item of COLLECTION `{dmid}` has PRIMARY_KEY `{key}`"
            ))
            .with_code(ErrorCode::E403)),
            several => Err(Diagnostic::error(format!(
                "{} items of COLLECTION `{dmid}` have PRIMARY_KEY `{key}`",
                several.len()
            ))
            .with_code(ErrorCode::E403)),
        }
    }

    fn scope_root(&self, scope: Scope<'_>) -> Result<Option<NodeId>, Diagnostic> {
        match scope {
            Scope::Globals => Ok(self.globals),
            Scope::Templates(tableref) => self.templates_block(Some(tableref)).map(Some),
        }
    }

    fn search(
        &self,
        scope: Scope<'_>,
        predicate: impl Fn(&Tree, NodeId) -> bool,
    ) -> Result<Vec<NodeId>, Diagnostic> {
        let Some(root) = self.scope_root(scope)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .tree
            .descendants_tagged(root, &Tag::Instance)
            .into_iter()
            .filter(|id| predicate(&self.tree, *id))
            .collect())
    }

    fn summary_of(&self, block: NodeId) -> DmtypeSummary {
        let mut summary = DmtypeSummary::default();
        for &child in self.tree.children(block) {
            let node = self.tree.node(child);
            match node.tag() {
                Tag::Instance => summary
                    .instances
                    .extend(node.dmtype().map(str::to_string)),
                Tag::Collection => summary.collections.extend(
                    self.tree
                        .children_tagged(child, &Tag::Instance)
                        .filter_map(|item| self.tree.node(item).dmtype())
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
        summary.collections.dedup();
        summary
    }

    fn globals_top_level(&self, tag: &Tag) -> Vec<String> {
        self.globals
            .map(|globals| {
                self.tree
                    .children_tagged(globals, tag)
                    .filter_map(|id| self.tree.node(id).dmid())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn non_empty_result(
    found: Vec<NodeId>,
    code: ErrorCode,
    what: &str,
    name: &str,
    scope: Scope<'_>,
) -> Result<Vec<NodeId>, Diagnostic> {
    if found.is_empty() {
        Err(Diagnostic::error(format!("Cannot find {what} {name} in {scope}")).with_code(code))
    } else {
        Ok(found)
    }
}

fn dmid_not_found(dmid: &str, scope: Scope<'_>) -> Diagnostic {
    Diagnostic::error(format!("Cannot find dmid {dmid} in {scope}")).with_code(ErrorCode::E402)
}
