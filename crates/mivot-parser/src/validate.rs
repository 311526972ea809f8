//! Structural validation of annotation blocks.
//!
//! Validation walks the whole block once and reports every violation it
//! finds, rather than stopping at the first one.

use indexmap::IndexMap;
use log::debug;

use mivot_core::{
    tree::{NodeId, Tree},
    vocabulary::{FIRST_TABLE, Tag, attr},
};

use crate::{
    Span,
    elaborate::{duplicate_dmrole, homogeneous_kind, missing_dmrole, missing_dmtype, non_empty},
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ParseError},
};

/// Check the structure of an annotation block.
///
/// # Errors
///
/// Returns a [`ParseError`] holding one diagnostic per violation:
/// ATTRIBUTE or INSTANCE without dmtype, children of an INSTANCE without
/// or with duplicate dmrole, mixed COLLECTIONs, malformed REFERENCE, JOIN
/// and WHERE elements, and inconsistent TEMPLATES tablerefs.
pub fn validate(tree: &Tree) -> Result<(), ParseError> {
    let mut collector = DiagnosticCollector::new();

    collect_templates(tree, &mut collector);
    for id in tree.descendants(tree.root()) {
        match tree.node(id).tag() {
            Tag::Instance => {
                check_dmtype(tree, id, &mut collector);
                check_roles(tree, id, &mut collector);
            }
            Tag::Attribute => check_dmtype(tree, id, &mut collector),
            Tag::Collection => {
                if let Err(diagnostic) = homogeneous_kind(tree, id) {
                    collector.emit(diagnostic);
                }
            }
            Tag::Reference => check_reference(tree, id, &mut collector),
            Tag::Join => check_join(tree, id, &mut collector),
            Tag::Where => check_where(tree, id, &mut collector),
            _ => {}
        }
    }

    collector.finish()
}

/// Index the TEMPLATES blocks of an annotation by tableref.
///
/// A TEMPLATES without tableref is keyed as [`FIRST_TABLE`] and must be the
/// only TEMPLATES of the block.
///
/// # Errors
///
/// Returns `E104` diagnostics when an anonymous TEMPLATES sits beside other
/// blocks and `E103` diagnostics for tablerefs declared twice.
pub fn index_templates(tree: &Tree) -> Result<IndexMap<String, NodeId>, ParseError> {
    let mut collector = DiagnosticCollector::new();
    let index = collect_templates(tree, &mut collector);
    collector.finish().map(|()| index)
}

fn collect_templates(tree: &Tree, collector: &mut DiagnosticCollector) -> IndexMap<String, NodeId> {
    let blocks: Vec<NodeId> = tree.children_tagged(tree.root(), &Tag::Templates).collect();
    let mut index: IndexMap<String, NodeId> = IndexMap::new();

    for &block in &blocks {
        let node = tree.node(block);
        let key = non_empty(node, attr::TABLEREF).unwrap_or(FIRST_TABLE);

        if key == FIRST_TABLE && blocks.len() > 1 {
            collector.emit(
                Diagnostic::error("a TEMPLATES without tableref must be the only TEMPLATES")
                    .with_code(ErrorCode::E104)
                    .with_optional_label(node.span(), "anonymous TEMPLATES")
                    .with_help("give every TEMPLATES a tableref naming its table"),
            );
        }

        if let Some(first) = index.get(key) {
            let mut diagnostic =
                Diagnostic::error(format!("TEMPLATES tableref `{key}` is declared twice"))
                    .with_code(ErrorCode::E103)
                    .with_optional_label(node.span(), "duplicate declaration");
            if let Some(span) = tree.node(*first).span() {
                diagnostic = diagnostic.with_secondary_label(span, "first declared here");
            }
            collector.emit(diagnostic);
            continue;
        }
        index.insert(key.to_string(), block);
    }

    debug!(templates = index.len(); "TEMPLATES indexed");
    index
}

fn check_dmtype(tree: &Tree, id: NodeId, collector: &mut DiagnosticCollector) {
    let node = tree.node(id);
    if non_empty(node, attr::DMTYPE).is_none() {
        collector.emit(missing_dmtype(node));
    }
}

fn check_roles(tree: &Tree, id: NodeId, collector: &mut DiagnosticCollector) {
    let mut seen: IndexMap<&str, Option<Span>> = IndexMap::new();
    for &child in tree.children(id) {
        let node = tree.node(child);
        if !node.tag().is_model_element() && !node.tag().is_placeholder() {
            continue;
        }
        let Some(role) = non_empty(node, attr::DMROLE) else {
            collector.emit(missing_dmrole(node));
            continue;
        };
        match seen.get(role) {
            Some(first) => collector.emit(duplicate_dmrole(role, node, *first)),
            None => {
                seen.insert(role, node.span());
            }
        }
    }
}

fn check_reference(tree: &Tree, id: NodeId, collector: &mut DiagnosticCollector) {
    let node = tree.node(id);
    if non_empty(node, attr::DMREF).is_some() {
        return;
    }
    if non_empty(node, attr::SOURCEREF).is_none() {
        collector.emit(
            malformed(node.span(), "REFERENCE has neither dmref nor sourceref")
                .with_help("a static REFERENCE needs dmref; a dynamic one needs sourceref and FOREIGN_KEY"),
        );
        return;
    }

    let keys: Vec<NodeId> = tree.children_tagged(id, &Tag::ForeignKey).collect();
    if keys.is_empty() {
        collector.emit(malformed(node.span(), "dynamic REFERENCE has no FOREIGN_KEY"));
    }
    for key in keys {
        let key_node = tree.node(key);
        if non_empty(key_node, attr::REF).is_none() {
            collector.emit(malformed(key_node.span(), "FOREIGN_KEY has no ref"));
        }
    }
}

fn check_join(tree: &Tree, id: NodeId, collector: &mut DiagnosticCollector) {
    let node = tree.node(id);
    if non_empty(node, attr::SOURCEREF).is_none() {
        collector.emit(malformed(node.span(), "JOIN has no sourceref"));
    }
}

fn check_where(tree: &Tree, id: NodeId, collector: &mut DiagnosticCollector) {
    let node = tree.node(id);
    for name in [attr::FOREIGNKEY, attr::PRIMARYKEY] {
        if non_empty(node, name).is_none() {
            collector.emit(malformed(node.span(), format!("WHERE has no {name}")));
        }
    }
}

fn malformed(span: Option<Span>, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(message)
        .with_code(ErrorCode::E206)
        .with_optional_label(span, "malformed placeholder")
}


#[cfg(test)]
mod proptest_tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::xml::read_annotation;

    // ===================
    // Strategies
    // ===================

    /// Item kinds of a COLLECTION: 0 ATTRIBUTE, 1 INSTANCE, 2 COLLECTION.
    fn items_strategy() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..3, 0..10)
    }

    // ===================
    // Property Test Functions
    // ===================

    fn collection_source(items: &[u8]) -> String {
        let body: String = items
            .iter()
            .map(|kind| match kind {
                0 => r#"<ATTRIBUTE dmtype="ivoa:real" value="1"/>"#,
                1 => r#"<INSTANCE dmtype="a:B"/>"#,
                _ => "<COLLECTION/>",
            })
            .collect();
        format!(
            r#"<VODML><TEMPLATES><INSTANCE dmtype="a:A">
                 <COLLECTION dmrole="a:A.items">{body}</COLLECTION>
               </INSTANCE></TEMPLATES></VODML>"#
        )
    }

    /// A COLLECTION is rejected exactly when its items are of more than one kind.
    fn check_collection_homogeneity(items: Vec<u8>) -> Result<(), TestCaseError> {
        let source = collection_source(&items);
        let tree = read_annotation(&source).map_err(|err| TestCaseError::fail(err.to_string()))?;
        let kinds: HashSet<u8> = items.iter().copied().collect();

        match validate(&tree) {
            Ok(()) => prop_assert!(kinds.len() <= 1),
            Err(err) => {
                prop_assert!(kinds.len() > 1);
                prop_assert_eq!(err.diagnostics().len(), 1);
                prop_assert!(err.has_code(ErrorCode::E200));
            }
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn collection_homogeneity(items in items_strategy()) {
            check_collection_homogeneity(items)?;
        }
    }
}
