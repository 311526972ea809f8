//! Typed view construction.
//!
//! [`ViewBuilder`] walks resolved annotation content and turns INSTANCE,
//! ATTRIBUTE and COLLECTION elements into [`MivotInstance`], [`Attribute`]
//! and [`Collection`] values. Structural rules are enforced here and never
//! coerced: collections stay homogeneous, every child of an instance has a
//! distinct role, and blocks handed to [`ViewBuilder::instance_from_block`]
//! hold exactly one top-level INSTANCE.

use indexmap::IndexMap;
use log::trace;

use mivot_core::{
    instance::{Attribute, Collection, CollectionItems, MivotInstance, RoleValue},
    tree::{Node, NodeId, Tree},
    vocabulary::{NOT_SET, Tag, attr},
};

use crate::{
    Span,
    error::{Diagnostic, ErrorCode, Result},
};

/// The kind of items a COLLECTION holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Attribute,
    Instance,
    Collection,
}

impl ItemKind {
    fn of(tag: &Tag) -> Option<Self> {
        match tag {
            Tag::Attribute => Some(ItemKind::Attribute),
            Tag::Instance => Some(ItemKind::Instance),
            Tag::Collection => Some(ItemKind::Collection),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Attribute => "ATTRIBUTE",
            ItemKind::Instance => "INSTANCE",
            ItemKind::Collection => "COLLECTION",
        }
    }
}

/// The single item kind of a COLLECTION, `None` when it holds no items.
///
/// REFERENCE and JOIN children are not counted: their kind is only known
/// once they are resolved.
pub(crate) fn homogeneous_kind(tree: &Tree, collection: NodeId) -> Result<Option<ItemKind>> {
    let mut first: Option<(ItemKind, NodeId)> = None;
    for &child in tree.children(collection) {
        let Some(kind) = ItemKind::of(tree.node(child).tag()) else {
            continue;
        };
        match first {
            None => first = Some((kind, child)),
            Some((expected, first_child)) if expected != kind => {
                let mut diagnostic = Diagnostic::error(format!(
                    "COLLECTION mixes {} and {} children",
                    expected.as_str(),
                    kind.as_str()
                ))
                .with_code(ErrorCode::E200)
                .with_optional_label(tree.node(collection).span(), "mixed collection")
                .with_help(
                    "a COLLECTION can contain ATTRIBUTE, COLLECTION or INSTANCE children but not a mix",
                );
                if let Some(span) = tree.node(first_child).span() {
                    diagnostic = diagnostic
                        .with_secondary_label(span, format!("first {}", expected.as_str()));
                }
                if let Some(span) = tree.node(child).span() {
                    diagnostic =
                        diagnostic.with_secondary_label(span, format!("first {}", kind.as_str()));
                }
                return Err(diagnostic);
            }
            Some(_) => {}
        }
    }
    Ok(first.map(|(kind, _)| kind))
}

/// A non-empty attribute value.
pub(crate) fn non_empty<'a>(node: &'a Node, name: &str) -> Option<&'a str> {
    node.attribute(name).filter(|value| !value.trim().is_empty())
}

pub(crate) fn missing_dmtype(node: &Node) -> Diagnostic {
    Diagnostic::error(format!("{} has no dmtype", node.tag()))
        .with_code(ErrorCode::E202)
        .with_optional_label(node.span(), "missing dmtype")
}

pub(crate) fn missing_dmrole(node: &Node) -> Diagnostic {
    Diagnostic::error(format!("{} inside an INSTANCE has no dmrole", node.tag()))
        .with_code(ErrorCode::E203)
        .with_optional_label(node.span(), "missing dmrole")
        .with_help("every child of an INSTANCE must state the role it plays")
}

pub(crate) fn duplicate_dmrole(role: &str, node: &Node, first: Option<Span>) -> Diagnostic {
    let diagnostic = Diagnostic::error(format!("dmrole `{role}` is used twice in one INSTANCE"))
        .with_code(ErrorCode::E204)
        .with_optional_label(node.span(), "duplicate role");
    match first {
        Some(span) => diagnostic.with_secondary_label(span, "first used here"),
        None => diagnostic,
    }
}

/// Builds typed views from a resolved annotation tree.
pub struct ViewBuilder<'a> {
    tree: &'a Tree,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(tree: &'a Tree) -> Self {
        Self { tree }
    }

    /// Build the instance of a block that must hold exactly one top-level INSTANCE.
    ///
    /// # Errors
    ///
    /// Returns an `E201` diagnostic when the block holds zero or several
    /// INSTANCE children, and any error raised while building that instance.
    pub fn instance_from_block(&self, block: NodeId) -> Result<MivotInstance> {
        let instances: Vec<NodeId> = self.tree.children_tagged(block, &Tag::Instance).collect();
        let block_node = self.tree.node(block);
        match instances.as_slice() {
            [single] => self.instance(*single),
            [] => Err(Diagnostic::error(format!(
                "{} holds no top-level INSTANCE",
                block_node.tag()
            ))
            .with_code(ErrorCode::E201)
            .with_optional_label(block_node.span(), "expected exactly one INSTANCE")),
            [_, second, ..] => Err(Diagnostic::error(format!(
                "{} holds {} top-level INSTANCE elements",
                block_node.tag(),
                instances.len()
            ))
            .with_code(ErrorCode::E201)
            .with_optional_label(self.tree.node(*second).span(), "second INSTANCE")
            .with_help("only one INSTANCE can head a typed view")),
        }
    }

    /// Build an INSTANCE element.
    pub fn instance(&self, id: NodeId) -> Result<MivotInstance> {
        let node = self.tree.node(id);
        if node.tag() != &Tag::Instance {
            return Err(Diagnostic::error(format!("expected an INSTANCE, found {}", node.tag()))
                .with_code(ErrorCode::E201)
                .with_optional_label(node.span(), "not an INSTANCE"));
        }

        let dmtype = non_empty(node, attr::DMTYPE).ok_or_else(|| missing_dmtype(node))?;
        let mut instance = MivotInstance::new(dmtype);
        if let Some(role) = non_empty(node, attr::DMROLE) {
            instance = instance.with_role(role);
        }
        if let Some(dmid) = non_empty(node, attr::DMID) {
            instance = instance.with_dmid(dmid);
        }

        let mut seen: IndexMap<&str, Option<Span>> = IndexMap::new();
        for &child in node.children() {
            let child_node = self.tree.node(child);
            let tag = child_node.tag();
            if tag.is_placeholder() {
                return Err(unresolved(child_node));
            }
            if !tag.is_model_element() {
                continue;
            }

            let role = non_empty(child_node, attr::DMROLE).ok_or_else(|| missing_dmrole(child_node))?;
            if let Some(first) = seen.get(role) {
                return Err(duplicate_dmrole(role, child_node, *first));
            }
            seen.insert(role, child_node.span());

            let value = match tag {
                Tag::Attribute => RoleValue::Attribute(self.attribute(child)?),
                Tag::Instance => RoleValue::Instance(self.instance(child)?),
                _ => RoleValue::Collection(self.collection(child)?),
            };
            instance.insert(role, value);
        }

        trace!(dmtype = instance.dmtype(), roles = instance.len(); "Instance built");
        Ok(instance)
    }

    /// Build a COLLECTION element.
    pub fn collection(&self, id: NodeId) -> Result<Collection> {
        let node = self.tree.node(id);
        if let Some(placeholder) = node
            .children()
            .iter()
            .map(|child| self.tree.node(*child))
            .find(|child| child.tag().is_placeholder())
        {
            return Err(unresolved(placeholder));
        }

        let items = match homogeneous_kind(self.tree, id)? {
            None => CollectionItems::Empty,
            Some(ItemKind::Attribute) => CollectionItems::Attributes(
                self.tree
                    .children_tagged(id, &Tag::Attribute)
                    .map(|child| self.attribute(child))
                    .collect::<Result<_>>()?,
            ),
            Some(ItemKind::Instance) => CollectionItems::Instances(
                self.tree
                    .children_tagged(id, &Tag::Instance)
                    .map(|child| self.instance(child))
                    .collect::<Result<_>>()?,
            ),
            Some(ItemKind::Collection) => CollectionItems::Collections(
                self.tree
                    .children_tagged(id, &Tag::Collection)
                    .map(|child| self.collection(child))
                    .collect::<Result<_>>()?,
            ),
        };

        let mut collection = Collection::new(items);
        if let Some(role) = non_empty(node, attr::DMROLE) {
            collection = collection.with_role(role);
        }
        if let Some(dmid) = non_empty(node, attr::DMID) {
            collection = collection.with_dmid(dmid);
        }
        Ok(collection)
    }

    /// Build an ATTRIBUTE element.
    pub fn attribute(&self, id: NodeId) -> Result<Attribute> {
        let node = self.tree.node(id);
        let dmtype = non_empty(node, attr::DMTYPE).ok_or_else(|| missing_dmtype(node))?;

        let mut attribute = Attribute::new(dmtype, node.attribute(attr::VALUE).map(str::to_string));
        if let Some(role) = non_empty(node, attr::DMROLE) {
            attribute = attribute.with_role(role);
        }
        let unit = non_empty(node, attr::UNIT)
            .or_else(|| node.binding().and_then(|binding| binding.unit()))
            .filter(|unit| !unit.is_empty());
        if let Some(unit) = unit {
            attribute = attribute.with_unit(unit);
        }
        if let Some(reference) = non_empty(node, attr::REF).filter(|r| *r != NOT_SET) {
            attribute = attribute.with_reference(reference);
        }
        if let Some(binding) = node.binding().filter(|binding| !binding.is_pinned()) {
            attribute = attribute.with_column(binding.index());
        }
        Ok(attribute)
    }
}

fn unresolved(node: &Node) -> Diagnostic {
    Diagnostic::error(format!("{} placeholder left unresolved", node.tag()))
        .with_code(ErrorCode::E306)
        .with_optional_label(node.span(), "unresolved placeholder")
        .with_help("resolve references before building a typed view")
}
