//! Arena storage for annotation trees.
//!
//! A [`Tree`] owns every node of an annotation document in a flat vector;
//! nodes refer to each other through [`NodeId`]s. Cloning a tree keeps all
//! ids valid in the clone, which is what lets the mapping engine remember
//! positions in a canonical template and replay them on per-row copies.
//!
//! Detaching a node only unlinks it from its parent. The node stays in the
//! arena but is no longer reachable from the root, and every traversal
//! starts from the root.

use std::fmt;

use indexmap::IndexMap;
use quick_xml::escape::escape;

use crate::{
    span::Span,
    vocabulary::{Tag, attr},
};

/// Stable index of a node inside one [`Tree`] (and its clones).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Column information attached to an ATTRIBUTE bound to a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    index: usize,
    unit: Option<String>,
    pinned: bool,
}

impl ColumnBinding {
    /// Binding to the zero-based column `index`, with the unit declared by its field.
    pub fn new(index: usize, unit: Option<String>) -> Self {
        Self {
            index,
            unit,
            pinned: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// A pinned binding already holds the value of a specific foreign row
    /// and must not be refilled from the row being iterated.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn pin(&mut self) {
        self.pinned = true;
    }
}

/// One element of an annotation tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: Tag,
    attributes: IndexMap<String, String>,
    text: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    span: Option<Span>,
    origin: Option<String>,
    binding: Option<ColumnBinding>,
}

impl Node {
    fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
            parent: None,
            span: None,
            origin: None,
            binding: None,
        }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Get the value of an XML attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Iterate over the XML attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.shift_remove(name)
    }

    /// Character content of a leaf element, such as the message of a REPORT.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn dmtype(&self) -> Option<&str> {
        self.attribute(attr::DMTYPE)
    }

    pub fn dmrole(&self) -> Option<&str> {
        self.attribute(attr::DMROLE)
    }

    pub fn dmid(&self) -> Option<&str> {
        self.attribute(attr::DMID)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Location of the element in the source it was read from.
    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn set_span(&mut self, span: Span) {
        self.span = Some(span);
    }

    /// Identity of the definition this node was substituted from, if any.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = Some(origin.into());
    }

    pub fn binding(&self) -> Option<&ColumnBinding> {
        self.binding.as_ref()
    }

    pub fn binding_mut(&mut self) -> Option<&mut ColumnBinding> {
        self.binding.as_mut()
    }

    pub fn set_binding(&mut self, binding: ColumnBinding) {
        self.binding = Some(binding);
    }
}

/// An annotation document stored as a node arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree holding a single root element.
    pub fn new(tag: Tag) -> Self {
        Self {
            nodes: vec![Node::new(tag)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this tree or one of its clones.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Get a node mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this tree or one of its clones.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Get a node, or `None` for an id this tree never issued.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Append a new element as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, tag: Tag) -> NodeId {
        let position = self.nodes[parent.0].children.len();
        self.insert_child(parent, position, tag)
    }

    /// Insert a new element among the children of `parent` at `position`
    /// (clamped to the number of children).
    pub fn insert_child(&mut self, parent: NodeId, position: usize, tag: Tag) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(tag);
        node.parent = Some(parent);
        self.nodes.push(node);
        self.link(parent, position, id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Children of `id` carrying `tag`, in document order.
    pub fn children_tagged<'a>(
        &'a self,
        id: NodeId,
        tag: &'a Tag,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.node(*child).tag() == tag)
    }

    pub fn first_child_tagged(&self, id: NodeId, tag: &Tag) -> Option<NodeId> {
        self.children_tagged(id, tag).next()
    }

    /// All nodes below `id` in document (pre-)order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            found.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        found
    }

    /// Descendants of `id` carrying `tag`, in document order.
    pub fn descendants_tagged(&self, id: NodeId, tag: &Tag) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|descendant| self.node(*descendant).tag() == tag)
            .collect()
    }

    /// Walk from the parent of `id` up to the top of its tree.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(id).parent,
        }
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        match self.ancestors(id).last() {
            Some(top) => top == self.root,
            None => id == self.root,
        }
    }

    /// Position of `id` among its parent's children.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        let parent = self.node(id).parent?;
        self.children(parent).iter().position(|child| *child == id)
    }

    /// Unlink `id` from its parent, returning the parent and the position it occupied.
    ///
    /// The root cannot be detached.
    pub fn detach(&mut self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.node(id).parent?;
        let position = self.position(id)?;
        self.nodes[parent.0].children.remove(position);
        self.nodes[id.0].parent = None;
        Some((parent, position))
    }

    /// Copy the subtree rooted at `id` into a fresh, compact tree.
    pub fn subtree(&self, id: NodeId) -> Tree {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.copy_from(None, self, id);
        tree
    }

    /// Deep-copy the subtree of `source` rooted at `source_id` under `parent`
    /// at `position` (clamped), returning the id of the copied root.
    pub fn import(
        &mut self,
        parent: NodeId,
        position: usize,
        source: &Tree,
        source_id: NodeId,
    ) -> NodeId {
        let id = self.copy_from(Some(parent), source, source_id);
        self.link(parent, position, id);
        id
    }

    /// Deep-copy a subtree of `source` as the last child of `parent`.
    pub fn append_subtree(&mut self, parent: NodeId, source: &Tree, source_id: NodeId) -> NodeId {
        let position = self.children(parent).len();
        self.import(parent, position, source, source_id)
    }

    /// Substitute `target` with a deep copy of a subtree of `source`, keeping
    /// its position among its siblings. Returns `None` when `target` has no parent.
    pub fn replace(&mut self, target: NodeId, source: &Tree, source_id: NodeId) -> Option<NodeId> {
        let (parent, position) = self.detach(target)?;
        Some(self.import(parent, position, source, source_id))
    }

    /// Number of nodes reachable from the root, the root included.
    pub fn node_count(&self) -> usize {
        self.descendants(self.root).len() + 1
    }

    /// Serialize the reachable part of the tree as indented XML.
    pub fn to_xml_string(&self) -> String {
        self.to_string()
    }

    fn link(&mut self, parent: NodeId, position: usize, id: NodeId) {
        let children = &mut self.nodes[parent.0].children;
        let position = position.min(children.len());
        children.insert(position, id);
    }

    fn copy_from(&mut self, parent: Option<NodeId>, source: &Tree, source_id: NodeId) -> NodeId {
        let original = source.node(source_id);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: original.tag.clone(),
            attributes: original.attributes.clone(),
            text: original.text.clone(),
            children: Vec::with_capacity(original.children.len()),
            parent,
            span: original.span,
            origin: original.origin.clone(),
            binding: original.binding.clone(),
        });
        for &child in &original.children {
            let copied = self.copy_from(Some(id), source, child);
            self.nodes[id.0].children.push(copied);
        }
        id
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        let node = self.node(id);
        let indent = "  ".repeat(depth);
        write!(f, "{indent}<{}", node.tag)?;
        for (name, value) in node.attributes() {
            write!(f, " {name}=\"{}\"", escape(value))?;
        }
        if node.children.is_empty() {
            return match &node.text {
                Some(text) => writeln!(f, ">{}</{}>", escape(text.as_str()), node.tag),
                None => writeln!(f, "/>"),
            };
        }
        writeln!(f, ">")?;
        for child in &node.children {
            self.write_node(f, *child, depth + 1)?;
        }
        writeln!(f, "{indent}</{}>", node.tag)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.root, 0)
    }
}

/// Iterator over the ancestors of a node, nearest first.
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.node(current).parent;
        Some(current)
    }
}


#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    /// Child kinds of one element: `true` for a REFERENCE, `false` for an ATTRIBUTE.
    fn children_strategy() -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(any::<bool>(), 0..8)
    }

    // ===================
    // Property Test Functions
    // ===================

    fn fill(tree: &mut Tree, parent: NodeId, kinds: &[bool], prefix: &str) {
        for (index, is_reference) in kinds.iter().enumerate() {
            let tag = if *is_reference { Tag::Reference } else { Tag::Attribute };
            let child = tree.add_child(parent, tag);
            tree.node_mut(child)
                .set_attribute(attr::DMROLE, format!("{prefix}.child{index}"));
        }
    }

    fn build(top: &[bool], nested: &[bool]) -> Tree {
        let mut tree = Tree::new(Tag::Templates);
        let root = tree.root();
        let instance = tree.add_child(root, Tag::Instance);
        fill(&mut tree, instance, top, "top");
        let collection = tree.add_child(instance, Tag::Collection);
        fill(&mut tree, collection, nested, "nested");
        tree
    }

    /// Detaching REFERENCEs in document order and putting copies back in
    /// reverse order restores the original document.
    fn check_detach_restore(top: Vec<bool>, nested: Vec<bool>) -> Result<(), TestCaseError> {
        let original = build(&top, &nested);
        let mut stripped = original.clone();
        let root = stripped.root();

        let mut removed = Vec::new();
        for id in stripped.descendants_tagged(root, &Tag::Reference) {
            let copy = stripped.subtree(id);
            if let Some((parent, position)) = stripped.detach(id) {
                removed.push((parent, position, copy));
            }
        }
        let references = top.iter().chain(&nested).filter(|kind| **kind).count();
        prop_assert_eq!(removed.len(), references);
        prop_assert!(stripped.descendants_tagged(root, &Tag::Reference).is_empty());

        let mut restored = stripped.clone();
        for (parent, position, copy) in removed.iter().rev() {
            restored.import(*parent, *position, copy, copy.root());
        }
        prop_assert_eq!(restored.to_xml_string(), original.to_xml_string());
        prop_assert_eq!(restored.node_count(), original.node_count());
        Ok(())
    }

    proptest! {
        #[test]
        fn detach_restore(top in children_strategy(), nested in children_strategy()) {
            check_detach_restore(top, nested)?;
        }
    }
}
