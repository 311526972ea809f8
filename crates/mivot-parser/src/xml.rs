//! Reading MIVOT annotation XML into a node arena.
//!
//! Namespace prefixes are dropped: only local element and attribute names
//! reach the [`Tree`]. Every node keeps the byte span of its source element.

use log::debug;
use roxmltree::{Document, Node as XmlNode};

use mivot_core::{
    tree::{NodeId, Tree},
    vocabulary::{Tag, attr},
};

use crate::{
    Span,
    error::{Diagnostic, ErrorCode, Result},
};

/// Read an annotation block without validating its structure.
pub(crate) fn read_annotation(source: &str) -> Result<Tree> {
    let document = Document::parse(source).map_err(|err| malformed_xml(source, &err))?;
    let element = document.root_element();

    if Tag::from_name(element.tag_name().name()) != Tag::Vodml {
        return Err(Diagnostic::error(format!(
            "expected a VODML annotation block, found `{}`",
            element.tag_name().name()
        ))
        .with_code(ErrorCode::E003)
        .with_label(Span::new(element.range()), "unexpected root element"));
    }

    check_report(element)?;

    let tree = build_tree(element);
    debug!(nodes = tree.node_count(); "Annotation block read");
    Ok(tree)
}

/// Read a standalone element, such as an INSTANCE meant for a GLOBALS
/// block, without checking its structure.
pub(crate) fn read_element(source: &str) -> Result<Tree> {
    let document = Document::parse(source).map_err(|err| malformed_xml(source, &err))?;
    Ok(build_tree(document.root_element()))
}

fn build_tree(element: XmlNode<'_, '_>) -> Tree {
    let mut tree = Tree::new(Tag::from_name(element.tag_name().name()));
    let root = tree.root();
    copy_element(&mut tree, root, element);
    for child in element.children().filter(|child| child.is_element()) {
        append_element(&mut tree, root, child);
    }
    tree
}

/// A block whose REPORT says `KO` and that maps nothing counts as absent.
fn check_report(element: XmlNode<'_, '_>) -> Result<()> {
    let children = || element.children().filter(|child| child.is_element());
    let failed_report = children().find(|child| {
        child.tag_name().name() == Tag::Report.as_str()
            && child
                .attribute(attr::STATUS)
                .is_some_and(|status| status.eq_ignore_ascii_case("KO"))
    });
    let has_templates = children().any(|child| child.tag_name().name() == Tag::Templates.as_str());

    match failed_report {
        Some(report) if !has_templates => {
            let reason = report.text().map(str::trim).unwrap_or_default();
            Err(Diagnostic::error(format!(
                "annotation block reports a failure: {reason}"
            ))
            .with_code(ErrorCode::E002)
            .with_label(Span::new(report.range()), "REPORT status is KO"))
        }
        _ => Ok(()),
    }
}

fn append_element(tree: &mut Tree, parent: NodeId, element: XmlNode<'_, '_>) {
    let id = tree.add_child(parent, Tag::from_name(element.tag_name().name()));
    copy_element(tree, id, element);
    for child in element.children().filter(|child| child.is_element()) {
        append_element(tree, id, child);
    }
}

fn copy_element(tree: &mut Tree, id: NodeId, element: XmlNode<'_, '_>) {
    let node = tree.node_mut(id);
    node.set_span(Span::new(element.range()));
    for attribute in element.attributes() {
        node.set_attribute(attribute.name(), attribute.value());
    }
    if !element.children().any(|child| child.is_element()) {
        if let Some(text) = element.text().map(str::trim).filter(|text| !text.is_empty()) {
            node.set_text(text);
        }
    }
}

/// Turn a reader error into a diagnostic pointing at the offending byte.
pub(crate) fn malformed_xml(source: &str, err: &roxmltree::Error) -> Diagnostic {
    let position = err.pos();
    let offset = byte_offset(source, position.row, position.col);
    let end = (offset + 1).min(source.len());
    Diagnostic::error(format!("malformed XML: {err}"))
        .with_code(ErrorCode::E001)
        .with_label(Span::new(offset..end), "the document cannot be read past this point")
}

/// Byte offset of a 1-based row/column position.
fn byte_offset(source: &str, row: u32, col: u32) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(row.saturating_sub(1) as usize)
        .map(str::len)
        .sum();
    let line_start = line_start.min(source.len());
    let column: usize = source[line_start..]
        .chars()
        .take(col.saturating_sub(1) as usize)
        .map(char::len_utf8)
        .sum();
    line_start + column
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_annotation_strips_namespaces() {
        let source = r#"<mivot:VODML xmlns:mivot="http://www.ivoa.net/xml/mivot">
  <mivot:TEMPLATES>
    <mivot:INSTANCE dmtype="meas:Position"/>
  </mivot:TEMPLATES>
</mivot:VODML>"#;
        let tree = read_annotation(source).unwrap();
        let templates = tree.first_child_tagged(tree.root(), &Tag::Templates).unwrap();
        let instance = tree.first_child_tagged(templates, &Tag::Instance).unwrap();
        assert_eq!(tree.node(instance).dmtype(), Some("meas:Position"));
    }

    #[test]
    fn test_read_element() {
        let tree = read_element(
            r#"<INSTANCE dmtype="coords:SpaceSys" dmid="_icrs">
                 <ATTRIBUTE dmrole="coords:SpaceSys.frame" dmtype="ivoa:string" value="ICRS"/>
               </INSTANCE>"#,
        )
        .unwrap();
        assert_eq!(tree.node(tree.root()).tag(), &Tag::Instance);
        assert_eq!(tree.node(tree.root()).dmid(), Some("_icrs"));
        assert_eq!(tree.node_count(), 2);

        let err = read_element("<INSTANCE>").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E001));
    }

    #[test]
    fn test_read_annotation_keeps_leaf_text() {
        let source = r#"<VODML>
  <REPORT status="OK">
    hand written
  </REPORT>
  <GLOBALS/>
</VODML>"#;
        let tree = read_annotation(source).unwrap();
        let report = tree.first_child_tagged(tree.root(), &Tag::Report).unwrap();
        assert_eq!(tree.node(report).text(), Some("hand written"));
        assert_eq!(tree.node(tree.root()).text(), None);
    }

    #[test]
    fn test_read_annotation_keeps_spans() {
        let source = r#"<VODML><GLOBALS/></VODML>"#;
        let tree = read_annotation(source).unwrap();
        let globals = tree.first_child_tagged(tree.root(), &Tag::Globals).unwrap();
        let span = tree.node(globals).span().unwrap();
        assert_eq!(&source[span.range()], "<GLOBALS/>");
    }

    #[test]
    fn test_read_annotation_rejects_other_root() {
        let err = read_annotation("<VOTABLE/>").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E003));
    }

    #[test]
    fn test_read_annotation_malformed() {
        let err = read_annotation("<VODML>\n  <GLOBALS>\n</VODML>").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E001));
        assert!(err.primary_span().is_some());
    }

    #[test]
    fn test_failed_report_counts_as_missing_block() {
        let source = r#"<VODML><REPORT status="KO">no mapping for this service</REPORT></VODML>"#;
        let err = read_annotation(source).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::E002));
        assert!(err.message().contains("no mapping for this service"));
    }

    #[test]
    fn test_byte_offset() {
        let source = "ab\ncdé\nf";
        assert_eq!(byte_offset(source, 1, 1), 0);
        assert_eq!(byte_offset(source, 2, 3), 5);
        assert_eq!(byte_offset(source, 3, 1), 8);
    }
}
