//! Writing MIVOT annotation blocks.
//!
//! [`MivotAnnotations`] collects the MODEL declarations, the REPORT, the
//! GLOBALS content and the TEMPLATES content of a block, assembles them
//! into a `VODML` element checked by the same reader the viewer uses, and
//! splices the result into a VOTable document.
//!
//! ```
//! use mivot::{MivotError, writer::MivotAnnotations};
//!
//! fn main() -> Result<(), MivotError> {
//!     let mut annotations = MivotAnnotations::new();
//!     annotations.add_model("meas", Some("https://www.ivoa.net/xml/Meas/20200908/Meas-v1.0.vo-dml.xml"));
//!     annotations.add_templates_xml(
//!         r#"<INSTANCE dmtype="meas:Position">
//!              <ATTRIBUTE dmrole="meas:Position.ra" dmtype="ivoa:RealQuantity" ref="ra"/>
//!            </INSTANCE>"#,
//!     )?;
//!     let block = annotations.build_mivot_block(None)?;
//!     assert!(block.contains(r#"<REPORT status="OK">"#));
//!     Ok(())
//! }
//! ```

use indexmap::IndexMap;
use log::{debug, info};

use mivot_core::{
    tree::Tree,
    vocabulary::{Tag, attr},
};
use mivot_parser::{insert_annotation, parse_annotation, parse_element};

use crate::error::MivotError;

/// Namespace declared on written `VODML` elements.
pub const MIVOT_NAMESPACE: &str = "http://www.ivoa.net/xml/mivot";

const DEFAULT_REPORT: &str = "Generated by the mivot annotation writer";

/// Builder of a MIVOT annotation block.
#[derive(Debug, Clone)]
pub struct MivotAnnotations {
    models: IndexMap<String, Option<String>>,
    report_ok: bool,
    report_message: String,
    globals: Vec<Tree>,
    templates: Vec<Tree>,
    block: Option<String>,
}

impl Default for MivotAnnotations {
    fn default() -> Self {
        Self {
            models: IndexMap::new(),
            report_ok: true,
            report_message: DEFAULT_REPORT.to_string(),
            globals: Vec::new(),
            templates: Vec::new(),
            block: None,
        }
    }
}

impl MivotAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a model by its short name and, optionally, the URL of its
    /// VO-DML file. Declaring a name again replaces its URL.
    pub fn add_model(&mut self, name: impl Into<String>, url: Option<&str>) -> &mut Self {
        self.models.insert(name.into(), url.map(str::to_string));
        self
    }

    /// Set the REPORT of the block.
    ///
    /// A failed report drops the GLOBALS and TEMPLATES content added so far:
    /// a block reporting a failure maps nothing.
    pub fn set_report(&mut self, ok: bool, message: impl Into<String>) -> &mut Self {
        self.report_ok = ok;
        self.report_message = message.into();
        if !ok {
            self.globals.clear();
            self.templates.clear();
        }
        self
    }

    /// Add an INSTANCE or COLLECTION to the GLOBALS block.
    ///
    /// # Errors
    ///
    /// Returns [`MivotError::Writer`] when the root of `element` is another tag.
    pub fn add_globals(&mut self, element: Tree) -> Result<&mut Self, MivotError> {
        self.globals.push(model_root(element, "GLOBALS")?);
        Ok(self)
    }

    /// Add the INSTANCE or COLLECTION written in `xml` to the GLOBALS block.
    pub fn add_globals_xml(&mut self, xml: &str) -> Result<&mut Self, MivotError> {
        let element = parse_element(xml).map_err(|err| MivotError::new_parse_error(err, xml))?;
        self.add_globals(element)
    }

    /// Add an INSTANCE or COLLECTION to the TEMPLATES block.
    ///
    /// # Errors
    ///
    /// Returns [`MivotError::Writer`] when the root of `element` is another tag.
    pub fn add_templates(&mut self, element: Tree) -> Result<&mut Self, MivotError> {
        self.templates.push(model_root(element, "TEMPLATES")?);
        Ok(self)
    }

    /// Add the INSTANCE or COLLECTION written in `xml` to the TEMPLATES block.
    pub fn add_templates_xml(&mut self, xml: &str) -> Result<&mut Self, MivotError> {
        let element = parse_element(xml).map_err(|err| MivotError::new_parse_error(err, xml))?;
        self.add_templates(element)
    }

    /// Assemble the block, check it and keep it for [`Self::insert_into_votable`].
    ///
    /// The TEMPLATES block, written only when content was added, carries
    /// `tableref` when given. GLOBALS is always written.
    ///
    /// # Errors
    ///
    /// Returns a parse error with every structural violation of the block.
    pub fn build_mivot_block(&mut self, tableref: Option<&str>) -> Result<&str, MivotError> {
        let mut tree = Tree::new(Tag::Vodml);
        let root = tree.root();
        tree.node_mut(root).set_attribute("xmlns", MIVOT_NAMESPACE);

        let report = tree.add_child(root, Tag::Report);
        let status = if self.report_ok { "OK" } else { "FAILED" };
        tree.node_mut(report).set_attribute(attr::STATUS, status);
        if !self.report_message.is_empty() {
            tree.node_mut(report).set_text(self.report_message.as_str());
        }

        for (name, url) in &self.models {
            let model = tree.add_child(root, Tag::Model);
            tree.node_mut(model).set_attribute(attr::NAME, name.as_str());
            if let Some(url) = url {
                tree.node_mut(model).set_attribute(attr::URL, url.as_str());
            }
        }

        let globals = tree.add_child(root, Tag::Globals);
        for element in &self.globals {
            tree.append_subtree(globals, element, element.root());
        }

        if !self.templates.is_empty() {
            let templates = tree.add_child(root, Tag::Templates);
            if let Some(tableref) = tableref {
                tree.node_mut(templates).set_attribute(attr::TABLEREF, tableref);
            }
            for element in &self.templates {
                tree.append_subtree(templates, element, element.root());
            }
        }

        let block = tree.to_xml_string();
        check_block(&block)?;
        info!(
            models = self.models.len(),
            globals = self.globals.len(),
            templates = self.templates.len(),
            status;
            "Annotation block built"
        );
        Ok(self.block.insert(block).as_str())
    }

    /// The last block built.
    pub fn mivot_block(&self) -> Option<&str> {
        self.block.as_deref()
    }

    /// Check the last block built with the annotation reader.
    ///
    /// # Errors
    ///
    /// Returns [`MivotError::Writer`] when no block was built, and a parse
    /// error for a block the reader rejects.
    pub fn check_xml(&self) -> Result<(), MivotError> {
        check_block(self.built()?)
    }

    /// Write the last block built into `votable`, returning the new document.
    ///
    /// # Errors
    ///
    /// Returns [`MivotError::Writer`] when no block was built, and a parse
    /// error for an unreadable document, a document without RESOURCE, or an
    /// annotated RESOURCE while `replace` is unset (`E005`).
    pub fn insert_into_votable(&self, votable: &str, replace: bool) -> Result<String, MivotError> {
        let block = self.built()?;
        let written =
            insert_annotation(votable, block, replace).map_err(|err| MivotError::new_parse_error(err, votable))?;
        debug!(replace, bytes = written.len(); "Annotation block inserted");
        Ok(written)
    }

    fn built(&self) -> Result<&str, MivotError> {
        self.block
            .as_deref()
            .ok_or_else(|| MivotError::Writer("no annotation block has been built".to_string()))
    }
}

fn model_root(element: Tree, block: &str) -> Result<Tree, MivotError> {
    let tag = element.node(element.root()).tag();
    if matches!(tag, Tag::Instance | Tag::Collection) {
        Ok(element)
    } else {
        Err(MivotError::Writer(format!(
            "{block} accepts INSTANCE or COLLECTION elements, not {tag}"
        )))
    }
}

fn check_block(block: &str) -> Result<(), MivotError> {
    parse_annotation(block)
        .map(|_| ())
        .map_err(|err| MivotError::new_parse_error(err, block))
}
