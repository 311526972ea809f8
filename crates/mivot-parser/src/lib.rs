//! # MIVOT Parser
//!
//! Readers for MIVOT annotation blocks and the VOTable documents that carry
//! them, plus the structural checks and typed-view builder shared by the
//! mapping engine.
//!
//! ## Usage
//!
//! ```
//! # use mivot_parser::{parse_annotation, error::ParseError};
//!
//! fn main() -> Result<(), ParseError> {
//!     let source = r#"
//!         <VODML xmlns="http://www.ivoa.net/xml/mivot">
//!           <MODEL name="meas" url="https://www.ivoa.net/xml/Meas/20200908/Meas-v1.0.vo-dml.xml"/>
//!           <TEMPLATES>
//!             <INSTANCE dmtype="meas:Position">
//!               <ATTRIBUTE dmrole="meas:Position.ra" dmtype="ivoa:RealQuantity" ref="_ra" unit="deg"/>
//!             </INSTANCE>
//!           </TEMPLATES>
//!         </VODML>
//!     "#;
//!
//!     let tree = parse_annotation(source)?;
//!     assert_eq!(tree.node_count(), 5);
//!     Ok(())
//! }
//! ```

mod elaborate;
pub mod error;
mod validate;
mod votable;
mod xml;

pub use elaborate::{ItemKind, ViewBuilder};
pub use mivot_core::span::Span;
pub use validate::{index_templates, validate};

use mivot_core::{table::VoTable, tree::Tree};

use error::ParseError;

/// Parse and validate a MIVOT annotation block.
///
/// 1. **Read** - Build the node arena from the XML text
/// 2. **Validate** - Check the structure of every element
///
/// # Errors
///
/// Returns a [`ParseError`] when the text is not well-formed XML (`E001`),
/// when the block is missing or only reports a failure (`E002`), when the
/// root is not `VODML` (`E003`), or with every structural violation found.
pub fn parse_annotation(source: &str) -> Result<Tree, ParseError> {
    // Step 1: Read
    let tree = xml::read_annotation(source)?;

    // Step 2: Validate
    validate(&tree)?;

    Ok(tree)
}

/// Read a VOTable document with TABLEDATA serialization.
///
/// Annotation blocks are captured as text on their resources and are not
/// parsed here.
///
/// # Errors
///
/// Returns a [`ParseError`] for malformed XML (`E001`), a root other than
/// `VOTABLE` (`E003`), or table data that does not fit its fields (`E004`).
pub fn parse_votable(source: &str) -> Result<VoTable, ParseError> {
    Ok(votable::read_votable(source)?)
}

/// Write a MIVOT annotation block into the text of a VOTable document.
///
/// The block is wrapped in a `RESOURCE type="meta"` inside the first
/// `results` RESOURCE (or the first RESOURCE). The rest of the document is
/// kept byte for byte.
///
/// # Errors
///
/// Returns a [`ParseError`] for a malformed document (`E001`, `E003`), a
/// document without RESOURCE (`E100`), or a RESOURCE that already carries
/// a block while `replace` is unset (`E005`).
pub fn insert_annotation(votable: &str, block: &str, replace: bool) -> Result<String, ParseError> {
    Ok(votable::insert_annotation(votable, block, replace)?)
}

/// Read a single annotation element (an INSTANCE, a COLLECTION, ...) into
/// its own tree. No structural check is made until the element is part of
/// a block given to [`parse_annotation`].
///
/// # Errors
///
/// Returns a [`ParseError`] when the text is not well-formed XML (`E001`).
pub fn parse_element(source: &str) -> Result<Tree, ParseError> {
    Ok(xml::read_element(source)?)
}
