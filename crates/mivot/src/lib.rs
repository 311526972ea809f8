//! MIVOT - Row-by-row interpretation of MIVOT annotations over VOTable data.
//!
//! A MIVOT annotation block describes how the columns of a VOTable map onto
//! instances of IVOA data models. The [`ModelViewer`] reads that block,
//! connects one table, and for each row produces a resolved XML snapshot and
//! a typed [`MivotInstance`] with references expanded, values filled and
//! units attached. [`MivotAnnotations`] goes the other way and writes an
//! annotation block into a VOTable.
//!
//! ## Usage
//!
//! ```
//! use mivot::{ModelViewer, MivotError, config::ViewerConfig};
//!
//! fn main() -> Result<(), MivotError> {
//!     let source = r#"<VOTABLE>
//!       <RESOURCE>
//!         <VODML>
//!           <GLOBALS>
//!             <INSTANCE dmtype="coords:SpaceSys" dmid="_icrs">
//!               <ATTRIBUTE dmrole="coords:SpaceSys.frame" dmtype="ivoa:string" value="ICRS"/>
//!             </INSTANCE>
//!           </GLOBALS>
//!           <TEMPLATES>
//!             <INSTANCE dmtype="meas:Position">
//!               <ATTRIBUTE dmrole="meas:Position.ra" dmtype="ivoa:RealQuantity" ref="ra"/>
//!               <REFERENCE dmrole="meas:Position.coordSys" dmref="_icrs"/>
//!             </INSTANCE>
//!           </TEMPLATES>
//!         </VODML>
//!         <TABLE>
//!           <FIELD name="ra" datatype="double" unit="deg"/>
//!           <DATA><TABLEDATA>
//!             <TR><TD>10.5</TD></TR>
//!             <TR><TD>11.5</TD></TR>
//!           </TABLEDATA></DATA>
//!         </TABLE>
//!       </RESOURCE>
//!     </VOTABLE>"#;
//!
//!     let mut viewer = ModelViewer::from_votable_str(source, ViewerConfig::default())?;
//!     while let Some(position) = viewer.next_row_view()? {
//!         let frame = position.get_attribute("coordSys/frame")?;
//!         assert_eq!(frame.value().as_str(), Some("ICRS"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod iterator;
pub mod resolver;
pub mod seekers;
pub mod viewer;
pub mod writer;
pub mod xml_view;

pub use mivot_core::{
    instance::{Attribute, AttributeValue, Collection, MivotInstance, RoleValue},
    table::{Value, VoTable},
    tree::Tree,
};
pub use mivot_parser::{
    error::{Diagnostic, ErrorCode},
    insert_annotation, parse_annotation, parse_element, parse_votable,
};

pub use error::MivotError;
pub use viewer::{HeadElement, HeadKind, ModelViewer};
pub use writer::MivotAnnotations;
pub use xml_view::XmlView;
