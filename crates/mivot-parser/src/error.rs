//! Error and diagnostic system for the MIVOT readers.
//!
//! This module provides an error handling system with:
//! - Error codes grouped by phase (reading, binding, structure, resolution, lookup)
//! - Multiple labeled spans pointing into the annotation source
//! - Severity levels, and rendering against the source as line:column snippets
//! - Diagnostic collector for accumulating multiple errors
//!
//! # Example
//!
//! ```
//! # use mivot_parser::error::{Diagnostic, ErrorCode, Phase};
//! # use mivot_parser::Span;
//!
//! let diag = Diagnostic::error("dmrole `meas:Position.ra` is used twice")
//!     .with_code(ErrorCode::E204)
//!     .with_label(Span::new(120..160), "duplicate role")
//!     .with_secondary_label(Span::new(40..80), "first used here")
//!     .with_help("give each child of an INSTANCE its own dmrole");
//!
//! assert_eq!(diag.phase(), Some(Phase::Structure));
//! ```

mod collector;
mod diagnostic;
mod error_code;
mod label;
mod parse_error;
mod severity;

pub(crate) use collector::DiagnosticCollector;

pub use diagnostic::Diagnostic;
pub use error_code::{ErrorCode, Phase};
pub use label::{Label, LabelStyle};
pub use parse_error::{ParseError, Result};
pub use severity::Severity;
