//! Error types for MIVOT mapping operations.
//!
//! This module provides the main error type [`MivotError`]. Diagnostics
//! raised by the readers, seekers and resolver are sorted into variants by
//! the phase of their error code, so callers can tell a broken annotation
//! (binding, structure) from a failure limited to one row (resolution) or a
//! recoverable navigation miss (lookup).

use std::io;

use thiserror::Error;

use mivot_core::instance::LookupError;
use mivot_parser::error::{Diagnostic, ErrorCode, ParseError, Phase};

use crate::iterator::CursorError;

/// The main error type for MIVOT operations.
#[derive(Debug, Error)]
pub enum MivotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MIVOT annotation support is disabled in the viewer configuration")]
    Disabled,

    #[error("{err}")]
    Parse { err: ParseError, src: String },

    #[error("Binding error: {0}")]
    Binding(Diagnostic),

    #[error("Structural error: {0}")]
    Structure(Diagnostic),

    #[error("Resolution error: {0}")]
    Resolution(Diagnostic),

    #[error("Lookup error: {0}")]
    Lookup(Diagnostic),

    #[error("Lookup error: {0}")]
    View(#[from] LookupError),

    #[error("No table connected")]
    NotConnected,

    #[error("Annotation writer error: {0}")]
    Writer(String),

    #[error("Row cursor error: {0}")]
    Cursor(#[from] CursorError),
}

impl MivotError {
    /// Create a new `Parse` error with the associated source text.
    pub fn new_parse_error(err: ParseError, src: impl Into<String>) -> Self {
        Self::Parse {
            err,
            src: src.into(),
        }
    }

    /// Whether the error carries a diagnostic with `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        match self {
            MivotError::Parse { err, .. } => err.has_code(code),
            MivotError::Binding(diagnostic)
            | MivotError::Structure(diagnostic)
            | MivotError::Resolution(diagnostic)
            | MivotError::Lookup(diagnostic) => diagnostic.code() == Some(code),
            _ => false,
        }
    }

    /// The diagnostic carried by binding, structure, resolution and lookup errors.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            MivotError::Binding(diagnostic)
            | MivotError::Structure(diagnostic)
            | MivotError::Resolution(diagnostic)
            | MivotError::Lookup(diagnostic) => Some(diagnostic),
            MivotError::Parse { err, .. } => err.diagnostics().first(),
            _ => None,
        }
    }

    /// Render the error with source snippets under its labeled spans.
    ///
    /// Parse errors point into the text they carry. Diagnostics raised by a
    /// viewer point into its annotation block, which the caller passes as
    /// `annotation` (see [`crate::ModelViewer::annotation_source`]). Errors
    /// without a diagnostic or a source render as their message.
    pub fn render(&self, annotation: Option<&str>) -> String {
        match (self, annotation) {
            (MivotError::Parse { err, src }, _) if !src.is_empty() => err.render(src, "input"),
            (_, Some(source)) => match self.diagnostic() {
                Some(diagnostic) => diagnostic.render(source, "annotation"),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }
}

impl From<Diagnostic> for MivotError {
    fn from(diagnostic: Diagnostic) -> Self {
        match diagnostic.phase() {
            Some(Phase::Read) | None => MivotError::new_parse_error(diagnostic.into(), ""),
            Some(Phase::Binding) => MivotError::Binding(diagnostic),
            Some(Phase::Structure) => MivotError::Structure(diagnostic),
            Some(Phase::Resolution) => MivotError::Resolution(diagnostic),
            Some(Phase::Lookup) => MivotError::Lookup(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use mivot_parser::Span;

    use super::*;

    #[test]
    fn test_diagnostic_sorted_by_phase() {
        let err: MivotError = Diagnostic::error("unknown tableref").with_code(ErrorCode::E101).into();
        assert!(matches!(err, MivotError::Binding(_)));
        assert!(err.has_code(ErrorCode::E101));

        let err: MivotError = Diagnostic::error("cycle").with_code(ErrorCode::E302).into();
        assert!(matches!(err, MivotError::Resolution(_)));

        let err: MivotError = Diagnostic::error("mixed").with_code(ErrorCode::E200).into();
        assert!(matches!(err, MivotError::Structure(_)));

        let err: MivotError = Diagnostic::error("no role").with_code(ErrorCode::E401).into();
        assert!(matches!(err, MivotError::Lookup(_)));

        let err: MivotError = Diagnostic::error("bad xml").with_code(ErrorCode::E001).into();
        assert!(matches!(err, MivotError::Parse { .. }));
    }

    #[test]
    fn test_render_points_into_annotation() {
        let annotation = "<VODML>\n  <TEMPLATES tableref=\"Results\"/>\n</VODML>";
        let err: MivotError = Diagnostic::error("TEMPLATES `Results` maps no instance")
            .with_code(ErrorCode::E205)
            .with_label(Span::new(10..41), "empty block")
            .into();

        let rendered = err.render(Some(annotation));
        assert!(rendered.starts_with("error[E205]: TEMPLATES `Results` maps no instance\n"));
        assert!(rendered.contains(" --> annotation:2:3\n"));

        assert_eq!(err.render(None), err.to_string());
        assert_eq!(MivotError::NotConnected.render(Some(annotation)), "No table connected");
    }

    #[test]
    fn test_display() {
        let err: MivotError = Diagnostic::error("table `T` not found").with_code(ErrorCode::E105).into();
        assert_eq!(err.to_string(), "Binding error: error[E105]: table `T` not found");
        assert_eq!(
            MivotError::Disabled.to_string(),
            "MIVOT annotation support is disabled in the viewer configuration"
        );
    }
}
