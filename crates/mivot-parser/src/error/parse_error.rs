//! The ParseError type for wrapping reading and validation diagnostics.

use std::fmt;

use crate::error::{Diagnostic, ErrorCode};

/// A type alias for `Result<T, Diagnostic>`.
pub type Result<T> = std::result::Result<T, Diagnostic>;

/// Error type for reading and validating annotation and VOTable documents.
///
/// Wraps one or more diagnostics.
#[derive(Debug)]
pub struct ParseError {
    diagnostics: Vec<Diagnostic>,
}

impl ParseError {
    /// Create a new parse error from diagnostics.
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// Get all diagnostics in this error.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Whether any diagnostic carries `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.code() == Some(code))
    }

    /// Render every diagnostic against `source`, separated by blank lines.
    pub fn render(&self, source: &str, name: &str) -> String {
        self.diagnostics
            .iter()
            .map(|diagnostic| diagnostic.render(source, name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(first) = self.diagnostics.first() {
            write!(f, "{}", first)?;
            if self.diagnostics.len() > 1 {
                write!(f, " (+{} more)", self.diagnostics.len() - 1)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<Diagnostic> for ParseError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }
}

impl From<Vec<Diagnostic>> for ParseError {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_from_diagnostic() {
        let diag = Diagnostic::error("test error").with_code(ErrorCode::E001);
        let err: ParseError = diag.into();

        assert_eq!(err.diagnostics().len(), 1);
        assert!(err.has_code(ErrorCode::E001));
        assert!(!err.has_code(ErrorCode::E002));
    }

    #[test]
    fn test_parse_error_display_single() {
        let err: ParseError = Diagnostic::error("missing dmtype").into();

        assert_eq!(err.to_string(), "error: missing dmtype");
    }

    #[test]
    fn test_parse_error_display_multiple() {
        let diags = vec![
            Diagnostic::error("first error"),
            Diagnostic::error("second error"),
            Diagnostic::error("third error"),
        ];
        let err: ParseError = diags.into();

        assert_eq!(err.to_string(), "error: first error (+2 more)");
    }
}
