//! The core diagnostic type.
//!
//! A [`Diagnostic`] represents a single error or warning with optional
//! error code, multiple labeled source spans, and help text.

use std::fmt;

use crate::{
    Span,
    error::{ErrorCode, Label, Phase, Severity},
};

/// A rich diagnostic message with source location information.
///
/// # Example
///
/// ```text
/// error[E103]: TEMPLATES tableref `Results` is declared twice
///   --> annotation:14:3
///    |
/// 14 |   <TEMPLATES tableref="Results">
///    |   ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ duplicate declaration
///  --> annotation:6:3
///   |
/// 6 |   <TEMPLATES tableref="Results">
///   |   ------------------------------ first declared here
///   = help: give each table a single TEMPLATES block
/// ```
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    code: Option<ErrorCode>,
    message: String,
    labels: Vec<Label>,
    help: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    ///
    /// # Example
    ///
    /// ```
    /// # use mivot_parser::error::{Diagnostic, ErrorCode};
    /// # use mivot_parser::Span;
    ///
    /// let diag = Diagnostic::error("unknown tableref `Results`")
    ///     .with_code(ErrorCode::E101)
    ///     .with_label(Span::new(0..10), "not declared")
    ///     .with_help("declared tablerefs: [first_table]");
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Get the severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Get the error code, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Get the phase of the error code, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.code.map(|code| code.phase())
    }

    /// Get the primary message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get all labels attached to this diagnostic.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Get the span of the first primary label.
    pub fn primary_span(&self) -> Option<Span> {
        self.labels
            .iter()
            .find(|label| label.is_primary())
            .map(Label::span)
    }

    /// Get the help text, if any.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Set the error code.
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Add a primary label to this diagnostic.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    /// Add a primary label when the span is known.
    pub fn with_optional_label(self, span: Option<Span>, message: impl Into<String>) -> Self {
        match span {
            Some(span) => self.with_label(span, message),
            None => self,
        }
    }

    /// Add a secondary label to this diagnostic.
    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    /// Set the help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the diagnostic with a snippet of `source` under every label,
    /// as shown on [`Diagnostic`]. `name` identifies the source.
    pub fn render(&self, source: &str, name: &str) -> String {
        let mut out = format!("{self}\n");
        for label in &self.labels {
            out.push_str(&label.render(source, name));
        }
        if let Some(help) = &self.help {
            out.push_str(&format!("  = help: {help}\n"));
        }
        out
    }

    /// Create a new diagnostic with the given severity and message.
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            help: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format: "error[E001]: message" or "error: message"
        write!(f, "{}", self.severity)?;
        if let Some(code) = self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for Diagnostic {}
