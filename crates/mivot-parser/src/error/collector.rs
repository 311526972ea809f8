//! Accumulates the violations found while validating an annotation block.

use crate::error::{Diagnostic, ParseError};

/// Gathers diagnostics so a single validation pass reports every broken
/// element of the block, in document order of discovery.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// `Err` holding everything emitted once any diagnostic is an error.
    /// Warnings alone let validation pass.
    pub fn finish(self) -> Result<(), ParseError> {
        if self
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity().is_error())
        {
            Err(self.diagnostics.into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_warnings_alone_pass() {
        assert!(DiagnosticCollector::new().finish().is_ok());

        let mut collector = DiagnosticCollector::new();
        collector.emit(Diagnostic::warning("ATTRIBUTE ref `mag` matches no column"));
        assert!(collector.finish().is_ok());
    }

    #[test]
    fn test_errors_keep_emission_order() {
        let mut collector = DiagnosticCollector::new();
        collector.emit(Diagnostic::error("INSTANCE without dmtype").with_code(ErrorCode::E202));
        collector.emit(Diagnostic::warning("suspicious ref"));
        collector.emit(Diagnostic::error("COLLECTION mixes kinds").with_code(ErrorCode::E200));

        let err = collector.finish().unwrap_err();
        let codes: Vec<_> = err.diagnostics().iter().map(Diagnostic::code).collect();
        assert_eq!(codes, vec![Some(ErrorCode::E202), None, Some(ErrorCode::E200)]);
    }
}
