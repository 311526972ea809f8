//! Severity levels for diagnostics.

use std::fmt;

use log::Level;

/// How bad a diagnostic is.
///
/// Errors stop reading or viewing. Warnings are kept by the viewer and
/// logged, see `ModelViewer::warnings` in the `mivot` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    /// A usable but suspicious mapping, such as an ATTRIBUTE ref that
    /// matches no column of the connected table.
    Warning,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        *self == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        *self == Severity::Warning
    }

    /// The `log` level a diagnostic of this severity is reported at.
    pub fn log_level(&self) -> Level {
        match self {
            Severity::Error => Level::Error,
            Severity::Warning => Level::Warn,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}
