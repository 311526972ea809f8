//! Error codes for the MIVOT diagnostic system.
//!
//! Error codes are organized by phase:
//! - `E0xx` - Reading errors (XML and VOTable input)
//! - `E1xx` - Binding errors (resources, tables, TEMPLATES selection)
//! - `E2xx` - Structural errors (shape of instances and collections)
//! - `E3xx` - Resolution errors (REFERENCE/JOIN substitution, row values)
//! - `E4xx` - Lookup errors (navigation queries)

use std::fmt;

/// The processing phase an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Read,
    Binding,
    Structure,
    Resolution,
    Lookup,
}

/// Error codes for categorizing diagnostic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // =========================================================================
    // Reading Errors (E0xx)
    // =========================================================================
    /// Malformed XML.
    ///
    /// The annotation or VOTable text is not well-formed XML.
    E001,

    /// Annotation block not found.
    ///
    /// The selected resource carries no VODML block, or the block only
    /// holds a failure REPORT.
    E002,

    /// Unexpected root element.
    ///
    /// The document root is not the element the reader expects
    /// (`VODML` for annotations, `VOTABLE` for VOTable documents).
    E003,

    /// Malformed VOTable.
    ///
    /// Row data does not match the field definitions, a cell cannot be read
    /// with its declared datatype, or the serialization is not TABLEDATA.
    E004,

    /// Annotation block already present.
    ///
    /// The RESOURCE an annotation block is written into already carries one
    /// and replacing it was not requested.
    E005,

    // =========================================================================
    // Binding Errors (E1xx)
    // =========================================================================
    /// Resource not found.
    ///
    /// The resource index is out of range.
    E100,

    /// Unknown tableref.
    ///
    /// No TEMPLATES block is declared for the requested tableref.
    E101,

    /// Ambiguous TEMPLATES selection.
    ///
    /// Several TEMPLATES blocks exist and no tableref was given.
    E102,

    /// Duplicate TEMPLATES tableref.
    ///
    /// Two TEMPLATES blocks declare the same tableref.
    E103,

    /// Anonymous TEMPLATES not alone.
    ///
    /// A TEMPLATES block without tableref sits beside other TEMPLATES blocks.
    E104,

    /// Table not found.
    ///
    /// The resource has no table matching the tableref by ID or name.
    E105,

    /// No TEMPLATES block.
    ///
    /// The annotation declares no TEMPLATES at all.
    E106,

    // =========================================================================
    // Structural Errors (E2xx)
    // =========================================================================
    /// Mixed collection.
    ///
    /// A COLLECTION contains more than one kind of ATTRIBUTE, INSTANCE or
    /// COLLECTION children.
    E200,

    /// Instance cardinality.
    ///
    /// A block expected to hold exactly one top-level INSTANCE holds none or several.
    E201,

    /// Missing dmtype.
    E202,

    /// Missing dmrole.
    ///
    /// A child of an INSTANCE does not say which role it plays.
    E203,

    /// Duplicate dmrole.
    ///
    /// Two children of the same INSTANCE play the same role.
    E204,

    /// No head element.
    ///
    /// A TEMPLATES block has no INSTANCE or COLLECTION child.
    E205,

    /// Malformed placeholder.
    ///
    /// A REFERENCE, JOIN or WHERE lacks the attributes or children it needs.
    E206,

    // =========================================================================
    // Resolution Errors (E3xx)
    // =========================================================================
    /// Reference target not found.
    E300,

    /// Ambiguous dynamic match.
    ///
    /// A dynamic reference matches several foreign rows or items.
    E301,

    /// Cyclic reference.
    ///
    /// Resolving a placeholder would re-enter a definition it was copied from.
    E302,

    /// Resolution pass limit exceeded.
    E303,

    /// Unknown key column.
    ///
    /// A key refers to a column the table does not have, or the row is too short.
    E304,

    /// No current row.
    E305,

    /// Unresolved placeholder.
    ///
    /// A typed view was requested over content still holding REFERENCE or JOIN elements.
    E306,

    // =========================================================================
    // Lookup Errors (E4xx)
    // =========================================================================
    /// dmtype not found.
    E400,

    /// dmrole not found.
    E401,

    /// dmid not found.
    E402,

    /// Primary key not matched.
    ///
    /// No item, or more than one, carries the requested primary key.
    E403,
}

impl ErrorCode {
    /// Returns the numeric code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            // Reading errors
            ErrorCode::E001 => "E001",
            ErrorCode::E002 => "E002",
            ErrorCode::E003 => "E003",
            ErrorCode::E004 => "E004",
            ErrorCode::E005 => "E005",
            // Binding errors
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            ErrorCode::E103 => "E103",
            ErrorCode::E104 => "E104",
            ErrorCode::E105 => "E105",
            ErrorCode::E106 => "E106",
            // Structural errors
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
            ErrorCode::E202 => "E202",
            ErrorCode::E203 => "E203",
            ErrorCode::E204 => "E204",
            ErrorCode::E205 => "E205",
            ErrorCode::E206 => "E206",
            // Resolution errors
            ErrorCode::E300 => "E300",
            ErrorCode::E301 => "E301",
            ErrorCode::E302 => "E302",
            ErrorCode::E303 => "E303",
            ErrorCode::E304 => "E304",
            ErrorCode::E305 => "E305",
            ErrorCode::E306 => "E306",
            // Lookup errors
            ErrorCode::E400 => "E400",
            ErrorCode::E401 => "E401",
            ErrorCode::E402 => "E402",
            ErrorCode::E403 => "E403",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            // Reading errors
            ErrorCode::E001 => "malformed XML",
            ErrorCode::E002 => "annotation block not found",
            ErrorCode::E003 => "unexpected root element",
            ErrorCode::E004 => "malformed VOTable",
            ErrorCode::E005 => "annotation block already present",
            // Binding errors
            ErrorCode::E100 => "resource not found",
            ErrorCode::E101 => "unknown tableref",
            ErrorCode::E102 => "ambiguous TEMPLATES selection",
            ErrorCode::E103 => "duplicate TEMPLATES tableref",
            ErrorCode::E104 => "anonymous TEMPLATES not alone",
            ErrorCode::E105 => "table not found",
            ErrorCode::E106 => "no TEMPLATES block",
            // Structural errors
            ErrorCode::E200 => "mixed collection",
            ErrorCode::E201 => "instance cardinality",
            ErrorCode::E202 => "missing dmtype",
            ErrorCode::E203 => "missing dmrole",
            ErrorCode::E204 => "duplicate dmrole",
            ErrorCode::E205 => "no INSTANCE/COLLECTION found",
            ErrorCode::E206 => "malformed placeholder",
            // Resolution errors
            ErrorCode::E300 => "reference target not found",
            ErrorCode::E301 => "ambiguous dynamic match",
            ErrorCode::E302 => "cyclic reference",
            ErrorCode::E303 => "resolution pass limit exceeded",
            ErrorCode::E304 => "unknown key column",
            ErrorCode::E305 => "no current row",
            ErrorCode::E306 => "unresolved placeholder",
            // Lookup errors
            ErrorCode::E400 => "dmtype not found",
            ErrorCode::E401 => "dmrole not found",
            ErrorCode::E402 => "dmid not found",
            ErrorCode::E403 => "primary key not matched",
        }
    }

    /// Returns the phase this code belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            ErrorCode::E001
            | ErrorCode::E002
            | ErrorCode::E003
            | ErrorCode::E004
            | ErrorCode::E005 => Phase::Read,
            ErrorCode::E100
            | ErrorCode::E101
            | ErrorCode::E102
            | ErrorCode::E103
            | ErrorCode::E104
            | ErrorCode::E105
            | ErrorCode::E106 => Phase::Binding,
            ErrorCode::E200
            | ErrorCode::E201
            | ErrorCode::E202
            | ErrorCode::E203
            | ErrorCode::E204
            | ErrorCode::E205
            | ErrorCode::E206 => Phase::Structure,
            ErrorCode::E300
            | ErrorCode::E301
            | ErrorCode::E302
            | ErrorCode::E303
            | ErrorCode::E304
            | ErrorCode::E305
            | ErrorCode::E306 => Phase::Resolution,
            ErrorCode::E400 | ErrorCode::E401 | ErrorCode::E402 | ErrorCode::E403 => Phase::Lookup,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::E001.to_string(), "E001");
        assert_eq!(ErrorCode::E101.to_string(), "E101");
        assert_eq!(ErrorCode::E200.to_string(), "E200");
        assert_eq!(ErrorCode::E302.to_string(), "E302");
    }

    #[test]
    fn test_error_code_description() {
        assert_eq!(ErrorCode::E002.description(), "annotation block not found");
        assert_eq!(ErrorCode::E200.description(), "mixed collection");
        assert_eq!(ErrorCode::E302.description(), "cyclic reference");
    }

    #[test]
    fn test_error_code_phase() {
        assert_eq!(ErrorCode::E004.phase(), Phase::Read);
        assert_eq!(ErrorCode::E105.phase(), Phase::Binding);
        assert_eq!(ErrorCode::E201.phase(), Phase::Structure);
        assert_eq!(ErrorCode::E301.phase(), Phase::Resolution);
        assert_eq!(ErrorCode::E401.phase(), Phase::Lookup);
    }
}
