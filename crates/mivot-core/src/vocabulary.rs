//! The MIVOT vocabulary: element tags, attribute names and the sentinels
//! used by the mapping engine.

use std::fmt;

/// Key of the anonymous TEMPLATES block, and the table reference that
/// always designates the first table of a resource.
pub const FIRST_TABLE: &str = "first_table";

/// Pseudo dmtype given to a TEMPLATES head element that is a COLLECTION.
pub const ROOT_COLLECTION: &str = "root_collection";

/// Literal marking a `ref` or `value` that carries no data.
pub const NOT_SET: &str = "NotSet";

/// Identifier synthesized for tables that have neither `ID` nor `name`.
pub const ANONYMOUS_TABLE: &str = "AnonymousTable";

/// Attribute names used on MIVOT elements.
pub mod attr {
    pub const DMTYPE: &str = "dmtype";
    pub const DMROLE: &str = "dmrole";
    pub const DMID: &str = "dmid";
    pub const DMREF: &str = "dmref";
    pub const VALUE: &str = "value";
    pub const UNIT: &str = "unit";
    pub const REF: &str = "ref";
    pub const SOURCEREF: &str = "sourceref";
    pub const TABLEREF: &str = "tableref";
    pub const FOREIGNKEY: &str = "foreignkey";
    pub const PRIMARYKEY: &str = "primarykey";
    pub const NAME: &str = "name";
    pub const URL: &str = "url";
    pub const STATUS: &str = "status";
}

/// The tag of an annotation element.
///
/// Namespace prefixes are not part of the tag: `mivot:INSTANCE` and
/// `INSTANCE` both map to [`Tag::Instance`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Vodml,
    Report,
    Model,
    Globals,
    Templates,
    Instance,
    Attribute,
    Collection,
    Reference,
    Join,
    Where,
    PrimaryKey,
    ForeignKey,
    /// Any element outside the MIVOT vocabulary, kept verbatim.
    Other(String),
}

impl Tag {
    /// Map a local element name onto its tag.
    pub fn from_name(name: &str) -> Self {
        match name {
            "VODML" => Tag::Vodml,
            "REPORT" => Tag::Report,
            "MODEL" => Tag::Model,
            "GLOBALS" => Tag::Globals,
            "TEMPLATES" => Tag::Templates,
            "INSTANCE" => Tag::Instance,
            "ATTRIBUTE" => Tag::Attribute,
            "COLLECTION" => Tag::Collection,
            "REFERENCE" => Tag::Reference,
            "JOIN" => Tag::Join,
            "WHERE" => Tag::Where,
            "PRIMARY_KEY" => Tag::PrimaryKey,
            "FOREIGN_KEY" => Tag::ForeignKey,
            other => Tag::Other(other.to_string()),
        }
    }

    /// The element name written back to XML.
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Vodml => "VODML",
            Tag::Report => "REPORT",
            Tag::Model => "MODEL",
            Tag::Globals => "GLOBALS",
            Tag::Templates => "TEMPLATES",
            Tag::Instance => "INSTANCE",
            Tag::Attribute => "ATTRIBUTE",
            Tag::Collection => "COLLECTION",
            Tag::Reference => "REFERENCE",
            Tag::Join => "JOIN",
            Tag::Where => "WHERE",
            Tag::PrimaryKey => "PRIMARY_KEY",
            Tag::ForeignKey => "FOREIGN_KEY",
            Tag::Other(name) => name,
        }
    }

    /// REFERENCE and JOIN elements stand in for content substituted at resolution time.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Tag::Reference | Tag::Join)
    }

    /// Elements that carry model content: ATTRIBUTE, INSTANCE and COLLECTION.
    pub fn is_model_element(&self) -> bool {
        matches!(self, Tag::Attribute | Tag::Instance | Tag::Collection)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip_names() {
        for name in [
            "VODML",
            "REPORT",
            "MODEL",
            "GLOBALS",
            "TEMPLATES",
            "INSTANCE",
            "ATTRIBUTE",
            "COLLECTION",
            "REFERENCE",
            "JOIN",
            "WHERE",
            "PRIMARY_KEY",
            "FOREIGN_KEY",
        ] {
            assert_eq!(Tag::from_name(name).as_str(), name);
        }
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        let tag = Tag::from_name("DESCRIPTION");
        assert_eq!(tag, Tag::Other("DESCRIPTION".to_string()));
        assert_eq!(tag.to_string(), "DESCRIPTION");
    }

    #[test]
    fn test_tag_kinds() {
        assert!(Tag::Reference.is_placeholder());
        assert!(Tag::Join.is_placeholder());
        assert!(!Tag::Instance.is_placeholder());
        assert!(Tag::Collection.is_model_element());
        assert!(!Tag::Where.is_model_element());
    }
}
