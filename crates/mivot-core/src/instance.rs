//! Typed views over resolved annotation content.
//!
//! A [`MivotInstance`] exposes the children of an INSTANCE element by role
//! name. Each role maps to a [`RoleValue`]: a leaf [`Attribute`], a nested
//! [`MivotInstance`] or a [`Collection`]. Roles can be looked up either by
//! their full `dmrole` (`meas:Position.ra`) or by its short form (`ra`).
//!
//! Attributes bound to a table column remember the column index so the
//! whole view can be refreshed in place with [`MivotInstance::update`].

use indexmap::IndexMap;
use log::trace;
use thiserror::Error;

use crate::{table::Value, vocabulary::ROOT_COLLECTION};

/// Separator between role names in [`MivotInstance::get_attribute`] paths.
pub const PATH_SEPARATOR: char = '/';

/// Errors raised while navigating a typed view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Cannot find dmrole {role} in instance of type {dmtype}")]
    RoleNotFound { role: String, dmtype: String },

    #[error("dmrole {role} of {dmtype} holds {found}, not {expected}")]
    KindMismatch {
        role: String,
        dmtype: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("empty attribute path")]
    EmptyPath,
}

/// Strip the model prefix and owning type from a role: `model:Type.role` becomes `role`.
pub fn short_role(role: &str) -> &str {
    let without_model = role.rsplit_once(':').map_or(role, |(_, rest)| rest);
    without_model
        .rsplit_once('.')
        .map_or(without_model, |(_, rest)| rest)
}

/// A typed attribute value, cast from its text according to the dmtype.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    /// Cast raw annotation text according to `dmtype`.
    ///
    /// - `NotSet`, `noset`, `null` and `none` (any case) are null.
    /// - dmtypes containing `bool` give `true` for `1` or text containing `true`.
    /// - dmtypes containing `real`, `double` or `float` parse as `f64`.
    /// - anything else stays text.
    pub fn cast(dmtype: &str, raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return AttributeValue::Null;
        };
        let lowered = raw.trim().to_lowercase();
        if matches!(lowered.as_str(), "notset" | "noset" | "null" | "none") {
            return AttributeValue::Null;
        }

        let dmtype = dmtype.to_lowercase();
        if dmtype.contains("bool") {
            return AttributeValue::Bool(lowered == "1" || lowered.contains("true"));
        }
        if ["real", "double", "float"]
            .iter()
            .any(|kind| dmtype.contains(kind))
        {
            return match lowered.parse::<f64>() {
                Ok(value) => AttributeValue::Real(value),
                Err(_) => AttributeValue::Text(raw.to_string()),
            };
        }
        AttributeValue::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// A leaf value with its dmtype and unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    dmtype: String,
    dmrole: Option<String>,
    raw: Option<String>,
    value: AttributeValue,
    unit: Option<String>,
    reference: Option<String>,
    column: Option<usize>,
}

impl Attribute {
    pub fn new(dmtype: impl Into<String>, raw: Option<String>) -> Self {
        let dmtype = dmtype.into();
        let value = AttributeValue::cast(&dmtype, raw.as_deref());
        Self {
            dmtype,
            dmrole: None,
            raw,
            value,
            unit: None,
            reference: None,
            column: None,
        }
    }

    pub fn with_role(mut self, dmrole: impl Into<String>) -> Self {
        self.dmrole = Some(dmrole.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Bind the attribute to the zero-based column refreshed by [`Attribute::update`].
    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    pub fn dmtype(&self) -> &str {
        &self.dmtype
    }

    pub fn dmrole(&self) -> Option<&str> {
        self.dmrole.as_deref()
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    /// The value as written in the annotation, before casting.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// The column identifier this attribute was mapped from.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// Refresh the value from `row`. Attributes without a column are left untouched.
    pub fn update(&mut self, row: &[Value]) {
        let Some(cell) = self.column.and_then(|column| row.get(column)) else {
            return;
        };
        let raw = cell.annotation_text();
        self.value = AttributeValue::cast(&self.dmtype, Some(&raw));
        self.raw = Some(raw);
    }
}

/// The ordered content of a COLLECTION: all of one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionItems {
    Empty,
    Attributes(Vec<Attribute>),
    Instances(Vec<MivotInstance>),
    Collections(Vec<Collection>),
}

impl CollectionItems {
    pub fn len(&self) -> usize {
        match self {
            CollectionItems::Empty => 0,
            CollectionItems::Attributes(items) => items.len(),
            CollectionItems::Instances(items) => items.len(),
            CollectionItems::Collections(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A homogeneous, ordered group of attributes, instances or collections.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    dmrole: Option<String>,
    dmid: Option<String>,
    items: CollectionItems,
}

impl Collection {
    pub fn new(items: CollectionItems) -> Self {
        Self {
            dmrole: None,
            dmid: None,
            items,
        }
    }

    pub fn with_role(mut self, dmrole: impl Into<String>) -> Self {
        self.dmrole = Some(dmrole.into());
        self
    }

    pub fn with_dmid(mut self, dmid: impl Into<String>) -> Self {
        self.dmid = Some(dmid.into());
        self
    }

    pub fn dmrole(&self) -> Option<&str> {
        self.dmrole.as_deref()
    }

    pub fn dmid(&self) -> Option<&str> {
        self.dmid.as_deref()
    }

    /// Collections have no dmtype of their own; they report [`ROOT_COLLECTION`].
    pub fn dmtype(&self) -> &str {
        ROOT_COLLECTION
    }

    pub fn items(&self) -> &CollectionItems {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Instance items, or an empty slice for other kinds.
    pub fn instances(&self) -> &[MivotInstance] {
        match &self.items {
            CollectionItems::Instances(items) => items,
            _ => &[],
        }
    }

    pub fn update(&mut self, row: &[Value]) {
        match &mut self.items {
            CollectionItems::Empty => {}
            CollectionItems::Attributes(items) => items.iter_mut().for_each(|a| a.update(row)),
            CollectionItems::Instances(items) => items.iter_mut().for_each(|i| i.update(row)),
            CollectionItems::Collections(items) => items.iter_mut().for_each(|c| c.update(row)),
        }
    }
}

/// What a role of an instance holds.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleValue {
    Attribute(Attribute),
    Instance(MivotInstance),
    Collection(Collection),
}

impl RoleValue {
    fn kind(&self) -> &'static str {
        match self {
            RoleValue::Attribute(_) => "an ATTRIBUTE",
            RoleValue::Instance(_) => "an INSTANCE",
            RoleValue::Collection(_) => "a COLLECTION",
        }
    }

    fn update(&mut self, row: &[Value]) {
        match self {
            RoleValue::Attribute(attribute) => attribute.update(row),
            RoleValue::Instance(instance) => instance.update(row),
            RoleValue::Collection(collection) => collection.update(row),
        }
    }
}

/// A typed INSTANCE whose children are addressed by role.
#[derive(Debug, Clone, PartialEq)]
pub struct MivotInstance {
    dmtype: String,
    dmrole: Option<String>,
    dmid: Option<String>,
    roles: IndexMap<String, RoleValue>,
}

impl MivotInstance {
    pub fn new(dmtype: impl Into<String>) -> Self {
        Self {
            dmtype: dmtype.into(),
            dmrole: None,
            dmid: None,
            roles: IndexMap::new(),
        }
    }

    pub fn with_role(mut self, dmrole: impl Into<String>) -> Self {
        self.dmrole = Some(dmrole.into());
        self
    }

    pub fn with_dmid(mut self, dmid: impl Into<String>) -> Self {
        self.dmid = Some(dmid.into());
        self
    }

    pub fn dmtype(&self) -> &str {
        &self.dmtype
    }

    pub fn dmrole(&self) -> Option<&str> {
        self.dmrole.as_deref()
    }

    pub fn dmid(&self) -> Option<&str> {
        self.dmid.as_deref()
    }

    /// Add a child under its full role name, returning the value it replaced.
    pub fn insert(&mut self, role: impl Into<String>, value: RoleValue) -> Option<RoleValue> {
        self.roles.insert(role.into(), value)
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.find(role).is_some()
    }

    /// Iterate over `(full role, value)` pairs in document order.
    pub fn roles(&self) -> impl Iterator<Item = (&str, &RoleValue)> {
        self.roles.iter().map(|(role, value)| (role.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Look up a role by full or short name.
    pub fn get(&self, role: &str) -> Result<&RoleValue, LookupError> {
        self.find(role).ok_or_else(|| LookupError::RoleNotFound {
            role: role.to_string(),
            dmtype: self.dmtype.clone(),
        })
    }

    pub fn attribute(&self, role: &str) -> Result<&Attribute, LookupError> {
        match self.get(role)? {
            RoleValue::Attribute(attribute) => Ok(attribute),
            other => Err(self.mismatch(role, "an ATTRIBUTE", other)),
        }
    }

    pub fn instance(&self, role: &str) -> Result<&MivotInstance, LookupError> {
        match self.get(role)? {
            RoleValue::Instance(instance) => Ok(instance),
            other => Err(self.mismatch(role, "an INSTANCE", other)),
        }
    }

    pub fn collection(&self, role: &str) -> Result<&Collection, LookupError> {
        match self.get(role)? {
            RoleValue::Collection(collection) => Ok(collection),
            other => Err(self.mismatch(role, "a COLLECTION", other)),
        }
    }

    /// Follow a `/`-separated path of roles through nested instances down to an attribute,
    /// e.g. `position/ra`.
    pub fn get_attribute(&self, path: &str) -> Result<&Attribute, LookupError> {
        let mut segments: Vec<&str> = path
            .split(PATH_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect();
        let last = segments.pop().ok_or(LookupError::EmptyPath)?;

        let mut current = self;
        for segment in segments {
            current = current.instance(segment)?;
        }
        current.attribute(last)
    }

    /// Re-render every column-bound attribute against a new row.
    pub fn update(&mut self, row: &[Value]) {
        trace!(dmtype = self.dmtype.as_str(); "Updating instance from row");
        for value in self.roles.values_mut() {
            value.update(row);
        }
    }

    fn find(&self, role: &str) -> Option<&RoleValue> {
        self.roles.get(role).or_else(|| {
            self.roles
                .iter()
                .find(|(full, _)| short_role(full) == role)
                .map(|(_, value)| value)
        })
    }

    fn mismatch(&self, role: &str, expected: &'static str, found: &RoleValue) -> LookupError {
        LookupError::KindMismatch {
            role: role.to_string(),
            dmtype: self.dmtype.clone(),
            expected,
            found: found.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;

    fn position() -> MivotInstance {
        let mut position = MivotInstance::new("meas:Position").with_role("mango:Source.position");
        position.insert(
            "meas:Position.ra",
            RoleValue::Attribute(
                Attribute::new("ivoa:RealQuantity", Some("10.5".into()))
                    .with_role("meas:Position.ra")
                    .with_unit("deg")
                    .with_column(0),
            ),
        );
        position.insert(
            "meas:Position.frame",
            RoleValue::Attribute(Attribute::new("ivoa:string", Some("ICRS".into()))),
        );

        let mut source = MivotInstance::new("mango:Source");
        source.insert("mango:Source.position", RoleValue::Instance(position));
        source.insert(
            "mango:Source.flags",
            RoleValue::Collection(Collection::new(CollectionItems::Empty)),
        );
        source
    }

    #[test]
    fn test_short_role() {
        assert_eq!(short_role("meas:Position.ra"), "ra");
        assert_eq!(short_role("coords:time.TimeStamp.date"), "date");
        assert_eq!(short_role("plain"), "plain");
    }

    #[test]
    fn test_cast_rules() {
        assert_eq!(AttributeValue::cast("ivoa:bool", Some("1")), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::cast("ivoa:boolean", Some("True")), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::cast("ivoa:boolean", Some("0")), AttributeValue::Bool(false));
        assert_eq!(AttributeValue::cast("ivoa:real", Some("NotSet")), AttributeValue::Null);
        assert_eq!(AttributeValue::cast("ivoa:string", Some("None")), AttributeValue::Null);
        assert_eq!(AttributeValue::cast("ivoa:real", None), AttributeValue::Null);
        assert_eq!(
            AttributeValue::cast("ivoa:string", Some("ICRS")),
            AttributeValue::Text("ICRS".into())
        );
        assert_eq!(
            AttributeValue::cast("ivoa:integer", Some("12")),
            AttributeValue::Text("12".into())
        );
        let real = AttributeValue::cast("ivoa:RealQuantity", Some(" 2.5 "));
        assert!(approx_eq!(f64, real.as_f64().unwrap(), 2.5));
    }

    #[test]
    fn test_unparseable_real_stays_text() {
        assert_eq!(
            AttributeValue::cast("ivoa:double", Some("abc")),
            AttributeValue::Text("abc".into())
        );
    }

    #[test]
    fn test_lookup_by_full_and_short_role() {
        let source = position();
        let by_full = source.instance("mango:Source.position").unwrap();
        let by_short = source.instance("position").unwrap();
        assert_eq!(by_full, by_short);
        assert_eq!(by_short.attribute("ra").unwrap().unit(), Some("deg"));
    }

    #[test]
    fn test_lookup_missing_role() {
        let source = position();
        let err = source.get("velocity").unwrap_err();
        assert_eq!(
            err,
            LookupError::RoleNotFound {
                role: "velocity".into(),
                dmtype: "mango:Source".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Cannot find dmrole velocity in instance of type mango:Source"
        );
    }

    #[test]
    fn test_lookup_kind_mismatch() {
        let source = position();
        let err = source.attribute("flags").unwrap_err();
        assert!(matches!(
            err,
            LookupError::KindMismatch {
                expected: "an ATTRIBUTE",
                found: "a COLLECTION",
                ..
            }
        ));
    }

    #[test]
    fn test_get_attribute_path() {
        let source = position();
        let ra = source.get_attribute("position/ra").unwrap();
        assert!(approx_eq!(f64, ra.value().as_f64().unwrap(), 10.5));
        assert_eq!(source.get_attribute(""), Err(LookupError::EmptyPath));
        assert!(source.get_attribute("position/dec").is_err());
    }

    #[test]
    fn test_update_refreshes_bound_attributes_only() {
        let mut source = position();
        source.update(&[Value::Float(99.25), Value::Text("ignored".into())]);

        let ra = source.get_attribute("position/ra").unwrap();
        assert!(approx_eq!(f64, ra.value().as_f64().unwrap(), 99.25));
        assert_eq!(ra.raw(), Some("99.25"));

        let frame = source.get_attribute("position/frame").unwrap();
        assert_eq!(frame.value(), &AttributeValue::Text("ICRS".into()));
    }

    #[test]
    fn test_update_with_null_cell() {
        let mut source = position();
        source.update(&[Value::Null]);
        let ra = source.get_attribute("position/ra").unwrap();
        assert!(ra.value().is_null());
    }

    #[test]
    fn test_collection_instances() {
        let collection = Collection::new(CollectionItems::Instances(vec![
            MivotInstance::new("a:A"),
            MivotInstance::new("a:A"),
        ]))
        .with_role("a:B.items");
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.instances().len(), 2);
        assert_eq!(collection.dmtype(), "root_collection");
        assert!(Collection::new(CollectionItems::Empty).is_empty());
    }
}
