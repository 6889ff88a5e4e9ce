//! Record schemas and validation.
//!
//! A schema is an explicit value: an ordered list of field descriptors
//! registered once per record type. Validation is a pure function from a
//! schema and a map of raw values to a [`Record`].

use crate::error::{ModelError, ModelResult};
use crate::record::Record;
use crate::types::TypeId;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Field names the codec writes alongside the user's fields.
pub const RESERVED_FIELDS: [&str; 2] = ["uuid", "version"];

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// Integral number.
    Integer,
    /// Any number.
    Float,
    /// `true` / `false`.
    Boolean,
    /// JSON array.
    List,
    /// JSON object.
    Dict,
    /// Text holding an absolute URL.
    Url,
}

impl FieldKind {
    /// Returns the kind's name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "list",
            FieldKind::Dict => "dict",
            FieldKind::Url => "url",
        }
    }

    /// Returns the search backend type used in mapping hints.
    pub const fn mapping_type(self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Url | FieldKind::List => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Dict => "object",
        }
    }

    /// Returns true if `value` is acceptable for this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Dict => value.is_object(),
            FieldKind::Url => value.as_str().is_some_and(looks_like_url),
        }
    }
}

fn looks_like_url(text: &str) -> bool {
    let Some((scheme, rest)) = text.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let scheme_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    scheme_ok && !rest.is_empty()
}

/// Describes one field of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Canonical field name.
    pub name: String,
    /// Kind of value.
    pub kind: FieldKind,
    /// Value used when none is supplied.
    pub default: Option<Value>,
    /// Whether a non-null value must be present after defaults.
    pub required: bool,
    /// Deprecated names still accepted on input.
    pub aliases: Vec<String>,
    /// Human readable description.
    pub doc: Option<String>,
}

impl FieldSpec {
    /// Creates an optional field without a default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            required: false,
            aliases: Vec::new(),
            doc: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Adds a deprecated alias.
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.aliases.push(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|alias| alias == name)
    }
}

/// The schema of one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    type_id: TypeId,
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Creates a schema, checking that field names and aliases are unique
    /// and do not collide with reserved names.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ReservedField`] or [`ModelError::DuplicateField`].
    pub fn new(type_id: TypeId, fields: Vec<FieldSpec>) -> ModelResult<Self> {
        let mut seen: Vec<&str> = Vec::new();
        for field in &fields {
            for name in std::iter::once(&field.name).chain(field.aliases.iter()) {
                if RESERVED_FIELDS.contains(&name.as_str()) {
                    return Err(ModelError::ReservedField { field: name.clone() });
                }
                if seen.contains(&name.as_str()) {
                    return Err(ModelError::DuplicateField { field: name.clone() });
                }
                seen.push(name.as_str());
            }
        }
        Ok(Self { type_id, fields })
    }

    /// Creates a shared schema handle.
    pub fn shared(type_id: TypeId, fields: Vec<FieldSpec>) -> ModelResult<Arc<Self>> {
        Self::new(type_id, fields).map(Arc::new)
    }

    /// Returns the type id.
    pub fn type_id(&self) -> &TypeId {
        &self.type_id
    }

    /// Returns the fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by canonical name or alias.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.answers_to(name))
    }

    /// Returns the mapping hint for the search backend.
    pub fn mapping(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), json!({ "type": field.kind.mapping_type() }));
        }
        properties.insert("uuid".into(), json!({ "type": "string" }));
        properties.insert("version".into(), json!({ "type": "object" }));
        json!({ "properties": properties })
    }
}

/// Validates raw values against a schema and builds a record without an id.
///
/// Aliases are resolved to canonical names, defaults are applied, missing
/// optional fields become `null`, and every value is checked against its
/// field kind. Fields come out in schema order.
///
/// # Errors
///
/// Returns the first [`ModelError`] encountered.
pub fn validate(schema: &Arc<Schema>, values: Map<String, Value>) -> ModelResult<Record> {
    let mut supplied = Map::new();
    for (key, value) in values {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            return Err(ModelError::ReservedField { field: key });
        }
        let spec = schema.field(&key).ok_or_else(|| ModelError::UnknownField {
            type_name: schema.type_id.qualified_name(),
            field: key.clone(),
        })?;
        if supplied.contains_key(&spec.name) {
            return Err(ModelError::DuplicateField {
                field: spec.name.clone(),
            });
        }
        supplied.insert(spec.name.clone(), value);
    }

    let mut fields = Map::new();
    for spec in &schema.fields {
        let value = match supplied.remove(&spec.name) {
            Some(Value::Null) | None => spec.default.clone().unwrap_or(Value::Null),
            Some(value) => value,
        };
        if value.is_null() {
            if spec.required {
                return Err(ModelError::MissingField {
                    field: spec.name.clone(),
                });
            }
        } else if !spec.kind.accepts(&value) {
            return Err(ModelError::InvalidValue {
                field: spec.name.clone(),
                expected: spec.kind.name(),
            });
        }
        fields.insert(spec.name.clone(), value);
    }

    Ok(Record::from_validated(Arc::clone(schema), fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Arc<Schema> {
        Schema::shared(
            TypeId::new("gitdex.tests", "Person").unwrap(),
            vec![
                FieldSpec::new("age", FieldKind::Integer).required(),
                FieldSpec::new("name", FieldKind::Text).alias("full_name"),
                FieldSpec::new("active", FieldKind::Boolean).with_default(json!(true)),
                FieldSpec::new("homepage", FieldKind::Url),
            ],
        )
        .unwrap()
    }

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn applies_defaults_and_orders_fields() {
        let record = validate(&person(), values(json!({"name": "Foo", "age": 1}))).unwrap();
        let keys: Vec<&str> = record.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, ["age", "name", "active", "homepage"]);
        assert_eq!(record.get("active"), Some(&json!(true)));
        assert_eq!(record.get("homepage"), Some(&Value::Null));
        assert!(record.id().is_none());
    }

    #[test]
    fn resolves_aliases() {
        let record = validate(&person(), values(json!({"age": 3, "full_name": "Bar"}))).unwrap();
        assert_eq!(record.get("name"), Some(&json!("Bar")));
    }

    #[test]
    fn alias_and_canonical_together_is_duplicate() {
        let err = validate(
            &person(),
            values(json!({"age": 3, "name": "A", "full_name": "B"})),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateField { .. }));
    }

    #[test]
    fn rejects_missing_required() {
        let err = validate(&person(), values(json!({"name": "Foo"}))).unwrap_err();
        assert!(matches!(err, ModelError::MissingField { field } if field == "age"));
    }

    #[test]
    fn rejects_wrong_kind() {
        let err = validate(&person(), values(json!({"age": 1.5}))).unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { expected: "integer", .. }));

        let err = validate(&person(), values(json!({"age": 1, "homepage": "nope"}))).unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { expected: "url", .. }));
    }

    #[test]
    fn rejects_unknown_and_reserved() {
        let err = validate(&person(), values(json!({"age": 1, "height": 2}))).unwrap_err();
        assert!(matches!(err, ModelError::UnknownField { .. }));

        let err = validate(&person(), values(json!({"age": 1, "uuid": "x"}))).unwrap_err();
        assert!(matches!(err, ModelError::ReservedField { .. }));
    }

    #[test]
    fn schema_rejects_reserved_and_duplicate_names() {
        let ty = TypeId::new("a", "B").unwrap();
        assert!(Schema::new(ty.clone(), vec![FieldSpec::new("uuid", FieldKind::Text)]).is_err());
        assert!(Schema::new(
            ty,
            vec![
                FieldSpec::new("a", FieldKind::Text),
                FieldSpec::new("b", FieldKind::Text).alias("a"),
            ]
        )
        .is_err());
    }

    #[test]
    fn mapping_lists_every_field() {
        let mapping = person().mapping();
        let props = mapping["properties"].as_object().unwrap();
        assert_eq!(props["age"]["type"], "integer");
        assert_eq!(props["name"]["type"], "string");
        assert_eq!(props["active"]["type"], "boolean");
        assert!(props.contains_key("uuid"));
        assert!(props.contains_key("version"));
    }

    #[test]
    fn url_detection() {
        assert!(looks_like_url("https://example.org"));
        assert!(looks_like_url("git+ssh://host/repo"));
        assert!(!looks_like_url("example.org"));
        assert!(!looks_like_url("://missing"));
        assert!(!looks_like_url("http://"));
    }
}
