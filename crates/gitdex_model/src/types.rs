//! Type and record identifiers.

use crate::error::{ModelError, ModelResult};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies a record type: a dotted namespace plus a type name.
///
/// Both parts end up as directory names in the working tree
/// (`<namespace>/<name>/<id>.json`), so they are restricted to values
/// that cannot escape or alias another directory:
/// - neither part may be empty or contain `/` or control characters
/// - the namespace may not start with `.`
/// - the name may not contain `.`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId {
    namespace: String,
    name: String,
}

impl TypeId {
    /// Creates a type id after validating both parts.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidTypeId`] if either part is unusable as
    /// a path segment.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> ModelResult<Self> {
        let namespace = namespace.into();
        let name = name.into();

        if namespace.is_empty() || name.is_empty() {
            return Err(ModelError::invalid_type_id("namespace and name must be non-empty"));
        }
        if namespace.starts_with('.') {
            return Err(ModelError::invalid_type_id(format!(
                "namespace {namespace:?} may not start with '.'"
            )));
        }
        if name.contains('.') {
            return Err(ModelError::invalid_type_id(format!(
                "name {name:?} may not contain '.'"
            )));
        }
        for part in [&namespace, &name] {
            if part.contains('/') || part.chars().any(char::is_control) {
                return Err(ModelError::invalid_type_id(format!(
                    "{part:?} is not a valid path segment"
                )));
            }
        }

        Ok(Self { namespace, name })
    }

    /// Parses a qualified name such as `"myapp.models.Person"`.
    ///
    /// The text after the last `.` is the type name.
    pub fn parse(qualified: &str) -> ModelResult<Self> {
        let (namespace, name) = qualified.rsplit_once('.').ok_or_else(|| {
            ModelError::invalid_type_id(format!("{qualified:?} has no namespace"))
        })?;
        Self::new(namespace, name)
    }

    /// Returns the namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `namespace.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Returns the document type name used inside a search index.
    ///
    /// ```
    /// use gitdex_model::TypeId;
    ///
    /// let ty = TypeId::new("myapp.models", "Person").unwrap();
    /// assert_eq!(ty.doc_type_name(), "myapp-models-PersonType");
    /// ```
    pub fn doc_type_name(&self) -> String {
        format!("{}-{}Type", self.namespace.replace('.', "-"), self.name)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for TypeId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Unique identifier of a record within its type.
///
/// Record ids become file stems, so they may not be empty and may not
/// contain `/`, `.` or control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id after validation.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidRecordId`] if the id cannot be used as
    /// a file stem.
    pub fn new(id: impl Into<String>) -> ModelResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ModelError::invalid_record_id(id, "empty"));
        }
        if id.contains('/') {
            return Err(ModelError::invalid_record_id(id, "contains '/'"));
        }
        if id.contains('.') {
            return Err(ModelError::invalid_record_id(id, "contains '.'"));
        }
        if id.chars().any(char::is_control) {
            return Err(ModelError::invalid_record_id(id, "contains control characters"));
        }
        Ok(Self(id))
    }

    /// Generates a fresh random id (UUID v4, hex without dashes).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RecordId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn type_id_accepts_dotted_namespace() {
        let ty = TypeId::new("myapp.models", "Person").unwrap();
        assert_eq!(ty.namespace(), "myapp.models");
        assert_eq!(ty.name(), "Person");
        assert_eq!(ty.qualified_name(), "myapp.models.Person");
        assert_eq!(ty.to_string(), "myapp.models.Person");
    }

    #[test]
    fn type_id_rejects_bad_segments() {
        assert!(TypeId::new("", "Person").is_err());
        assert!(TypeId::new("app", "").is_err());
        assert!(TypeId::new("app/models", "Person").is_err());
        assert!(TypeId::new("app", "Per.son").is_err());
        assert!(TypeId::new(".git", "Person").is_err());
        assert!(TypeId::new("..", "Person").is_err());
    }

    #[test]
    fn type_id_parse_splits_on_last_dot() {
        let ty: TypeId = "a.b.C".parse().unwrap();
        assert_eq!(ty.namespace(), "a.b");
        assert_eq!(ty.name(), "C");
        assert!(TypeId::parse("NoNamespace").is_err());
    }

    #[test]
    fn record_id_validation() {
        assert!(RecordId::new("abc123").is_ok());
        assert!(RecordId::new("").is_err());
        assert!(RecordId::new("a/b").is_err());
        assert!(RecordId::new("a.json").is_err());
        assert!(RecordId::new("a\nb").is_err());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(RecordId::new(a.as_str()).is_ok());
    }

    proptest! {
        #[test]
        fn accepted_record_ids_are_plain_file_stems(id in "[a-z0-9/.\\t]{0,10}") {
            let stem_like = !id.is_empty()
                && !id.contains(['/', '.'])
                && !id.chars().any(char::is_control);
            prop_assert_eq!(RecordId::new(id.as_str()).is_ok(), stem_like);
        }

        #[test]
        fn accepted_type_ids_survive_their_qualified_name(
            namespace in "[a-z.]{0,8}",
            name in "[A-Za-z/.]{0,6}",
        ) {
            if let Ok(ty) = TypeId::new(namespace.as_str(), name.as_str()) {
                prop_assert!(!ty.namespace().starts_with('.'));
                prop_assert!(!ty.name().contains(['.', '/']));
                prop_assert_eq!(TypeId::parse(&ty.qualified_name()).unwrap(), ty);
            }
        }
    }
}
