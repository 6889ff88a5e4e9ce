//! Mapping between record identities and repository paths.

use gitdex_model::{RecordId, TypeId};

/// Places records at `<namespace>/<Name>/<id>.<suffix>`.
///
/// `TypeId` and `RecordId` both reject `/`, and names and ids reject `.`,
/// so the mapping is injective and [`PathScheme::parse`] inverts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScheme {
    suffix: String,
}

impl PathScheme {
    /// Creates a scheme for files ending in `.<suffix>`.
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Returns the file suffix, without the dot.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Returns the directory holding every record of a type.
    pub fn type_dir(&self, type_id: &TypeId) -> String {
        format!("{}/{}", type_id.namespace(), type_id.name())
    }

    /// Returns the path of one record.
    pub fn path_for(&self, type_id: &TypeId, id: &RecordId) -> String {
        format!("{}/{}.{}", self.type_dir(type_id), id, self.suffix)
    }

    /// Splits a repository path into a type and an id.
    ///
    /// Returns `None` for anything that is not shaped like a record path;
    /// trees routinely hold unrelated files and callers skip them.
    pub fn parse(&self, path: &str) -> Option<(TypeId, RecordId)> {
        let mut parts = path.split('/');
        let (namespace, name, file_name) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let stem = file_name
            .strip_suffix(self.suffix.as_str())?
            .strip_suffix('.')?;
        let type_id = TypeId::new(namespace, name).ok()?;
        let id = RecordId::new(stem).ok()?;
        Some((type_id, id))
    }
}

impl Default for PathScheme {
    fn default() -> Self {
        Self::new("json")
    }
}
