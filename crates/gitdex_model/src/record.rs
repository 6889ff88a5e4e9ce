//! The generic record type.

use crate::error::ModelResult;
use crate::runtime::RuntimeInfo;
use crate::schema::{validate, Schema};
use crate::types::{RecordId, TypeId};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A typed record: a schema handle plus validated, ordered field values.
///
/// Identity is `(type, id)`. A record without an id can be built and
/// validated but cannot be persisted.
///
/// Records obtained from a search index or a read-only mirror are marked
/// read-only and are rejected by every store-mutating call. Updating a
/// record produces a new value and marks the old one read-only.
///
/// Equality compares type, id and fields. Version metadata, the read-only
/// flag and the routing hint are not part of a record's value.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    id: Option<RecordId>,
    fields: Map<String, Value>,
    version: Option<RuntimeInfo>,
    read_only: bool,
    tree_affinity: Option<String>,
}

impl Record {
    /// Validates `values` against `schema` and builds a record without an id.
    ///
    /// # Errors
    ///
    /// Returns a validation error, see [`validate`].
    pub fn new(schema: &Arc<Schema>, values: Map<String, Value>) -> ModelResult<Self> {
        validate(schema, values)
    }

    /// Validates `values` and assigns a freshly generated id.
    pub fn create(schema: &Arc<Schema>, values: Map<String, Value>) -> ModelResult<Self> {
        Ok(validate(schema, values)?.with_id(RecordId::generate()))
    }

    pub(crate) fn from_validated(schema: Arc<Schema>, fields: Map<String, Value>) -> Self {
        Self {
            schema,
            id: None,
            fields,
            version: None,
            read_only: false,
            tree_affinity: None,
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Assigns a generated id if the record has none, returning the id.
    pub fn ensure_id(&mut self) -> &RecordId {
        self.id.get_or_insert_with(RecordId::generate)
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the type id.
    pub fn type_id(&self) -> &TypeId {
        self.schema.type_id()
    }

    /// Returns the id, if assigned.
    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    /// Returns all field values in schema order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns one field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns the runtime stamp read from storage, if any.
    pub fn version(&self) -> Option<&RuntimeInfo> {
        self.version.as_ref()
    }

    /// Sets the runtime stamp.
    pub fn set_version(&mut self, version: RuntimeInfo) {
        self.version = Some(version);
    }

    /// Returns true if this record must not be passed to mutating calls.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Marks the record read-only.
    pub fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    /// Consumes the record and returns it marked read-only.
    #[must_use]
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Returns the name of the working tree this record was loaded from or
    /// stored to, used to route writes when several trees are managed.
    pub fn tree_affinity(&self) -> Option<&str> {
        self.tree_affinity.as_deref()
    }

    /// Sets the working tree routing hint.
    pub fn set_tree_affinity(&mut self, tree: impl Into<String>) {
        self.tree_affinity = Some(tree.into());
    }

    /// Builds an updated copy with `changes` applied over the current values.
    ///
    /// The new record keeps the id and routing hint; `self` becomes
    /// read-only because it no longer reflects what will be stored.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the merged values are invalid.
    pub fn update(&mut self, changes: Map<String, Value>) -> ModelResult<Record> {
        let mut values = self.fields.clone();
        for (key, value) in changes {
            let key = match self.schema.field(&key) {
                Some(spec) => spec.name.clone(),
                None => key,
            };
            values.insert(key, value);
        }
        let mut updated = validate(&self.schema, values)?;
        updated.id = self.id.clone();
        updated.tree_affinity = self.tree_affinity.clone();
        self.read_only = true;
        Ok(updated)
    }

    /// Returns the document body sent to the search index: the fields
    /// followed by `"uuid"`.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = self.fields.clone();
        let id = self
            .id
            .as_ref()
            .map_or(Value::Null, |id| Value::String(id.to_string()));
        doc.insert("uuid".into(), id);
        doc
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id() && self.id == other.id && self.fields == other.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use serde_json::json;

    fn person() -> Arc<Schema> {
        Schema::shared(
            TypeId::new("gitdex.tests", "Person").unwrap(),
            vec![
                FieldSpec::new("age", FieldKind::Integer),
                FieldSpec::new("name", FieldKind::Text).alias("full_name"),
            ],
        )
        .unwrap()
    }

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn create_assigns_id() {
        let record = Record::create(&person(), values(json!({"age": 1}))).unwrap();
        assert!(record.id().is_some());
        assert!(!record.is_read_only());
    }

    #[test]
    fn ensure_id_is_stable() {
        let mut record = Record::new(&person(), Map::new()).unwrap();
        let first = record.ensure_id().clone();
        assert_eq!(record.ensure_id(), &first);
    }

    #[test]
    fn update_marks_old_read_only() {
        let mut old = Record::create(&person(), values(json!({"age": 1, "name": "Foo"}))).unwrap();
        old.set_tree_affinity("repo-a");

        let new = old.update(values(json!({"full_name": "Bar"}))).unwrap();
        assert!(old.is_read_only());
        assert!(!new.is_read_only());
        assert_eq!(new.id(), old.id());
        assert_eq!(new.tree_affinity(), Some("repo-a"));
        assert_eq!(new.get("name"), Some(&json!("Bar")));
        assert_eq!(new.get("age"), Some(&json!(1)));
    }

    #[test]
    fn equality_ignores_volatile_metadata() {
        let a = Record::new(&person(), values(json!({"age": 1})))
            .unwrap()
            .with_id(RecordId::new("p1").unwrap());
        let mut b = a.clone().into_read_only();
        b.set_version(RuntimeInfo::new("other", "9.9.9"));
        assert_eq!(a, b);

        let c = a.clone().with_id(RecordId::new("p2").unwrap());
        assert_ne!(a, c);
    }

    #[test]
    fn document_carries_uuid() {
        let record = Record::new(&person(), values(json!({"age": 1})))
            .unwrap()
            .with_id(RecordId::new("p1").unwrap());
        let doc = record.to_document();
        assert_eq!(doc["uuid"], json!("p1"));
        assert_eq!(doc["age"], json!(1));
    }
}
