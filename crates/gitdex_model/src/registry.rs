//! Registry of known record types.

use crate::schema::Schema;
use crate::types::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps type ids to their schemas.
///
/// Paths found in a working tree are only treated as records when their
/// type is registered here; anything else is unrelated content.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<TypeId, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous one for the same type.
    pub fn register(&mut self, schema: Arc<Schema>) -> Option<Arc<Schema>> {
        self.schemas.insert(schema.type_id().clone(), schema)
    }

    /// Looks up a schema.
    pub fn get(&self, type_id: &TypeId) -> Option<&Arc<Schema>> {
        self.schemas.get(type_id)
    }

    /// Looks up a schema by namespace and name without allocating a `TypeId`
    /// for invalid input.
    pub fn find(&self, namespace: &str, name: &str) -> Option<&Arc<Schema>> {
        self.schemas
            .iter()
            .find(|(ty, _)| ty.namespace() == namespace && ty.name() == name)
            .map(|(_, schema)| schema)
    }

    /// Iterates over all registered schemas.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};

    #[test]
    fn register_and_find() {
        let ty = TypeId::new("app.models", "Page").unwrap();
        let schema =
            Schema::shared(ty.clone(), vec![FieldSpec::new("title", FieldKind::Text)]).unwrap();

        let mut registry = SchemaRegistry::new();
        assert!(registry.register(Arc::clone(&schema)).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&ty).is_some());
        assert!(registry.find("app.models", "Page").is_some());
        assert!(registry.find("app.models", "Other").is_none());
        assert!(registry.register(schema).is_some());
    }
}
