//! Property-based test generators.

use gitdex_model::RecordId;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Generates valid record ids.
pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
    "[a-zA-Z0-9_-]{1,24}".prop_map(|id| RecordId::new(id).expect("pattern yields valid ids"))
}

/// Generates person ages.
pub fn arb_age() -> impl Strategy<Value = i64> {
    0i64..150
}

/// Generates person names, including non-ASCII ones.
pub fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof!["[A-Za-z ]{0,16}", "\\PC{0,16}"]
}

/// Generates the field values of a person.
pub fn arb_person_values() -> impl Strategy<Value = Map<String, Value>> {
    (arb_age(), arb_name()).prop_map(|(age, name)| crate::fixtures::person_values(age, &name))
}

/// Generates commit messages, including non-ASCII ones.
pub fn arb_message() -> impl Strategy<Value = String> {
    prop_oneof!["[A-Za-z0-9 .,]{1,40}", "[a-zàéîõüñçß ]{1,40}"]
}
