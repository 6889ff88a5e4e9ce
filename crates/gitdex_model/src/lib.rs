//! # gitdex Model
//!
//! Record, schema and codec types for gitdex.
//!
//! A record type is described once by a [`Schema`]: an ordered list of
//! [`FieldSpec`]s with kinds, defaults, required flags and deprecated
//! aliases. Records are generic values validated against their schema;
//! there is no per-type code generation.
//!
//! ## Example
//!
//! ```
//! use gitdex_model::{FieldKind, FieldSpec, JsonCodec, Record, RecordCodec, RuntimeInfo, Schema, TypeId};
//! use serde_json::json;
//!
//! let schema = Schema::shared(
//!     TypeId::new("myapp.models", "Person").unwrap(),
//!     vec![
//!         FieldSpec::new("age", FieldKind::Integer).required(),
//!         FieldSpec::new("name", FieldKind::Text),
//!     ],
//! )
//! .unwrap();
//!
//! let values = json!({"age": 10, "name": "Foo"}).as_object().cloned().unwrap();
//! let person = Record::create(&schema, values).unwrap();
//!
//! let bytes = JsonCodec.serialize(&person, &RuntimeInfo::current()).unwrap();
//! let loaded = JsonCodec.deserialize(&schema, &bytes).unwrap();
//! assert_eq!(loaded, person);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod record;
mod registry;
mod runtime;
mod schema;
mod types;

pub use codec::{JsonCodec, RecordCodec};
pub use error::{ModelError, ModelResult};
pub use record::Record;
pub use registry::SchemaRegistry;
pub use runtime::RuntimeInfo;
pub use schema::{validate, FieldKind, FieldSpec, Schema, RESERVED_FIELDS};
pub use types::{RecordId, TypeId};
