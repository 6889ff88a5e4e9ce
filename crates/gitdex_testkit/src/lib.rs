//! # gitdex Testkit
//!
//! Test utilities for gitdex:
//! - fixtures: a `Person` record type, throwaway workspaces and source
//!   repositories to pull from
//! - proptest generators for record ids and field values
//!
//! ```rust,no_run
//! use gitdex_testkit::prelude::*;
//!
//! let ws = TestWorkspace::new();
//! ws.save_person("p1", 1, "Name");
//! let result = ws.sync(person_schema().type_id()).unwrap();
//! assert_eq!(result.reindexed.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
