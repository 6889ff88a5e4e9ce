//! Runtime version metadata stamped into serialized records.

use serde::{Deserialize, Serialize};

/// Describes the software that wrote a record.
///
/// Passed explicitly to serializers instead of being read from globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Implementation language.
    pub language: String,
    /// Language (toolchain) version.
    pub language_version: String,
    /// Package name.
    pub package: String,
    /// Package version.
    pub package_version: String,
}

impl RuntimeInfo {
    /// Creates runtime info for an arbitrary package.
    pub fn new(package: impl Into<String>, package_version: impl Into<String>) -> Self {
        Self {
            language: "rust".into(),
            language_version: option_env!("CARGO_PKG_RUST_VERSION")
                .unwrap_or("unknown")
                .into(),
            package: package.into(),
            package_version: package_version.into(),
        }
    }

    /// Runtime info describing this library.
    pub fn current() -> Self {
        Self::new("gitdex", env!("CARGO_PKG_VERSION"))
    }
}

impl Default for RuntimeInfo {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_describes_gitdex() {
        let info = RuntimeInfo::current();
        assert_eq!(info.language, "rust");
        assert_eq!(info.package, "gitdex");
        assert_eq!(info.package_version, env!("CARGO_PKG_VERSION"));
    }
}
