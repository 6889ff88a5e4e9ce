//! Commit message encoding.

use crate::error::{StorageError, StorageResult};
use deunicode::deunicode;

/// Converts a commit message to plain ASCII.
///
/// Non-ASCII text is transliterated to its closest ASCII form rather than
/// dropped, so `"Añadir página"` is committed as `"Anadir pagina"`.
///
/// # Errors
///
/// Returns [`StorageError::Encoding`] if the message contains NUL bytes,
/// which git cannot store.
pub fn commit_message(message: &str) -> StorageResult<String> {
    if message.contains('\0') {
        return Err(StorageError::encoding("message contains a NUL byte"));
    }
    if message.is_ascii() {
        return Ok(message.to_string());
    }
    Ok(deunicode(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(commit_message("Save Person p1").unwrap(), "Save Person p1");
    }

    #[test]
    fn unicode_is_transliterated() {
        assert_eq!(commit_message("Añadir página").unwrap(), "Anadir pagina");
        assert_eq!(commit_message("Saving ünïcødé").unwrap(), "Saving unicode");
        assert!(commit_message("Ünïcödé 北京").unwrap().is_ascii());
    }

    #[test]
    fn nul_is_rejected() {
        assert!(matches!(
            commit_message("bad\0message"),
            Err(StorageError::Encoding { .. })
        ));
    }
}
