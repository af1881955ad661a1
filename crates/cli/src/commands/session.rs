//! Customer sign-in state persisted between invocations.
//!
//! The customer token lives in the `satchel.session` slot of the data
//! directory, next to the anonymous collections.

use satchel_storefront::local::{FileStorage, LocalStorage, PersistenceError};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Slot holding the customer token.
pub const SESSION_SLOT: &str = "satchel.session";

/// Errors from the sign-in commands.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token slot could not be read or written.
    #[error("Session storage error: {0}")]
    Storage(#[from] PersistenceError),

    /// The supplied token is blank.
    #[error("Customer token must not be empty")]
    EmptyToken,
}

/// Read the persisted customer token, if signed in.
///
/// # Errors
///
/// Returns an error when the slot cannot be read.
pub fn load_token(storage: &FileStorage) -> Result<Option<SecretString>, SessionError> {
    Ok(storage
        .read(SESSION_SLOT)?
        .map(|raw| raw.trim().to_string())
        .filter(|token| !token.is_empty())
        .map(SecretString::from))
}

/// Persist `token` as the signed-in customer.
///
/// # Errors
///
/// Returns an error when the token is blank or cannot be written.
pub fn save_token(storage: &FileStorage, token: &SecretString) -> Result<(), SessionError> {
    let token = token.expose_secret().trim();
    if token.is_empty() {
        return Err(SessionError::EmptyToken);
    }
    storage.write(SESSION_SLOT, token)?;
    Ok(())
}

/// Forget the signed-in customer.
///
/// # Errors
///
/// Returns an error when the slot cannot be deleted.
pub fn clear_token(storage: &FileStorage) -> Result<(), SessionError> {
    storage.remove(SESSION_SLOT)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(load_token(&storage).unwrap().is_none());

        save_token(&storage, &SecretString::from(" tok-123\n")).unwrap();
        assert_eq!(
            load_token(&storage).unwrap().unwrap().expose_secret(),
            "tok-123"
        );

        clear_token(&storage).unwrap();
        assert!(load_token(&storage).unwrap().is_none());
    }

    #[test]
    fn test_blank_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            save_token(&storage, &SecretString::from("  ")),
            Err(SessionError::EmptyToken)
        ));
    }
}
