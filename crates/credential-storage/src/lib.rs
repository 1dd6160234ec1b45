//! Credential persistence for the booking client.
//!
//! This crate provides:
//! - A [`StorageBackend`] key/value trait with memory and JSON-file backends
//! - [`CredentialStore`], the typed API over the session slots
//! - Intended-path slots used to resume navigation after sign-in

mod file;
mod keys;
mod memory;
mod store;
mod traits;

pub use file::FileStorage;
pub use keys::{IntendedPathSlot, StorageKeys};
pub use memory::MemoryStorage;
pub use store::{Credential, CredentialStore, UserProfile};
pub use traits::StorageBackend;

use booking_config_and_utils::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default persistent storage at `~/.booking/credentials.json`.
pub fn create_storage(paths: &Paths) -> StorageResult<Box<dyn StorageBackend>> {
    paths
        .ensure_dirs()
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(Box::new(FileStorage::new(paths.credentials_file())))
}

/// Create a CredentialStore over the default persistent storage.
pub fn create_credential_store(paths: &Paths) -> StorageResult<CredentialStore> {
    let storage = create_storage(paths)?;
    Ok(CredentialStore::new(storage))
}
