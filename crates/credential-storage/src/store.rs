//! High-level API for the persisted session credential.

use crate::{IntendedPathSlot, StorageBackend, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cached profile of the signed-in user, as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// `ADMIN` or `CUSTOMER`
    pub role: String,
}

impl UserProfile {
    /// Name shown to the user: username when set, email otherwise.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email)
    }
}

/// Access/renewal token pair plus cached profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub profile: Option<UserProfile>,
}

/// Reads and writes the session credential over a storage backend.
pub struct CredentialStore {
    storage: Box<dyn StorageBackend>,
}

impl CredentialStore {
    /// Create a credential store with the given storage backend
    pub fn new(storage: Box<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Session credential
    // ==========================================

    /// Persist a full credential, replacing whatever was stored.
    pub fn save_credential(&self, credential: &Credential) -> StorageResult<()> {
        self.set_access_token(&credential.access_token)?;
        self.set_refresh_token(&credential.refresh_token)?;
        match &credential.profile {
            Some(profile) => self.set_profile(profile)?,
            None => {
                self.storage.delete(StorageKeys::USER_DATA)?;
            }
        }
        debug!("Credential saved");
        Ok(())
    }

    /// Load the stored credential.
    ///
    /// Returns `None` unless both tokens are present. An unreadable profile
    /// does not invalidate the tokens.
    pub fn credential(&self) -> StorageResult<Option<Credential>> {
        let access_token = self.access_token()?;
        let refresh_token = self.refresh_token()?;

        let (access_token, refresh_token) = match (access_token, refresh_token) {
            (Some(access), Some(refresh)) => (access, refresh),
            (None, None) => return Ok(None),
            (access, _) => {
                warn!(
                    has_access_token = access.is_some(),
                    "Incomplete credential in storage, ignoring"
                );
                return Ok(None);
            }
        };

        let profile = match self.profile() {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Stored profile is unreadable");
                None
            }
        };

        Ok(Some(Credential {
            access_token,
            refresh_token,
            profile,
        }))
    }

    pub fn has_credential(&self) -> StorageResult<bool> {
        Ok(self.credential()?.is_some())
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, token)
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::REFRESH_TOKEN, token)
    }

    /// Retrieve the cached user profile
    pub fn profile(&self) -> StorageResult<Option<UserProfile>> {
        match self.storage.get(StorageKeys::USER_DATA)? {
            Some(json) => {
                let profile = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// Store the user profile
    pub fn set_profile(&self, profile: &UserProfile) -> StorageResult<()> {
        let json =
            serde_json::to_string(profile).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::USER_DATA, &json)
    }

    /// Remove every session slot.
    ///
    /// All slots are attempted even if one fails; the first error is returned.
    pub fn clear_credential(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in StorageKeys::SESSION_KEYS {
            if let Err(e) = self.storage.delete(key) {
                warn!(key, error = %e, "Failed to clear credential slot");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Credential cleared");
                Ok(())
            }
        }
    }

    // ==========================================
    // Navigation resume
    // ==========================================

    /// Remember the path a denied navigation wanted.
    pub fn set_intended_path(&self, slot: IntendedPathSlot, path: &str) -> StorageResult<()> {
        self.storage.set(slot.key(), path)
    }

    /// Read the intended path without consuming it.
    pub fn intended_path(&self, slot: IntendedPathSlot) -> StorageResult<Option<String>> {
        self.storage.get(slot.key())
    }

    /// Read and remove the intended path.
    pub fn take_intended_path(&self, slot: IntendedPathSlot) -> StorageResult<Option<String>> {
        let path = self.storage.get(slot.key())?;
        if path.is_some() {
            self.storage.delete(slot.key())?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    fn profile(role: &str) -> UserProfile {
        UserProfile {
            id: 7,
            email: "ana@example.com".to_string(),
            username: Some("ana".to_string()),
            phone_number: Some("0900000000".to_string()),
            address: None,
            role: role.to_string(),
        }
    }

    fn credential() -> Credential {
        Credential {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            profile: Some(profile("CUSTOMER")),
        }
    }

    fn store() -> CredentialStore {
        CredentialStore::new(Box::new(MemoryStorage::new()))
    }

    #[test]
    fn test_save_and_load_credential() {
        let store = store();
        assert!(!store.has_credential().unwrap());

        store.save_credential(&credential()).unwrap();

        assert_eq!(store.credential().unwrap(), Some(credential()));
        assert_eq!(store.access_token().unwrap().as_deref(), Some("access-1"));
    }

    #[test]
    fn test_profile_is_stored_as_camel_case_json() {
        let backend = MemoryStorage::new();
        backend
            .set(
                StorageKeys::USER_DATA,
                r#"{"id":3,"email":"a@b.c","phoneNumber":"1","role":"ADMIN"}"#,
            )
            .unwrap();
        let store = CredentialStore::new(Box::new(backend));

        let profile = store.profile().unwrap().unwrap();
        assert_eq!(profile.phone_number.as_deref(), Some("1"));
        assert_eq!(profile.role, "ADMIN");
        assert_eq!(profile.display_name(), "a@b.c");
    }

    #[test]
    fn test_incomplete_credential_is_absent() {
        let store = store();
        store.set_access_token("access-only").unwrap();

        assert_eq!(store.credential().unwrap(), None);
    }

    #[test]
    fn test_corrupt_profile_keeps_tokens() {
        let store = store();
        store.save_credential(&credential()).unwrap();
        store.storage.set(StorageKeys::USER_DATA, "{broken").unwrap();

        let loaded = store.credential().unwrap().unwrap();
        assert_eq!(loaded.access_token, "access-1");
        assert_eq!(loaded.profile, None);
        assert!(matches!(store.profile(), Err(StorageError::Encoding(_))));
    }

    #[test]
    fn test_clear_credential_keeps_intended_paths() {
        let store = store();
        store.save_credential(&credential()).unwrap();
        store
            .set_intended_path(IntendedPathSlot::Admin, "/admin/movies")
            .unwrap();

        store.clear_credential().unwrap();

        assert!(!store.has_credential().unwrap());
        assert_eq!(store.profile().unwrap(), None);
        assert_eq!(
            store.intended_path(IntendedPathSlot::Admin).unwrap().as_deref(),
            Some("/admin/movies")
        );
    }

    #[test]
    fn test_take_intended_path_reads_once() {
        let store = store();
        store
            .set_intended_path(IntendedPathSlot::Booking, "/booking/42")
            .unwrap();

        assert_eq!(
            store.take_intended_path(IntendedPathSlot::Booking).unwrap().as_deref(),
            Some("/booking/42")
        );
        assert_eq!(store.take_intended_path(IntendedPathSlot::Booking).unwrap(), None);
        // Slots are independent
        assert_eq!(store.intended_path(IntendedPathSlot::Admin).unwrap(), None);
    }

    #[test]
    fn test_save_without_profile_removes_stale_profile() {
        let store = store();
        store.save_credential(&credential()).unwrap();

        let mut bare = credential();
        bare.profile = None;
        store.save_credential(&bare).unwrap();

        assert_eq!(store.profile().unwrap(), None);
    }
}
