//! Hospital accounts: registration, password check and password change.
//!
//! Passwords are stored as base64-encoded bcrypt hashes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{Hospital, ResultStore};

/// Encode a password for storage.
pub fn hash_password(password: &str, cost: u32) -> Result<String, StoreError> {
    let hashed = bcrypt::hash(password, cost)?;
    Ok(STANDARD.encode(hashed.as_bytes()))
}

/// Check a password against a stored, base64-encoded hash.
pub fn verify_password(hospital: &Hospital, password: &str) -> Result<bool, StoreError> {
    let decoded = STANDARD
        .decode(hospital.password_hash.trim())
        .map_err(|_| StoreError::CorruptPasswordHash(hospital.name.clone()))?;
    let hash = String::from_utf8(decoded)
        .map_err(|_| StoreError::CorruptPasswordHash(hospital.name.clone()))?;

    Ok(bcrypt::verify(password, &hash)?)
}

/// Account operations against the result store
pub struct Authenticator<'a> {
    store: &'a ResultStore,
    cost: u32,
}

impl<'a> Authenticator<'a> {
    pub fn new(store: &'a ResultStore) -> Self {
        Self::with_cost(store, bcrypt::DEFAULT_COST)
    }

    /// Use a specific bcrypt work factor
    pub fn with_cost(store: &'a ResultStore, cost: u32) -> Self {
        Self { store, cost }
    }

    /// Register a non-admin hospital.
    pub fn register(&self, name: &str, password: &str) -> Result<Hospital, StoreError> {
        self.create(name, password, false)
    }

    /// Register an administrator.
    pub fn add_admin(&self, name: &str, password: &str) -> Result<Hospital, StoreError> {
        self.create(name, password, true)
    }

    fn create(&self, name: &str, password: &str, is_admin: bool) -> Result<Hospital, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyField("hospital name"));
        }
        if password.is_empty() {
            return Err(StoreError::EmptyField("password"));
        }

        let id = self
            .store
            .insert_hospital(name, &hash_password(password, self.cost)?, is_admin)?;
        info!(hospital_id = id, name = %name, is_admin = is_admin, "Hospital registered");

        self.store
            .hospital_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(format!("hospital #{}", id)))
    }

    /// Return the hospital when name and password match.
    pub fn login(&self, name: &str, password: &str) -> Result<Hospital, StoreError> {
        let hospital = self
            .store
            .hospital_by_name(name.trim())?
            .ok_or(StoreError::InvalidCredentials)?;

        if verify_password(&hospital, password)? {
            Ok(hospital)
        } else {
            warn!(name = %hospital.name, "Failed login attempt");
            Err(StoreError::InvalidCredentials)
        }
    }

    /// Replace a password after checking the old one.
    pub fn change_password(
        &self,
        hospital: &Hospital,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), StoreError> {
        if new_password != confirm_password {
            return Err(StoreError::PasswordMismatch);
        }
        if new_password.is_empty() {
            return Err(StoreError::EmptyField("new password"));
        }

        let current = self.login(&hospital.name, old_password)?;
        self.store
            .update_password(current.id, &hash_password(new_password, self.cost)?)?;

        info!(hospital_id = current.id, "Password updated");
        Ok(())
    }

    /// Create the bootstrap administrator if it does not exist yet.
    pub fn ensure_default_admin(&self, name: &str, password: &str) -> Result<(), StoreError> {
        if self.store.hospital_by_name(name)?.is_none() {
            self.add_admin(name, password)?;
            info!(name = %name, "Default administrator created");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_register_and_login() {
        let store = ResultStore::open_in_memory().unwrap();
        let auth = Authenticator::with_cost(&store, TEST_COST);

        let registered = auth.register("Korle Bu", "s3cret").unwrap();
        assert!(!registered.is_admin);

        let logged_in = auth.login("Korle Bu", "s3cret").unwrap();
        assert_eq!(logged_in.id, registered.id);

        assert!(matches!(
            auth.login("Korle Bu", "wrong"),
            Err(StoreError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("Nobody", "s3cret"),
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_register_rejects_empty_and_duplicate() {
        let store = ResultStore::open_in_memory().unwrap();
        let auth = Authenticator::with_cost(&store, TEST_COST);

        assert!(matches!(auth.register("  ", "pw"), Err(StoreError::EmptyField(_))));
        assert!(matches!(auth.register("A", ""), Err(StoreError::EmptyField(_))));

        auth.register("A", "pw").unwrap();
        assert!(matches!(
            auth.register("A", "pw2"),
            Err(StoreError::DuplicateHospital(_))
        ));
    }

    #[test]
    fn test_corrupt_hash_is_reported() {
        let store = ResultStore::open_in_memory().unwrap();
        store.insert_hospital("Broken", "not*base64!", false).unwrap();
        let auth = Authenticator::with_cost(&store, TEST_COST);

        assert!(matches!(
            auth.login("Broken", "pw"),
            Err(StoreError::CorruptPasswordHash(ref name)) if name == "Broken"
        ));
    }

    #[test]
    fn test_change_password() {
        let store = ResultStore::open_in_memory().unwrap();
        let auth = Authenticator::with_cost(&store, TEST_COST);
        let hospital = auth.register("A", "old").unwrap();

        assert!(matches!(
            auth.change_password(&hospital, "old", "new", "typo"),
            Err(StoreError::PasswordMismatch)
        ));
        assert!(matches!(
            auth.change_password(&hospital, "wrong", "new", "new"),
            Err(StoreError::InvalidCredentials)
        ));

        auth.change_password(&hospital, "old", "new", "new").unwrap();
        assert!(auth.login("A", "new").is_ok());
        assert!(auth.login("A", "old").is_err());
    }

    #[test]
    fn test_default_admin_created_once() {
        let store = ResultStore::open_in_memory().unwrap();
        let auth = Authenticator::with_cost(&store, TEST_COST);

        auth.ensure_default_admin("admin", "admin123").unwrap();
        auth.ensure_default_admin("admin", "different").unwrap();

        let admin = auth.login("admin", "admin123").unwrap();
        assert!(admin.is_admin);
        assert_eq!(store.list_hospitals().unwrap().len(), 1);
    }
}
