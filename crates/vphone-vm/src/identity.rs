//! Persistent machine identity.
//!
//! The guest's ECID comes from a machine identity that must survive
//! restarts. It is written once to a sidecar file next to NVRAM and loaded
//! on every later boot; a missing or unreadable file yields a fresh one.

use crate::error::{IdentityError, Result, VmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the identity sidecar file.
pub const MACHINE_IDENTIFIER_FILE: &str = "machineIdentifier.bin";

/// Opaque token identifying one guest hardware instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineIdentity {
    #[serde(rename = "ECID")]
    ecid: u64,
}

impl MachineIdentity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let mut ecid = [0u8; 8];
        ecid.copy_from_slice(&bytes[..8]);
        Self {
            ecid: u64::from_be_bytes(ecid),
        }
    }

    /// ECID the guest will observe.
    pub fn ecid(&self) -> u64 {
        self.ecid
    }

    /// Serialized form stored in the sidecar file.
    pub fn data_representation(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Restore an identity from its serialized form.
    pub fn from_data_representation(data: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ECID {:#018x}", self.ecid)
    }
}

/// Where a resolved identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Loaded,
    Created,
}

/// Reads and writes the identity sidecar file.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted identity.
    pub fn load(&self) -> std::result::Result<MachineIdentity, IdentityError> {
        let data = std::fs::read(&self.path)?;
        Ok(MachineIdentity::from_data_representation(&data)?)
    }

    /// Generate a new identity and write it, replacing any existing file.
    pub fn create_and_persist(&self) -> Result<MachineIdentity> {
        let identity = MachineIdentity::generate();
        let persist_err = |source| VmError::IdentityPersist {
            path: self.path.clone(),
            source,
        };

        let data = identity
            .data_representation()
            .map_err(|e| persist_err(std::io::Error::other(e)))?;
        std::fs::write(&self.path, data).map_err(persist_err)?;

        Ok(identity)
    }

    /// Load the identity, or create one if the file is absent or corrupt.
    pub fn resolve(&self) -> Result<(MachineIdentity, IdentitySource)> {
        match self.load() {
            Ok(identity) => {
                tracing::info!(%identity, "Loaded machine identifier (ECID stable)");
                Ok((identity, IdentitySource::Loaded))
            }
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "No usable machine identifier");
                let identity = self.create_and_persist()?;
                tracing::info!(
                    %identity,
                    path = %self.path.display(),
                    "Created new machine identifier"
                );
                Ok((identity, IdentitySource::Created))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vphone-identity-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(MACHINE_IDENTIFIER_FILE)
    }

    #[test]
    fn test_data_representation_round_trip() {
        let identity = MachineIdentity::generate();
        let data = identity.data_representation().unwrap();
        assert_eq!(
            MachineIdentity::from_data_representation(&data).unwrap(),
            identity
        );
    }

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(MachineIdentity::generate(), MachineIdentity::generate());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let store = IdentityStore::new(scratch_file());
        assert!(matches!(store.load(), Err(IdentityError::NotFound(_))));
    }

    #[test]
    fn test_load_corrupt_is_parse_error() {
        let path = scratch_file();
        std::fs::write(&path, b"\x00\x01garbage").unwrap();
        let store = IdentityStore::new(path);
        assert!(matches!(store.load(), Err(IdentityError::Parse(_))));
    }

    #[test]
    fn test_load_after_create_returns_same_identity() {
        let store = IdentityStore::new(scratch_file());
        let created = store.create_and_persist().unwrap();
        assert_eq!(store.load().unwrap(), created);
    }

    #[test]
    fn test_resolve_creates_then_loads() {
        let store = IdentityStore::new(scratch_file());

        let (first, source) = store.resolve().unwrap();
        assert_eq!(source, IdentitySource::Created);

        let (second, source) = store.resolve().unwrap();
        assert_eq!(source, IdentitySource::Loaded);
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_replaces_corrupt_file() {
        let path = scratch_file();
        std::fs::write(&path, b"{not json").unwrap();
        let store = IdentityStore::new(&path);

        let (identity, source) = store.resolve().unwrap();
        assert_eq!(source, IdentitySource::Created);
        assert_eq!(store.load().unwrap(), identity);
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join(format!("vphone-missing-{}", Uuid::new_v4()))
            .join(MACHINE_IDENTIFIER_FILE);
        let store = IdentityStore::new(path);
        assert!(matches!(
            store.resolve(),
            Err(VmError::IdentityPersist { .. })
        ));
    }
}
