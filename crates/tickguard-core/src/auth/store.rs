use std::fmt::{Debug, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// The live session credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl Debug for CredentialPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field(ACCESS_TOKEN_KEY, &"<redacted>")
            .field(REFRESH_TOKEN_KEY, &"<redacted>")
            .finish()
    }
}

/// Persistence for the credential pair so a restart resumes the session.
///
/// Clearing the store is the only logout mechanism.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError>;
    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            slot: Mutex::new(Some(pair)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        *self.slot.lock() = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// JSON file holding the two token keys.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        write_owner_only(&staging, &serde_json::to_vec_pretty(pair)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Writes `contents` to a file only the current user can read (mode 0600 on unix).
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        // a leftover staging file keeps its old mode
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_tokens() {
        let pair = CredentialPair::new("secret-access", "secret-refresh");
        let rendered = format!("{pair:?}");

        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn memory_store_round_trips_and_clears() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().expect("load").is_none());

        store
            .save(&CredentialPair::new("a", "r"))
            .expect("save");
        assert_eq!(
            store.load().expect("load"),
            Some(CredentialPair::new("a", "r"))
        );

        store.clear().expect("clear");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn file_store_persists_under_fixed_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().join("session").join("credentials.json"));

        assert!(store.load().expect("missing file is empty").is_none());

        store
            .save(&CredentialPair::new("access-1", "refresh-1"))
            .expect("save");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).expect("read")).expect("json");
        assert_eq!(raw[ACCESS_TOKEN_KEY], "access-1");
        assert_eq!(raw[REFRESH_TOKEN_KEY], "refresh-1");

        let reopened = FileCredentialStore::new(store.path());
        assert_eq!(
            reopened.load().expect("load"),
            Some(CredentialPair::new("access-1", "refresh-1"))
        );

        reopened.clear().expect("clear");
        reopened.clear().expect("clearing twice is fine");
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_keeps_tokens_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        fs::write(path.with_extension("tmp"), "stale").expect("write");
        fs::set_permissions(path.with_extension("tmp"), fs::Permissions::from_mode(0o644))
            .expect("chmod");
        let store = FileCredentialStore::new(&path);

        store.save(&CredentialPair::new("a1", "r1")).expect("save");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_store_reports_corrupt_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{not json").expect("write");

        let result = FileCredentialStore::new(&path).load();
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
