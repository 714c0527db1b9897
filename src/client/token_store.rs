use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::TokenPair;

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("token file io: {0}")]
    Io(#[from] io::Error),

    #[error("token file is not valid json: {0}")]
    Format(#[from] serde_json::Error),

    #[error("token store lock poisoned")]
    Poisoned,
}

/// Persisted credentials. Both keys are absent for an anonymous client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<&TokenPair> for StoredTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        }
    }
}

/// Durable key-value home for the access and refresh tokens.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<StoredTokens, TokenStoreError>;
    fn save(&self, tokens: &StoredTokens) -> Result<(), TokenStoreError>;
    fn clear(&self) -> Result<(), TokenStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        Self {
            inner: Mutex::new(StoredTokens {
                access_token: Some(access.to_string()),
                refresh_token: Some(refresh.to_string()),
            }),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<StoredTokens, TokenStoreError> {
        Ok(self.inner.lock().map_err(|_| TokenStoreError::Poisoned)?.clone())
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), TokenStoreError> {
        *self.inner.lock().map_err(|_| TokenStoreError::Poisoned)? = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        *self.inner.lock().map_err(|_| TokenStoreError::Poisoned)? = StoredTokens::default();
        Ok(())
    }
}

/// JSON file store; writes go through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fresh owner-only file at `path`, replacing any leftover.
fn private_file(path: &Path) -> io::Result<fs::File> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<StoredTokens, TokenStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(StoredTokens::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoredTokens::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), TokenStoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(tokens)?;
        let mut file = private_file(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
