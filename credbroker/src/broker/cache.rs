use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::common::SessionCredential;

/// Prefix of every cached session credential file name
pub const CACHE_FILE_PREFIX: &str = ".aws_session_token_";

/// Everything but `[A-Za-z0-9._-]` is escaped, `%` included, so distinct
/// profile names never share a file
const FILE_NAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'_').remove(b'-');

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache file {}: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// File-backed store of session credentials, one file per source profile
#[derive(Debug, Clone)]
pub struct CredentialCache {
    dir: PathBuf,
}

impl CredentialCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic cache file location for a profile
    pub fn path_for(&self, profile: &str) -> PathBuf {
        let name = utf8_percent_encode(profile, FILE_NAME_ESCAPES);
        self.dir.join(format!("{}{}", CACHE_FILE_PREFIX, name))
    }

    /// Load the cached credential for `profile`, if one was stored. Expiry is
    /// not checked here.
    pub async fn load(&self, profile: &str) -> Result<Option<SessionCredential>, CacheError> {
        let path = self.path_for(profile);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let credential = serde_json::from_slice(&contents)
            .map_err(|source| CacheError::Serde { path, source })?;
        Ok(Some(credential))
    }

    pub async fn store(&self, profile: &str, credential: &SessionCredential) -> Result<(), CacheError> {
        let path = self.path_for(profile);
        let contents = serde_json::to_vec(credential).map_err(|source| CacheError::Serde {
            path: path.clone(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };
        let mut file = options.open(&path).await.map_err(io_err)?;
        file.write_all(&contents).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        debug!("Cached session credentials in {}", path.display());
        Ok(())
    }

    /// Delete the cached credential; returns false if there was none
    pub async fn remove(&self, profile: &str) -> Result<bool, CacheError> {
        let path = self.path_for(profile);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}
