use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::types::RoleConfig;

/// Profile used for long-lived credentials when a role profile names none
pub const DEFAULT_SOURCE_PROFILE: &str = "default";

/// Default lifetime requested for session tokens (12 hours)
pub const SESSION_TOKEN_DEFAULT_DURATION: Duration = Duration::from_secs(12 * 60 * 60);
/// Shortest session token lifetime the provider accepts
pub const SESSION_TOKEN_MIN_DURATION: Duration = Duration::from_secs(15 * 60);
/// Longest session token lifetime the provider accepts
pub const SESSION_TOKEN_MAX_DURATION: Duration = Duration::from_secs(36 * 60 * 60);

/// Errors raised while resolving a named profile
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Profile not found: {profile}")]
    ProfileNotFound { profile: String },

    #[error("Profile {profile} does not define a role_arn")]
    NotARole { profile: String },

    #[error("Failed to read profile file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse profile file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Resolves named profiles into role configuration
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Resolve a profile name into an immutable role configuration
    async fn resolve(&self, profile: &str) -> Result<RoleConfig, ConfigError>;

    /// List known profile names, optionally only those that assume a role
    async fn list_profiles(&self, roles_only: bool) -> Vec<String>;
}

/// On-disk named-profile file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,
}

/// A single named profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Profile holding the long-lived credentials
    pub source_profile: Option<String>,

    /// Role to assume; profiles without one only act as sources
    pub role_arn: Option<String>,

    /// MFA device serial number or ARN
    pub mfa_serial: Option<String>,

    /// External ID for the AssumeRole call
    pub external_id: Option<String>,

    /// Session token lifetime in seconds
    pub session_duration: Option<u64>,
}

impl ProfileFile {
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes to unit, not an empty mapping
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Resolve `profile` against this file
    pub fn resolve(&self, profile: &str) -> Result<RoleConfig, ConfigError> {
        let entry = self
            .profiles
            .get(profile)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                profile: profile.to_string(),
            })?;

        let role_arn = entry.role_arn.clone().ok_or_else(|| ConfigError::NotARole {
            profile: profile.to_string(),
        })?;

        let source_profile = entry
            .source_profile
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE_PROFILE.to_string());
        let source = self.profiles.get(&source_profile);

        // MFA and duration settings may live on the source profile
        let mfa_serial = entry
            .mfa_serial
            .clone()
            .or_else(|| source.and_then(|s| s.mfa_serial.clone()));
        let session_duration = entry
            .session_duration
            .or_else(|| source.and_then(|s| s.session_duration))
            .map(Duration::from_secs)
            .unwrap_or(SESSION_TOKEN_DEFAULT_DURATION)
            .clamp(SESSION_TOKEN_MIN_DURATION, SESSION_TOKEN_MAX_DURATION);

        Ok(RoleConfig {
            source_profile,
            role_arn,
            mfa_serial,
            external_id: entry.external_id.clone(),
            session_duration,
        })
    }

    pub fn profile_names(&self, roles_only: bool) -> Vec<String> {
        self.profiles
            .iter()
            .filter(|(_, entry)| !roles_only || entry.role_arn.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Resolver backed by a YAML profile file, re-read on every call
#[derive(Debug, Clone)]
pub struct FileConfigResolver {
    path: PathBuf,
}

impl FileConfigResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolver for the given path, or the default location when none is provided
    pub fn from_path_or_default(path: Option<PathBuf>) -> Self {
        Self::new(path.unwrap_or_else(default_profile_path))
    }

    async fn load(&self) -> Result<ProfileFile, ConfigError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        ProfileFile::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl ConfigResolver for FileConfigResolver {
    async fn resolve(&self, profile: &str) -> Result<RoleConfig, ConfigError> {
        self.load().await?.resolve(profile)
    }

    async fn list_profiles(&self, roles_only: bool) -> Vec<String> {
        match self.load().await {
            Ok(file) => file.profile_names(roles_only),
            Err(e) => {
                debug!("Unable to list profiles: {}", e);
                Vec::new()
            }
        }
    }
}

/// `<config dir>/credbroker/profiles.yaml`, relative to the working directory
/// when the platform has no config dir
pub fn default_profile_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credbroker")
        .join("profiles.yaml")
}

/// The per-user cache directory
pub fn user_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"
profiles:
  default:
    mfa_serial: arn:aws:iam::123456789012:mfa/alice
    session_duration: 3600
  ops:
    session_duration: 60
  admin:
    role_arn: arn:aws:iam::123456789012:role/Admin
    external_id: ext-1
  readonly:
    source_profile: ops
    role_arn: arn:aws:iam::123456789012:role/ReadOnly
    mfa_serial: arn:aws:iam::123456789012:mfa/bob
"#;

    #[test]
    fn test_resolve_inherits_from_source_profile() {
        let file = ProfileFile::from_yaml(PROFILES).unwrap();
        let role = file.resolve("admin").unwrap();

        assert_eq!(role.source_profile, "default");
        assert_eq!(role.role_arn, "arn:aws:iam::123456789012:role/Admin");
        assert_eq!(
            role.mfa_serial.as_deref(),
            Some("arn:aws:iam::123456789012:mfa/alice")
        );
        assert_eq!(role.external_id.as_deref(), Some("ext-1"));
        assert_eq!(role.session_duration, Duration::from_secs(3600));
    }

    #[test]
    fn test_resolve_clamps_session_duration() {
        let file = ProfileFile::from_yaml(PROFILES).unwrap();
        let role = file.resolve("readonly").unwrap();

        assert_eq!(role.source_profile, "ops");
        assert_eq!(
            role.mfa_serial.as_deref(),
            Some("arn:aws:iam::123456789012:mfa/bob")
        );
        assert_eq!(role.session_duration, SESSION_TOKEN_MIN_DURATION);
    }

    #[test]
    fn test_resolve_errors() {
        let file = ProfileFile::from_yaml(PROFILES).unwrap();
        assert!(matches!(
            file.resolve("missing"),
            Err(ConfigError::ProfileNotFound { .. })
        ));
        assert!(matches!(
            file.resolve("ops"),
            Err(ConfigError::NotARole { .. })
        ));
    }

    #[test]
    fn test_profile_names() {
        let file = ProfileFile::from_yaml(PROFILES).unwrap();
        assert_eq!(file.profile_names(true), vec!["admin", "readonly"]);
        assert_eq!(file.profile_names(false).len(), 4);
    }

    #[test]
    fn test_empty_file() {
        let file = ProfileFile::from_yaml("").unwrap();
        assert!(file.profile_names(false).is_empty());
    }

    #[tokio::test]
    async fn test_file_resolver_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yaml");
        std::fs::write(&path, "profiles: {}\n").unwrap();

        let resolver = FileConfigResolver::new(&path);
        assert!(resolver.resolve("admin").await.is_err());

        std::fs::write(&path, PROFILES).unwrap();
        assert!(resolver.resolve("admin").await.is_ok());
        assert_eq!(resolver.list_profiles(true).await, vec!["admin", "readonly"]);
    }

    #[tokio::test]
    async fn test_file_resolver_missing_file() {
        let resolver = FileConfigResolver::new("/nonexistent/credbroker/profiles.yaml");
        assert!(matches!(
            resolver.resolve("admin").await,
            Err(ConfigError::Io { .. })
        ));
        assert!(resolver.list_profiles(true).await.is_empty());
    }

    #[test]
    fn test_user_dirs_without_home() {
        let saved: Vec<_> = ["HOME", "XDG_CACHE_HOME", "XDG_CONFIG_HOME"]
            .iter()
            .map(|name| (*name, std::env::var_os(name)))
            .collect();
        for (name, _) in &saved {
            std::env::remove_var(name);
        }

        let cache_dir = user_cache_dir();
        let profile_path = default_profile_path();

        for (name, value) in saved {
            if let Some(value) = value {
                std::env::set_var(name, value);
            }
        }

        assert!(cache_dir.is_some());
        assert!(profile_path.ends_with("credbroker/profiles.yaml"));
    }
}
