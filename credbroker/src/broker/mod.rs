//! Session and role credential lifecycle.
//!
//! The broker owns the single active profile and its session credential.
//! All transitions run under one lock so concurrent requests observe and
//! mutate the state one at a time:
//!
//! ```text
//! NoSession --select--> SessionEstablished | SessionMfaPending
//! SessionMfaPending --mfa code--> SessionEstablished
//! SessionEstablished --credential fetch--> (role credential, state unchanged)
//! any --refresh--> NoSession
//! ```

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::common::{ConfigResolver, Principal, RoleConfig, RoleCredential, SessionCredential};

pub mod cache;
pub mod error;
pub mod mfa;
pub mod provider;
#[cfg(test)]
pub mod testing;

pub use cache::CredentialCache;
pub use error::{BrokerError, BrokerResult};
pub use mfa::MfaCode;
pub use provider::{IdentityProvider, StsIdentityProvider};

use provider::{
    role_session_name, AssumeRoleRequest, SessionTokenRequest, ASSUME_ROLE_DEFAULT_DURATION,
    ASSUME_ROLE_MIN_DURATION,
};

/// Session credentials this close to expiry are treated as expired
const EXPIRY_WINDOW_SECS: i64 = 10;

/// Externally visible state of the session credential
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NoSession,
    SessionMfaPending,
    SessionEstablished,
}

enum SessionState {
    NoSession,
    MfaPending,
    Established(SessionCredential),
}

struct ActiveProfile {
    name: String,
    role: RoleConfig,
}

struct BrokerState {
    profile: Option<ActiveProfile>,
    session: SessionState,
}

/// Drives the session credential state machine and derives role credentials
pub struct CredentialBroker {
    provider: Arc<dyn IdentityProvider>,
    resolver: Arc<dyn ConfigResolver>,
    cache: Option<CredentialCache>,
    principal: OnceCell<Principal>,
    state: Mutex<BrokerState>,
}

impl CredentialBroker {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn ConfigResolver>,
        cache: Option<CredentialCache>,
    ) -> Self {
        Self {
            provider,
            resolver,
            cache,
            principal: OnceCell::new(),
            state: Mutex::new(BrokerState {
                profile: None,
                session: SessionState::NoSession,
            }),
        }
    }

    /// Name of the active profile, if one has been selected
    pub async fn active_profile(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.profile.as_ref().map(|p| p.name.clone())
    }

    #[cfg(test)]
    pub async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        match state.session {
            SessionState::NoSession => SessionStatus::NoSession,
            SessionState::MfaPending => SessionStatus::SessionMfaPending,
            SessionState::Established(_) => SessionStatus::SessionEstablished,
        }
    }

    /// Make `name` the active profile and return the session expiration.
    ///
    /// A profile sharing the current source profile keeps the existing
    /// session credential; a different source profile forces a new one.
    #[instrument(skip(self))]
    pub async fn select_profile(&self, name: &str) -> BrokerResult<DateTime<Utc>> {
        let role = self
            .resolver
            .resolve(name)
            .await
            .map_err(|source| BrokerError::Resolve {
                profile: name.to_string(),
                source,
            })?;
        debug!("Resolved profile {:?}", role);

        let mut state = self.state.lock().await;
        let source_changed = state
            .profile
            .as_ref()
            .map_or(true, |active| active.role.source_profile != role.source_profile);
        if source_changed {
            debug!("Source profile changed to {}, resetting session", role.source_profile);
            state.session = SessionState::NoSession;
        }

        state.profile = Some(ActiveProfile {
            name: name.to_string(),
            role,
        });

        if let SessionState::Established(credential) = &state.session {
            if is_usable(credential) {
                debug!("Reusing session credentials for profile {}", name);
                return Ok(credential.expiration);
            }
        }

        let credential = self.establish_session(&mut state, None).await?;
        info!("Profile {} active, session expires at {}", name, credential.expiration);
        Ok(credential.expiration)
    }

    /// Complete a pending MFA challenge for the active profile
    #[instrument(skip(self, code))]
    pub async fn submit_mfa(&self, code: MfaCode) -> BrokerResult<DateTime<Utc>> {
        let mut state = self.state.lock().await;
        let credential = self.establish_session(&mut state, Some(code)).await?;
        Ok(credential.expiration)
    }

    /// Assume the active role using the session credential.
    ///
    /// The reported expiration is always `now + ASSUME_ROLE_MIN_DURATION + 1s`
    /// so SDKs never see a freshly issued credential as already stale.
    #[instrument(skip(self))]
    pub async fn role_credentials(&self) -> BrokerResult<RoleCredential> {
        let (role, session) = {
            let mut state = self.state.lock().await;
            let role = active_role(&state)?;
            let current = match &state.session {
                SessionState::Established(credential) if is_usable(credential) => {
                    Some(credential.clone())
                }
                _ => None,
            };
            let session = match current {
                Some(credential) => credential,
                None => self.establish_session(&mut state, None).await?,
            };
            (role, session)
        };

        let principal = self.principal(&role.source_profile).await?;
        let request = AssumeRoleRequest {
            source_profile: role.source_profile.clone(),
            role_arn: role.role_arn.clone(),
            external_id: role.external_id.clone(),
            session_name: role_session_name(&principal.user_name),
            duration: ASSUME_ROLE_DEFAULT_DURATION,
        };
        debug!("Assuming role {}", request.role_arn);

        let assumed = self
            .provider
            .assume_role(&session, &request)
            .await
            .map_err(BrokerError::from_provider)?;

        let now = Utc::now();
        Ok(RoleCredential {
            access_key_id: assumed.access_key_id,
            secret_access_key: assumed.secret_access_key,
            session_token: assumed.session_token,
            last_updated: now,
            expiration: clamped_expiration(now),
        })
    }

    /// Drop the session credential and its cache file. Always succeeds.
    pub async fn refresh(&self) {
        let mut state = self.state.lock().await;
        debug!("Expiring credentials for refresh");
        state.session = SessionState::NoSession;

        if let (Some(active), Some(cache)) = (&state.profile, &self.cache) {
            match cache.remove(&active.role.source_profile).await {
                Ok(true) => debug!("Removed cached credentials for {}", active.role.source_profile),
                Ok(false) => {}
                Err(e) => debug!("Error removing cached credentials: {}", e),
            }
        }
    }

    /// Obtain a session credential for the active profile, from the cache
    /// when possible. Without an MFA code, a profile that needs one moves to
    /// `SessionMfaPending` without calling the provider.
    async fn establish_session(
        &self,
        state: &mut BrokerState,
        code: Option<MfaCode>,
    ) -> BrokerResult<SessionCredential> {
        let role = active_role(state)?;

        if code.is_none() {
            if let Some(credential) = self.load_cached(&role.source_profile).await {
                debug!("Using cached session credentials for {}", role.source_profile);
                state.session = SessionState::Established(credential.clone());
                return Ok(credential);
            }

            if role.mfa_serial.is_some() {
                debug!("MFA required for {}", role.source_profile);
                state.session = SessionState::MfaPending;
                return Err(BrokerError::MfaRequired);
            }
        }

        let request = SessionTokenRequest {
            source_profile: role.source_profile.clone(),
            duration: role.session_duration,
            mfa_serial: role.mfa_serial.clone(),
            token_code: code,
        };

        let credential = match self.provider.session_token(&request).await {
            Ok(credential) => credential,
            Err(e) => {
                let err = BrokerError::from_provider(e);
                state.session = match err {
                    BrokerError::MfaRequired => SessionState::MfaPending,
                    _ => SessionState::NoSession,
                };
                return Err(err);
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&role.source_profile, &credential).await {
                warn!("Failed to cache session credentials: {}", e);
            }
        }
        state.session = SessionState::Established(credential.clone());

        if let Err(e) = self.principal(&role.source_profile).await {
            debug!("Unable to resolve caller identity: {}", e);
        }

        Ok(credential)
    }

    async fn load_cached(&self, source_profile: &str) -> Option<SessionCredential> {
        let cache = self.cache.as_ref()?;
        match cache.load(source_profile).await {
            Ok(Some(credential)) if is_usable(&credential) => Some(credential),
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring unreadable cached credentials: {}", e);
                None
            }
        }
    }

    /// The caller's identity, looked up once per process
    async fn principal(&self, source_profile: &str) -> BrokerResult<Principal> {
        self.principal
            .get_or_try_init(|| async {
                self.provider
                    .caller_identity(source_profile)
                    .await
                    .map_err(BrokerError::from_provider)
            })
            .await
            .cloned()
    }
}

fn active_role(state: &BrokerState) -> BrokerResult<RoleConfig> {
    state
        .profile
        .as_ref()
        .map(|active| active.role.clone())
        .ok_or(BrokerError::NoActiveProfile)
}

fn is_usable(credential: &SessionCredential) -> bool {
    !credential.expires_within(Duration::seconds(EXPIRY_WINDOW_SECS))
}

fn clamped_expiration(now: DateTime<Utc>) -> DateTime<Utc> {
    let min = Duration::seconds(ASSUME_ROLE_MIN_DURATION.as_secs() as i64);
    now + min + Duration::seconds(1)
}
