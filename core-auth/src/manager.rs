//! # Session Manager
//!
//! Owns the live credential for the signed-in account.
//!
//! ## Overview
//!
//! `SessionManager` restores persisted sessions at startup, runs the
//! interactive sign-in when needed, keeps the access token fresh and closes
//! the session on logout. Every transition is persisted through a
//! [`CredentialStore`] and announced on the [`EventBus`].
//!
//! ## Usage
//!
//! ```no_run
//! # use core_auth::SessionManager;
//! # async fn example(manager: SessionManager) -> core_auth::Result<()> {
//! if !manager.restore_session().await? {
//!     let outcome = manager.authenticate().await?;
//!     println!("{}", outcome.message);
//! }
//!
//! // Before each remote call
//! let credential = manager.ensure_valid().await?;
//! # let _ = credential;
//! # Ok(())
//! # }
//! ```

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::loopback::Authenticator;
use crate::oauth::{ClientSecrets, TokenRefresher};
use crate::types::{AuthOutcome, Credential, SessionState, UNKNOWN_ACCOUNT};
use bridge_traits::storage::AccountInfoProvider;
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Credentials this close to expiry are treated as expired.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Settings for [`SessionManager`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Location of the OAuth client-secret JSON
    pub client_secrets_path: PathBuf,
    pub scopes: Vec<String>,
    pub expiry_buffer: Duration,
    /// Upper bound for the interactive sign-in
    pub auth_timeout: Duration,
}

impl AuthConfig {
    pub fn new(client_secrets_path: impl Into<PathBuf>) -> Self {
        Self {
            client_secrets_path: client_secrets_path.into(),
            scopes: vec![core_runtime::config::DRIVE_SCOPE.to_string()],
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            auth_timeout: core_runtime::config::DEFAULT_AUTH_TIMEOUT,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    fn buffer(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.expiry_buffer).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

impl From<&CoreConfig> for AuthConfig {
    fn from(config: &CoreConfig) -> Self {
        AuthConfig::new(config.client_secrets_path.clone())
            .with_scopes(config.scopes.clone())
            .with_auth_timeout(config.auth_timeout)
    }
}

#[derive(Debug, Clone)]
struct LiveSession {
    account: String,
    credential: Credential,
}

/// Authentication session lifecycle.
///
/// Multiple managers may coexist; each owns its own live session.
pub struct SessionManager {
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    refresher: Arc<dyn TokenRefresher>,
    accounts: Arc<dyn AccountInfoProvider>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    live: RwLock<Option<LiveSession>>,
    state: RwLock<SessionState>,
    /// Serializes refreshes so concurrent callers refresh once
    refresh_lock: Mutex<()>,
    auth_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        authenticator: Arc<dyn Authenticator>,
        refresher: Arc<dyn TokenRefresher>,
        accounts: Arc<dyn AccountInfoProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            authenticator,
            refresher,
            accounts,
            clock: Arc::new(SystemClock),
            event_bus,
            live: RwLock::new(None),
            state: RwLock::new(SessionState::NoSession),
            refresh_lock: Mutex::new(()),
            auth_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Restore the persisted active session.
    ///
    /// Returns `Ok(true)` when a usable session was installed, refreshing it
    /// first if it had expired. Missing, unrefreshable or corrupted sessions
    /// yield `Ok(false)`. A refreshed credential that cannot be written back
    /// is still installed and the write failure is emitted as an auth error.
    ///
    /// # Errors
    ///
    /// Only when the credential store itself fails.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Result<bool> {
        let record = match self.store.active_session().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No persisted session");
                return Ok(false);
            }
            Err(AuthError::CredentialCorrupted(message)) => {
                warn!(error = %message, "Ignoring corrupted persisted session");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let account = record.account;
        let mut credential = record.credential;

        if !credential.is_valid_at(self.clock.now(), self.config.buffer()) {
            if !credential.can_refresh() {
                info!("Persisted session expired and cannot be refreshed");
                return Ok(false);
            }

            self.emit(AuthEvent::TokenRefreshing {
                account: account.clone(),
            });

            credential = match self.refresher.refresh(&credential).await {
                Ok(renewed) => renewed,
                Err(e) => {
                    warn!(error = %e, "Failed to refresh persisted session");
                    self.emit(AuthEvent::SessionExpired {
                        account: account.clone(),
                    });
                    return Ok(false);
                }
            };

            self.persist_refreshed(&account, &credential).await;
            self.emit(AuthEvent::TokenRefreshed {
                account: account.clone(),
                expires_at: credential.expiry.map(|expiry| expiry.timestamp()),
            });
        }

        info!(
            account = %redact_if_sensitive("account", &account),
            "Restored session"
        );
        self.install(account.clone(), credential);
        self.emit(AuthEvent::SessionRestored { account });
        Ok(true)
    }

    /// Sign in, reusing or refreshing the stored credential when possible and
    /// otherwise running the interactive flow.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] if the client-secret file is missing
    /// - [`AuthError::Timeout`] if the interactive flow exceeds the timeout
    /// - any error from the flow itself or from persisting the session
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<AuthOutcome> {
        let _guard = self.auth_lock.lock().await;

        let secrets = match ClientSecrets::from_file(&self.config.client_secrets_path).await {
            Ok(secrets) => secrets,
            Err(e) => {
                error!(error = %e, "Cannot start authentication");
                self.emit_error(None, &e);
                return Err(e);
            }
        };

        let previous_state = self.state();
        self.set_state(SessionState::Authenticating);
        self.emit(AuthEvent::SigningIn);

        match self.sign_in(&secrets).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Authentication failed");
                let fallback = match previous_state {
                    SessionState::Active if self.is_authenticated() => SessionState::Active,
                    _ => SessionState::NoSession,
                };
                self.set_state(fallback);
                self.emit_error(None, &e);
                Err(e)
            }
        }
    }

    async fn sign_in(&self, secrets: &ClientSecrets) -> Result<AuthOutcome> {
        let credential = self.acquire_credential(secrets).await?;

        let account = match self.accounts.current_account(&credential.access_token).await {
            Ok(account) if !account.trim().is_empty() => account,
            Ok(_) => UNKNOWN_ACCOUNT.to_string(),
            Err(e) => {
                warn!(error = %e, "Could not resolve account identity");
                UNKNOWN_ACCOUNT.to_string()
            }
        };

        self.store.save_session(&account, &credential).await?;
        self.install(account.clone(), credential);

        info!(
            account = %redact_if_sensitive("account", &account),
            "Authenticated"
        );
        self.emit(AuthEvent::SignedIn {
            account: account.clone(),
        });

        Ok(AuthOutcome::new(account))
    }

    async fn acquire_credential(&self, secrets: &ClientSecrets) -> Result<Credential> {
        let stored = match self.store.active_session().await {
            Ok(record) => record.map(|record| record.credential),
            Err(AuthError::CredentialCorrupted(message)) => {
                warn!(error = %message, "Ignoring corrupted persisted session");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(credential) = stored {
            if credential.is_valid_at(self.clock.now(), self.config.buffer()) {
                debug!("Reusing stored credential");
                return Ok(credential);
            }

            if credential.can_refresh() {
                match self.refresher.refresh(&credential).await {
                    Ok(renewed) => return Ok(renewed),
                    Err(e) => warn!(error = %e, "Stored credential refresh failed"),
                }
            }
        }

        info!("Starting interactive authorization");
        let timeout = self.config.auth_timeout;
        match tokio::time::timeout(
            timeout,
            self.authenticator.authorize(secrets, &self.config.scopes),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout(timeout)),
        }
    }

    /// Close the current session.
    ///
    /// The in-memory session is cleared even when the store update fails, in
    /// which case `false` is returned. Without a session this is a no-op
    /// returning `true`.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> bool {
        let session = self
            .live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(SessionState::NoSession);

        let Some(session) = session else {
            debug!("Logout without active session");
            return true;
        };

        match self.store.deactivate(&session.account).await {
            Ok(()) => {
                info!(
                    account = %redact_if_sensitive("account", &session.account),
                    "Logged out"
                );
                self.emit(AuthEvent::SignedOut {
                    account: session.account,
                });
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to persist logout");
                self.emit_error(Some(session.account), &e);
                false
            }
        }
    }

    /// `true` while a live session with a known account is installed.
    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn current_user(&self) -> Option<String> {
        self.snapshot().map(|session| session.account)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a credential that is valid right now, refreshing it if needed.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] without a live session
    /// - [`AuthError::AuthExpired`] when the credential cannot be refreshed;
    ///   the live session is dropped
    pub async fn ensure_valid(&self) -> Result<Credential> {
        let session = self.snapshot().ok_or(AuthError::NotAuthenticated)?;
        if session
            .credential
            .is_valid_at(self.clock.now(), self.config.buffer())
        {
            return Ok(session.credential);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let session = self.snapshot().ok_or(AuthError::NotAuthenticated)?;
        if session
            .credential
            .is_valid_at(self.clock.now(), self.config.buffer())
        {
            return Ok(session.credential);
        }

        self.set_state(SessionState::Expired);
        let LiveSession {
            account,
            credential,
        } = session;

        if !credential.can_refresh() {
            self.expire(&account);
            return Err(AuthError::AuthExpired(
                "credential expired and has no refresh token".to_string(),
            ));
        }

        self.emit(AuthEvent::TokenRefreshing {
            account: account.clone(),
        });

        let renewed = match self.refresher.refresh(&credential).await {
            Ok(renewed) => renewed,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.expire(&account);
                return Err(AuthError::AuthExpired(e.to_string()));
            }
        };

        self.persist_refreshed(&account, &renewed).await;
        self.replace_credential(&account, renewed.clone());
        self.emit(AuthEvent::TokenRefreshed {
            account,
            expires_at: renewed.expiry.map(|expiry| expiry.timestamp()),
        });

        debug!("Access token refreshed");
        Ok(renewed)
    }

    fn snapshot(&self) -> Option<LiveSession> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, account: String, credential: Credential) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(LiveSession {
            account,
            credential,
        });
        self.set_state(SessionState::Active);
    }

    /// Swap the credential unless the session was closed meanwhile.
    fn replace_credential(&self, account: &str, credential: Credential) {
        let replaced = {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            match live.as_mut() {
                Some(session) if session.account == account => {
                    session.credential = credential;
                    true
                }
                _ => false,
            }
        };
        if replaced {
            self.set_state(SessionState::Active);
        }
    }

    fn expire(&self, account: &str) {
        {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            if live.as_ref().is_some_and(|s| s.account == account) {
                *live = None;
            }
        }
        self.set_state(SessionState::NoSession);
        self.emit(AuthEvent::SessionExpired {
            account: account.to_string(),
        });
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }

    /// A refreshed credential stays usable in memory when the write fails;
    /// the failure is reported as an [`AuthEvent::AuthError`].
    async fn persist_refreshed(&self, account: &str, credential: &Credential) {
        if let Err(e) = self.store.save_session(account, credential).await {
            warn!(error = %e, "Failed to persist refreshed credential");
            self.emit_error(Some(account.to_string()), &e);
        }
    }

    fn emit_error(&self, account: Option<String>, error: &AuthError) {
        self.emit(AuthEvent::AuthError {
            account,
            message: error.to_string(),
        });
    }
}
