//! # Authentication Session
//!
//! Acquires, persists, validates and refreshes the OAuth 2.0 credential used
//! to talk to the remote storage API.
//!
//! - [`SessionManager`] owns the live session and its state machine
//! - [`CredentialStore`] persists sessions across restarts
//! - [`oauth`] and [`loopback`] implement the installed-application flow

pub mod credential_store;
pub mod error;
pub mod loopback;
pub mod manager;
pub mod oauth;
pub mod types;

pub use credential_store::{CredentialStore, SqliteCredentialStore};
pub use error::{AuthError, Result};
pub use loopback::{
    Authenticator, AuthorizationPrompt, LogAuthorizationPrompt, LoopbackAuthenticator,
};
pub use manager::{AuthConfig, SessionManager, DEFAULT_EXPIRY_BUFFER};
pub use oauth::{
    ClientSecrets, HttpTokenRefresher, OAuthConfig, OAuthFlowManager, PkceVerifier,
    TokenRefresher,
};
pub use types::{AuthOutcome, Credential, SessionRecord, SessionState, UNKNOWN_ACCOUNT};
