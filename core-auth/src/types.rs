//! Session and credential types.

use crate::error::{AuthError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity recorded when the "who am I" lookup fails after a successful sign-in.
pub const UNKNOWN_ACCOUNT: &str = "unknown@example.com";

/// OAuth 2.0 credential for the remote storage API.
///
/// Carries everything needed to refresh itself: the token endpoint and the
/// client id/secret it was issued to. The serialized form is the
/// `credential_blob` persisted by the [`CredentialStore`](crate::CredentialStore).
///
/// # Security
///
/// The `Debug` implementation redacts tokens and the client secret.
///
/// # Examples
///
/// ```
/// use core_auth::Credential;
/// use chrono::{Duration, Utc};
///
/// let credential = Credential::new("ya29.a0", "https://oauth2.googleapis.com/token", "client-id")
///     .with_refresh_token("1//0g")
///     .with_expiry(Utc::now() + Duration::hours(1));
///
/// assert!(credential.is_valid_at(Utc::now(), Duration::seconds(60)));
/// assert!(credential.can_refresh());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// When the access token stops being accepted; `None` means no known expiry
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        token_uri: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_uri: token_uri.into(),
            client_id: client_id.into(),
            client_secret: None,
            scopes: Vec::new(),
            expiry: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// `true` once `now` is within `buffer` of the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - buffer,
            None => false,
        }
    }

    /// Usable for API calls: a non-empty token that has not expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(now, buffer)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Serialize to the persisted blob format.
    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AuthError::Other(format!("Failed to serialize credential: {}", e)))
    }

    /// Parse a persisted blob.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialCorrupted`] when the blob is not a credential.
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| AuthError::CredentialCorrupted(e.to_string()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// A persisted session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub account: String,
    pub credential: Credential,
    pub active: bool,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of the in-memory session.
///
/// ```text
/// NoSession -> Authenticating -> Active <-> (refresh)
///                   |              |
///                   v              v
///               NoSession       Expired -> Active | NoSession
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    NoSession,
    Authenticating,
    Active,
    Expired,
}

/// Result of a successful [`authenticate`](crate::SessionManager::authenticate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub account: String,
    pub message: String,
}

impl AuthOutcome {
    pub fn new(account: impl Into<String>) -> Self {
        let account = account.into();
        let message = format!("Successfully authenticated as {}", account);
        Self { account, message }
    }
}
