//! OAuth 2.0 Authorization Code Flow with PKCE
//!
//! Implements RFC 6749 and RFC 7636 for the installed-application flow used to
//! obtain a [`Credential`] for the remote storage API.
//!
//! # Overview
//!
//! - [`ClientSecrets`] loads the client-secret artifact downloaded from the
//!   provider console (`credentials.json`).
//! - [`OAuthFlowManager`] builds authorization URLs and exchanges codes.
//! - [`HttpTokenRefresher`] renews expired credentials.
//!
//! # Security
//!
//! Tokens, authorization codes and PKCE verifiers are never logged.

use crate::error::{AuthError, Result};
use crate::types::Credential;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Client registration loaded from the provider's client-secret JSON.
///
/// Accepts both the `installed` (desktop) and `web` layouts.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecretsEntry>,
    web: Option<ClientSecretsEntry>,
}

#[derive(Deserialize)]
struct ClientSecretsEntry {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecrets {
    /// Load the client-secret artifact from disk.
    ///
    /// # Errors
    ///
    /// [`AuthError::Configuration`] when the file is missing or malformed.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::Configuration(format!(
                    "{} file not found. Add your Google API credentials",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(AuthError::Configuration(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(contents).map_err(|e| {
            AuthError::Configuration(format!("Malformed client secrets file: {}", e))
        })?;

        let entry = file.installed.or(file.web).ok_or_else(|| {
            AuthError::Configuration(
                "Client secrets file has neither an 'installed' nor a 'web' section".to_string(),
            )
        })?;

        if entry.client_id.trim().is_empty() {
            return Err(AuthError::Configuration(
                "Client secrets file has an empty client_id".to_string(),
            ));
        }

        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret.filter(|secret| !secret.is_empty()),
            auth_uri: entry.auth_uri.unwrap_or_else(|| DEFAULT_AUTH_URI.to_string()),
            token_uri: entry
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Everything needed to run one authorization flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    pub fn from_secrets(
        secrets: &ClientSecrets,
        redirect_uri: impl Into<String>,
        scopes: &[String],
    ) -> Self {
        Self {
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            redirect_uri: redirect_uri.into(),
            scopes: scopes.to_vec(),
            auth_url: secrets.auth_uri.clone(),
            token_url: secrets.token_uri.clone(),
        }
    }
}

/// PKCE (Proof Key for Code Exchange) verifier and CSRF state.
///
/// Only the challenge derived from the verifier is sent to the authorization
/// server; the verifier itself goes out with the code exchange.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Generate a 32-byte verifier and a 16-byte state, both base64url without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// OAuth 2.0 authorization code flow.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the URL the user visits to grant access.
    ///
    /// Returns the URL together with the [`PkceVerifier`] that must be kept
    /// for [`exchange_code`](Self::exchange_code).
    #[instrument(skip(self))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            // Request a refresh token
            query.append_pair("access_type", "offline");
        }

        tracing::debug!("Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange the authorization code from the callback for a [`Credential`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::StateMismatch`] if `state` is not the one issued
    /// - [`AuthError::AuthenticationFailed`] if the token endpoint rejects the code
    /// - [`AuthError::Network`] on transport failures
    #[instrument(skip(self, code, state, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<Credential> {
        if state != verifier.state() {
            warn!("OAuth state mismatch in authorization callback");
            return Err(AuthError::StateMismatch);
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", self.config.redirect_uri.as_str());
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("code_verifier", verifier.verifier());

        if let Some(ref client_secret) = self.config.client_secret {
            params.insert("client_secret", client_secret.as_str());
        }

        tracing::debug!("Exchanging authorization code for tokens");

        let request = form_request(&self.config.token_url, &params)?;
        // Authorization codes are single use.
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let error_body = error_text(&response);

            warn!(
                status = status,
                error = %error_body,
                "Token endpoint rejected authorization code"
            );

            return Err(AuthError::AuthenticationFailed(format!(
                "Token endpoint returned {}: {}",
                status, error_body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        tracing::info!(
            "Exchanged authorization code for tokens (expires in {}s)",
            token_response.expires_in
        );

        let credential = Credential {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            token_uri: self.config.token_url.clone(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            scopes: token_response
                .scope
                .map(|scope| scope.split(' ').map(str::to_string).collect())
                .unwrap_or_else(|| self.config.scopes.clone()),
            expiry: Some(Utc::now() + chrono::Duration::seconds(token_response.expires_in)),
        };

        Ok(credential)
    }
}

/// Renews an expired [`Credential`] using its refresh token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns the renewed credential. The refresh token is carried over when
    /// the endpoint does not issue a new one.
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;
}

/// [`TokenRefresher`] that talks to the credential's own token endpoint.
pub struct HttpTokenRefresher {
    http_client: Arc<dyn HttpClient>,
    max_attempts: u32,
}

impl HttpTokenRefresher {
    const MAX_ATTEMPTS: u32 = 3;

    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            max_attempts: Self::MAX_ATTEMPTS,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[instrument(skip(self, credential))]
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::TokenRefreshFailed("Credential has no refresh token".to_string())
            })?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", credential.client_id.as_str());

        if let Some(ref client_secret) = credential.client_secret {
            params.insert("client_secret", client_secret.as_str());
        }

        tracing::debug!("Refreshing access token");

        let mut attempts = 0;

        loop {
            attempts += 1;

            let request = form_request(&credential.token_uri, &params)?;
            let response = self
                .http_client
                .execute_with_retry(request, RetryPolicy::no_retry())
                .await
                .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

            if response.is_success() {
                let token_response: TokenResponse = response.json().map_err(|e| {
                    AuthError::TokenRefreshFailed(format!("Failed to parse token response: {}", e))
                })?;

                tracing::info!(
                    "Refreshed access token (expires in {}s)",
                    token_response.expires_in
                );

                let mut renewed = credential.clone();
                renewed.access_token = token_response.access_token;
                if let Some(new_refresh_token) = token_response.refresh_token {
                    renewed.refresh_token = Some(new_refresh_token);
                }
                renewed.expiry =
                    Some(Utc::now() + chrono::Duration::seconds(token_response.expires_in));
                return Ok(renewed);
            }

            let status = response.status;

            if response.is_client_error() {
                let error_body = error_text(&response);

                warn!(
                    status = status,
                    error = %error_body,
                    "Token refresh rejected, not retrying"
                );

                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token endpoint returned {}: {}",
                    status, error_body
                )));
            }

            if attempts >= self.max_attempts {
                let error_body = error_text(&response);

                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {} - {}",
                    attempts, status, error_body
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                status = status,
                attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn form_request(url: &str, params: &HashMap<&str, &str>) -> Result<HttpRequest> {
    let encoded_body = serde_urlencoded::to_string(params)
        .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

    Ok(HttpRequest::new(HttpMethod::Post, url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Bytes::from(encoded_body)))
}

fn error_text(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

/// JSON body returned by the token endpoint.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn test_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: Some("secret".to_string()),
            redirect_uri: "http://127.0.0.1:8080/".to_string(),
            scopes: vec!["scope1".to_string(), "scope2".to_string()],
            auth_url: "https://provider.com/auth".to_string(),
            token_url: "https://provider.com/token".to_string(),
        }
    }

    fn expired_credential() -> Credential {
        Credential::new("old-access", "https://provider.com/token", "test-client")
            .with_refresh_token("refresh-1")
            .with_client_secret("secret")
            .with_expiry(Utc::now() - chrono::Duration::minutes(5))
    }

    #[test]
    fn test_client_secrets_installed_layout() {
        let json = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "id.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret.as_deref(), Some("shh"));
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");
        assert!(!format!("{:?}", secrets).contains("shh"));
    }

    #[test]
    fn test_client_secrets_web_layout_uses_default_endpoints() {
        let json = r#"{"web": {"client_id": "web-client"}}"#;

        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "web-client");
        assert_eq!(secrets.client_secret, None);
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_client_secrets_malformed() {
        assert!(matches!(
            ClientSecrets::from_json("{}"),
            Err(AuthError::Configuration(_))
        ));
        assert!(matches!(
            ClientSecrets::from_json("not json"),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_client_secrets_missing_file() {
        let result = ClientSecrets::from_file("/nonexistent/dir/credentials.json").await;

        match result {
            Err(AuthError::Configuration(message)) => assert!(message.contains("not found")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();

        assert!(!verifier.verifier().is_empty());
        assert!(!verifier.state().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());

        let verifier2 = PkceVerifier::new();
        assert_ne!(verifier.verifier(), verifier2.verifier());
        assert_ne!(verifier.state(), verifier2.state());
        assert_ne!(verifier.challenge(), verifier2.challenge());
    }

    #[test]
    fn test_pkce_challenge_known_vector() {
        // RFC 7636 appendix B
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "state".to_string(),
        };

        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(!format!("{:?}", verifier).contains("dBjft"));
    }

    #[test]
    fn test_build_auth_url() {
        let manager = OAuthFlowManager::new(test_config(), Arc::new(MockHttpClient::new()));
        let (url, verifier) = manager.build_auth_url().unwrap();

        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("redirect_uri=http"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=scope1+scope2") || url.contains("scope=scope1%20scope2"));
        assert!(url.contains(&format!("state={}", verifier.state())));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_build_auth_url_invalid_url() {
        let mut config = test_config();
        config.auth_url = "not a valid url".to_string();

        let manager = OAuthFlowManager::new(config, Arc::new(MockHttpClient::new()));
        assert!(matches!(
            manager.build_auth_url(),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_state_mismatch_makes_no_request() {
        let mut http = MockHttpClient::new();
        http.expect_execute().never();

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();

        let result = manager.exchange_code("code", "forged", &verifier).await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_exchange_code_builds_credential() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body = request
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).to_string())
                    .unwrap_or_default();
                request.method == HttpMethod::Post
                    && request.url == "https://provider.com/token"
                    && body.contains("grant_type=authorization_code")
                    && body.contains("code=the-code")
                    && body.contains("code_verifier=")
            })
            .times(1)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"access_token":"ya29.new","refresh_token":"1//r","expires_in":3599}"#,
                ))
            });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let state = verifier.state().to_string();

        let credential = manager
            .exchange_code("the-code", &state, &verifier)
            .await
            .unwrap();

        assert_eq!(credential.access_token, "ya29.new");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//r"));
        assert_eq!(credential.client_id, "test-client");
        assert_eq!(credential.token_uri, "https://provider.com/token");
        assert_eq!(credential.scopes, vec!["scope1", "scope2"]);
        assert!(credential.expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(json_response(400, r#"{"error":"invalid_grant"}"#)));

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let state = verifier.state().to_string();

        let result = manager.exchange_code("bad", &state, &verifier).await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_exchange_code_transport_failure() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("offline".to_string())));

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let state = verifier.state().to_string();

        let result = manager.exchange_code("code", &state, &verifier).await;
        assert!(matches!(result, Err(AuthError::Network(_))));
    }

    #[tokio::test]
    async fn test_refresh_preserves_refresh_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body = request
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).to_string())
                    .unwrap_or_default();
                body.contains("grant_type=refresh_token") && body.contains("refresh_token=refresh-1")
            })
            .times(1)
            .returning(|_| Ok(json_response(200, r#"{"access_token":"fresh"}"#)));

        let refresher = HttpTokenRefresher::new(Arc::new(http));
        let renewed = refresher.refresh(&expired_credential()).await.unwrap();

        assert_eq!(renewed.access_token, "fresh");
        assert_eq!(renewed.refresh_token.as_deref(), Some("refresh-1"));
        assert!(renewed.expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_refresh_client_error_is_not_retried() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(400, r#"{"error":"invalid_grant"}"#)));

        let refresher = HttpTokenRefresher::new(Arc::new(http));
        let result = refresher.refresh(&expired_credential()).await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
    }

    #[tokio::test]
    async fn test_refresh_server_error_retries_then_succeeds() {
        let mut http = MockHttpClient::new();
        let mut sequence = mockall::Sequence::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(json_response(503, "unavailable")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"access_token":"fresh","refresh_token":"refresh-2"}"#,
                ))
            });

        let refresher = HttpTokenRefresher::new(Arc::new(http));
        let renewed = refresher.refresh(&expired_credential()).await.unwrap();

        assert_eq!(renewed.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn test_refresh_gives_up_after_max_attempts() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(3)
            .returning(|_| Ok(json_response(500, "boom")));

        let refresher = HttpTokenRefresher::new(Arc::new(http));
        let result = refresher.refresh(&expired_credential()).await;

        match result {
            Err(AuthError::TokenRefreshFailed(message)) => assert!(message.contains("3 attempts")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute().never();

        let credential = Credential::new("a", "https://provider.com/token", "client");
        let refresher = HttpTokenRefresher::new(Arc::new(http));

        assert!(matches!(
            refresher.refresh(&credential).await,
            Err(AuthError::TokenRefreshFailed(_))
        ));
    }

    #[test]
    fn test_token_response_deserialization_minimal() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token": "token"}"#).unwrap();
        assert_eq!(response.access_token, "token");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.expires_in, 3600);
    }
}
