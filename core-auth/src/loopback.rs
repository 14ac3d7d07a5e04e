//! Interactive sign-in through a loopback redirect.
//!
//! The installed-application flow: a one-shot HTTP listener on
//! `127.0.0.1` receives the provider's redirect carrying the authorization
//! code, which is then exchanged for a [`Credential`].

use crate::error::{AuthError, Result};
use crate::oauth::{ClientSecrets, OAuthConfig, OAuthFlowManager};
use crate::types::Credential;
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Idle or slow connections are dropped after this long.
const CALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><body><h3>Authentication complete.</h3>\
<p>You may close this window and return to the application.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h3>Authentication failed.</h3>\
<p>Return to the application for details.</p></body></html>";

/// Obtains a brand-new credential from the user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authorize(&self, secrets: &ClientSecrets, scopes: &[String]) -> Result<Credential>;
}

/// Shows the authorization URL to the user, typically by opening a browser.
pub trait AuthorizationPrompt: Send + Sync {
    fn present(&self, auth_url: &str) -> Result<()>;
}

/// Prompt that only logs the URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuthorizationPrompt;

impl AuthorizationPrompt for LogAuthorizationPrompt {
    fn present(&self, auth_url: &str) -> Result<()> {
        info!(url = %auth_url, "Open this URL in a browser to authorize access");
        Ok(())
    }
}

enum Callback {
    Code { code: String, state: String },
    Denied(String),
    Ignored,
}

/// [`Authenticator`] that listens on `127.0.0.1:<port>` for the OAuth redirect.
///
/// Port `0` picks a free ephemeral port.
pub struct LoopbackAuthenticator {
    http_client: Arc<dyn HttpClient>,
    prompt: Arc<dyn AuthorizationPrompt>,
    port: u16,
}

impl LoopbackAuthenticator {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            prompt: Arc::new(LogAuthorizationPrompt),
            port: 0,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn read_callback(stream: &mut TcpStream) -> Result<Callback> {
        let mut buffer = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];

        loop {
            let read = stream
                .read(&mut chunk)
                .await
                .map_err(|e| AuthError::Network(format!("Failed to read callback: {}", e)))?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES
            {
                break;
            }
        }

        let request = String::from_utf8_lossy(&buffer);
        let request_line = request.lines().next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();

        let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
            return Ok(Callback::Ignored);
        };

        let url = Url::parse(&format!("http://127.0.0.1{}", target))
            .map_err(|e| AuthError::AuthenticationFailed(format!("Malformed callback: {}", e)))?;

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => return Ok(Callback::Denied(value.into_owned())),
                _ => {}
            }
        }

        match code {
            Some(code) => Ok(Callback::Code {
                code,
                state: state.unwrap_or_default(),
            }),
            None => Ok(Callback::Ignored),
        }
    }

    async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        if let Err(e) = stream.write_all(response.as_bytes()).await {
            debug!(error = %e, "Failed to answer loopback request");
        }
        let _ = stream.shutdown().await;
    }
}

/// Reads one request and hands it to the accept loop. Unreadable, idle and
/// malformed requests count as [`Callback::Ignored`].
async fn classify_connection(
    mut stream: TcpStream,
    callbacks: mpsc::Sender<(Callback, TcpStream)>,
) {
    let callback = match tokio::time::timeout(
        CALLBACK_READ_TIMEOUT,
        LoopbackAuthenticator::read_callback(&mut stream),
    )
    .await
    {
        Ok(Ok(callback)) => callback,
        Ok(Err(e)) => {
            debug!(error = %e, "Ignoring unreadable loopback request");
            Callback::Ignored
        }
        Err(_) => {
            debug!("Closing idle loopback connection");
            return;
        }
    };

    // The receiver is gone once the flow has finished.
    let _ = callbacks.send((callback, stream)).await;
}

#[async_trait]
impl Authenticator for LoopbackAuthenticator {
    #[instrument(skip(self, secrets, scopes), fields(port = self.port))]
    async fn authorize(&self, secrets: &ClientSecrets, scopes: &[String]) -> Result<Credential> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| AuthError::Network(format!("Failed to bind loopback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Network(e.to_string()))?
            .port();

        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let flow = OAuthFlowManager::new(
            OAuthConfig::from_secrets(secrets, redirect_uri, scopes),
            Arc::clone(&self.http_client),
        );

        let (auth_url, verifier) = flow.build_auth_url()?;
        self.prompt.present(&auth_url)?;
        debug!(port, "Waiting for authorization callback");

        // One task per connection: an idle one must not hold up the redirect.
        let (callbacks_tx, mut callbacks) = mpsc::channel::<(Callback, TcpStream)>(4);

        let (code, state) = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted.map_err(|e| {
                        AuthError::Network(format!("Loopback accept failed: {}", e))
                    })?;
                    tokio::spawn(classify_connection(stream, callbacks_tx.clone()));
                }
                Some((callback, mut stream)) = callbacks.recv() => match callback {
                    Callback::Code { code, state } => {
                        Self::respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                        break (code, state);
                    }
                    Callback::Denied(reason) => {
                        Self::respond(&mut stream, "200 OK", FAILURE_PAGE).await;
                        warn!(reason = %reason, "Authorization denied");
                        return Err(AuthError::AuthenticationFailed(format!(
                            "Authorization denied: {}",
                            reason
                        )));
                    }
                    Callback::Ignored => {
                        Self::respond(&mut stream, "404 Not Found", "").await;
                    }
                },
            }
        };

        flow.exchange_code(&code, &state, &verifier).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    /// Plays the browser: follows the redirect with the given query.
    struct BrowserPrompt {
        stray_request_first: bool,
        idle_connection_first: bool,
        deny: bool,
    }

    impl AuthorizationPrompt for BrowserPrompt {
        fn present(&self, auth_url: &str) -> Result<()> {
            let url = Url::parse(auth_url).map_err(|e| AuthError::Other(e.to_string()))?;
            let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
            let redirect = Url::parse(&query["redirect_uri"]).map_err(|e| AuthError::Other(e.to_string()))?;
            let address = format!(
                "{}:{}",
                redirect.host_str().unwrap_or("127.0.0.1"),
                redirect.port().unwrap_or(80)
            );
            let target = if self.deny {
                "/?error=access_denied".to_string()
            } else {
                format!("/?code=auth-code&state={}", query["state"])
            };
            let stray = self.stray_request_first;
            let idle = self.idle_connection_first;

            tokio::spawn(async move {
                // Held open without a request until the flow is over.
                let _idle_stream = if idle {
                    let stream = TcpStream::connect(&address).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Some(stream)
                } else {
                    None
                };
                if stray {
                    send_get(&address, "/favicon.ico").await;
                }
                send_get(&address, &target).await;
            });
            Ok(())
        }
    }

    async fn send_get(address: &str, target: &str) -> String {
        let mut stream = TcpStream::connect(address).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, address);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn secrets() -> ClientSecrets {
        ClientSecrets::from_json(
            r#"{"installed":{"client_id":"cid","client_secret":"cs","token_uri":"https://provider.com/token"}}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_loopback_flow_exchanges_code() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body = String::from_utf8_lossy(request.body.as_deref().unwrap_or_default())
                    .to_string();
                body.contains("code=auth-code") && body.contains("redirect_uri=http")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from_static(
                        br#"{"access_token":"ya29.loop","refresh_token":"1//loop","expires_in":3600}"#,
                    ),
                })
            });

        let authenticator = LoopbackAuthenticator::new(Arc::new(http)).with_prompt(Arc::new(
            BrowserPrompt {
                stray_request_first: true,
                idle_connection_first: false,
                deny: false,
            },
        ));

        let scopes = vec!["https://www.googleapis.com/auth/drive".to_string()];
        let credential = authenticator.authorize(&secrets(), &scopes).await.unwrap();

        assert_eq!(credential.access_token, "ya29.loop");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//loop"));
        assert_eq!(credential.client_id, "cid");
    }

    #[tokio::test]
    async fn test_loopback_flow_denied() {
        let mut http = MockHttpClient::new();
        http.expect_execute().never();

        let authenticator = LoopbackAuthenticator::new(Arc::new(http)).with_prompt(Arc::new(
            BrowserPrompt {
                stray_request_first: false,
                idle_connection_first: false,
                deny: true,
            },
        ));

        let result = authenticator.authorize(&secrets(), &[]).await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(br#"{"access_token":"ya29.idle","expires_in":3600}"#),
            })
        });

        let authenticator = LoopbackAuthenticator::new(Arc::new(http)).with_prompt(Arc::new(
            BrowserPrompt {
                stray_request_first: false,
                idle_connection_first: true,
                deny: false,
            },
        ));

        let credential = tokio::time::timeout(
            Duration::from_secs(3),
            authenticator.authorize(&secrets(), &[]),
        )
        .await
        .expect("sign-in stalled behind the idle connection")
        .unwrap();

        assert_eq!(credential.access_token, "ya29.idle");
    }
}
