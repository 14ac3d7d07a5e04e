//! Token endpoint traffic through the desktop HTTP client.

use bridge_desktop::ReqwestHttpClient;
use core_auth::{
    AuthError, Credential, HttpTokenRefresher, OAuthConfig, OAuthFlowManager, PkceVerifier,
    TokenRefresher,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serves `503 Service Unavailable` to every request and counts them.
async fn unavailable_endpoint() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                serve_unavailable(stream, counter).await;
            });
        }
    });

    (format!("http://{}/token", address), hits)
}

async fn serve_unavailable(mut stream: TcpStream, hits: Arc<AtomicUsize>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let Ok(read) = stream.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }

    hits.fetch_add(1, Ordering::SeqCst);

    let body = r#"{"error":"backend_unavailable"}"#;
    let response = format!(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

#[tokio::test]
async fn test_refresh_against_unavailable_endpoint_makes_three_requests() {
    let (token_url, hits) = unavailable_endpoint().await;
    let http = Arc::new(ReqwestHttpClient::new().unwrap());

    let credential = Credential::new("expired", token_url, "client-id").with_refresh_token("refresh");
    let refresher = HttpTokenRefresher::new(http);

    let result = refresher.refresh(&credential).await;

    assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_code_exchange_is_sent_once() {
    let (token_url, hits) = unavailable_endpoint().await;
    let http = Arc::new(ReqwestHttpClient::new().unwrap());

    let config = OAuthConfig {
        client_id: "client-id".to_string(),
        client_secret: None,
        auth_url: "https://accounts.example.com/auth".to_string(),
        token_url,
        redirect_uri: "http://127.0.0.1:8080/".to_string(),
        scopes: vec!["drive".to_string()],
    };
    let flow = OAuthFlowManager::new(config, http);
    let verifier = PkceVerifier::new();

    let result = flow
        .exchange_code("single-use-code", verifier.state(), &verifier)
        .await;

    assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
