//! Mock Skinport API server for testing
//!
//! Serves `GET /items` with a configurable listing, or a configured failure
//! (429 with or without `Retry-After`, 500), and records every request line
//! so tests can check query parameters and headers.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Serialize;

/// How the mock answers `/items`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// 200 with the configured listings
    Ok,
    /// 429, with the raw `Retry-After` value if given
    RateLimited { retry_after: Option<String> },
    /// 500 with a short error body
    ServerError,
}

/// Configuration for the mock server
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// `(market_hash_name, min_price)` served for `tradable=true`
    pub tradable: Vec<(String, Option<f64>)>,
    /// `(market_hash_name, min_price)` served for `tradable=false`
    pub non_tradable: Vec<(String, Option<f64>)>,
    pub behavior: MockBehavior,
    /// Delay in milliseconds before responding
    pub delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            tradable: vec![
                ("AK-47 | Redline (Field-Tested)".to_string(), Some(11.87)),
                ("AWP | Asiimov (Battle-Scarred)".to_string(), Some(68.5)),
                ("Sticker | Crown (Foil)".to_string(), None),
            ],
            non_tradable: vec![
                ("AK-47 | Redline (Field-Tested)".to_string(), Some(10.02)),
                ("Glock-18 | Fade (Factory New)".to_string(), Some(925.0)),
            ],
            behavior: MockBehavior::Ok,
            delay_ms: 0,
        }
    }
}

#[derive(Serialize)]
struct MockItem<'a> {
    market_hash_name: &'a str,
    currency: &'static str,
    min_price: Option<f64>,
    quantity: u64,
    item_page: String,
}

/// Mock Skinport server on a background thread
pub struct MockSkinportServer {
    port: u16,
    running: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<String>>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockSkinportServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(Mutex::new(Vec::new()));

        // Non-blocking so the accept loop notices `stop`
        listener.set_nonblocking(true)?;

        let thread_handle = thread::spawn({
            let running = Arc::clone(&running);
            let requests = Arc::clone(&requests);
            move || {
                while running.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            let config = config.clone();
                            let requests = Arc::clone(&requests);
                            thread::spawn(move || handle_connection(stream, &config, &requests));
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            }
        });

        Ok(Self {
            port,
            running,
            requests,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Raw requests received so far (request line and headers)
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockSkinportServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig, requests: &Mutex<Vec<String>>) {
    // Accepted sockets inherit non-blocking mode on some platforms
    let _ = stream.set_nonblocking(false);
    let mut buffer = [0; 4096];

    let Ok(n) = stream.read(&mut buffer) else {
        return;
    };
    let request = String::from_utf8_lossy(&buffer[..n]).to_string();
    if let Ok(mut log) = requests.lock() {
        log.push(request.clone());
    }

    if config.delay_ms > 0 {
        thread::sleep(Duration::from_millis(config.delay_ms));
    }

    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", &[], r#"{"error": "Invalid request"}"#);
        return;
    }

    let (method, path) = (parts[0], parts[1]);
    let (route, query) = path.split_once('?').unwrap_or((path, ""));

    if method != "GET" {
        send_response(&mut stream, 405, "Method Not Allowed", &[], r#"{"error": "Method not allowed"}"#);
        return;
    }
    if route != "/items" {
        send_response(&mut stream, 404, "Not Found", &[], r#"{"error": "Endpoint not found"}"#);
        return;
    }

    match &config.behavior {
        MockBehavior::RateLimited { retry_after } => {
            let headers: Vec<(&str, &str)> = retry_after
                .as_deref()
                .map(|v| vec![("Retry-After", v)])
                .unwrap_or_default();
            send_response(
                &mut stream,
                429,
                "Too Many Requests",
                &headers,
                r#"{"errors":[{"id":"rate_limit_exceeded","message":"Rate limit exceeded"}]}"#,
            );
        }
        MockBehavior::ServerError => {
            send_response(&mut stream, 500, "Internal Server Error", &[], r#"{"error": "upstream exploded"}"#);
        }
        MockBehavior::Ok => {
            let listing = if query.split('&').any(|p| p == "tradable=false") {
                &config.non_tradable
            } else {
                &config.tradable
            };
            let items: Vec<MockItem> = listing
                .iter()
                .map(|(name, price)| MockItem {
                    market_hash_name: name,
                    currency: "EUR",
                    min_price: *price,
                    quantity: u64::from(price.is_some()),
                    item_page: format!("https://skinport.com/item/{}", name.to_lowercase().replace(' ', "-")),
                })
                .collect();
            match serde_json::to_string(&items) {
                Ok(json) => send_response(&mut stream, 200, "OK", &[], &json),
                Err(_) => send_response(&mut stream, 500, "Internal Server Error", &[], "{}"),
            }
        }
    }
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, headers: &[(&str, &str)], body: &str) {
    let extra: String = headers
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect();
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status,
        status_text,
        body.len(),
        extra,
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use crate::adapters::SkinportClient;
    use crate::cache::ExpiringCache;
    use crate::domain::result::Error;
    use crate::ports::PriceProvider;
    use crate::ratelimit::RateLimiter;
    use crate::services::PriceService;

    fn client_for(server: &MockSkinportServer) -> SkinportClient {
        SkinportClient::new_with_base_url(&server.base_url(), None, None).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_tradable_items() {
        let server = MockSkinportServer::start(MockConfig::default()).unwrap();
        let client = client_for(&server);

        let items = client.fetch_items(true).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].market_hash_name, "AK-47 | Redline (Field-Tested)");
        assert_eq!(items[0].min_price, Some(dec!(11.87)));
        assert_eq!(items[2].min_price, None);

        let requests = server.requests();
        let line = requests[0].lines().next().unwrap();
        assert!(line.starts_with("GET /items?"));
        assert!(line.contains("app_id=730"));
        assert!(line.contains("currency=EUR"));
        assert!(line.contains("tradable=true"));
        assert!(requests[0].to_lowercase().contains("accept-encoding: br"));
        assert!(!requests[0].to_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn test_fetch_non_tradable_items() {
        let server = MockSkinportServer::start(MockConfig::default()).unwrap();
        let items = client_for(&server).fetch_items(false).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].min_price, Some(dec!(925)));
    }

    #[tokio::test]
    async fn test_basic_auth_sent_with_credentials() {
        let server = MockSkinportServer::start(MockConfig::default()).unwrap();
        let client =
            SkinportClient::new_with_base_url(&server.base_url(), Some("client"), Some("secret")).unwrap();

        client.fetch_items(true).await.unwrap();
        assert!(server.requests()[0].to_lowercase().contains("authorization: basic "));
    }

    #[tokio::test]
    async fn test_429_with_retry_after() {
        let server = MockSkinportServer::start(MockConfig {
            behavior: MockBehavior::RateLimited {
                retry_after: Some("90".to_string()),
            },
            ..Default::default()
        })
        .unwrap();

        let err = client_for(&server).fetch_items(true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UpstreamThrottled { retry_after: Some(d) } if d == Duration::from_secs(90)
        ));
    }

    #[tokio::test]
    async fn test_429_with_garbage_retry_after() {
        let server = MockSkinportServer::start(MockConfig {
            behavior: MockBehavior::RateLimited {
                retry_after: Some("soon".to_string()),
            },
            ..Default::default()
        })
        .unwrap();

        let err = client_for(&server).fetch_items(true).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamThrottled { retry_after: None }));
    }

    #[tokio::test]
    async fn test_server_error_carries_status_and_body() {
        let server = MockSkinportServer::start(MockConfig {
            behavior: MockBehavior::ServerError,
            ..Default::default()
        })
        .unwrap();

        let err = client_for(&server).fetch_items(true).await.unwrap_err();
        match err {
            Error::Upstream(message) => {
                assert!(message.contains("500"));
                assert!(message.contains("upstream exploded"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_upstream_error() {
        let port = {
            let server = MockSkinportServer::start(MockConfig::default()).unwrap();
            server.port()
        };
        let client =
            SkinportClient::new_with_base_url(&format!("http://127.0.0.1:{}", port), None, None).unwrap();
        assert!(matches!(client.fetch_items(true).await, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_price_service_against_mock() {
        let server = MockSkinportServer::start(MockConfig::default()).unwrap();
        let provider: Arc<dyn PriceProvider> = Arc::new(client_for(&server));
        let cache = Arc::new(ExpiringCache::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(8, Duration::from_secs(300)));
        let service = PriceService::new(
            provider,
            Arc::clone(&cache),
            Arc::clone(&limiter),
            Duration::from_secs(300),
            Duration::from_secs(5),
        );

        let items = service.get_items().await.unwrap();
        assert_eq!(items.len(), 4);
        let ak = items
            .iter()
            .find(|i| i.market_hash_name.starts_with("AK-47"))
            .unwrap();
        assert_eq!(ak.min_price_tradable, Some(dec!(11.87)));
        assert_eq!(ak.min_price_non_tradable, Some(dec!(10.02)));

        // Second call is a cache hit
        service.get_items().await.unwrap();
        assert_eq!(server.requests().len(), 2);
        assert_eq!(limiter.remaining(), 6);

        cache.close().await;
    }

    #[tokio::test]
    async fn test_price_service_blocks_limiter_on_429() {
        let server = MockSkinportServer::start(MockConfig {
            behavior: MockBehavior::RateLimited {
                retry_after: Some("42".to_string()),
            },
            ..Default::default()
        })
        .unwrap();
        let limiter = Arc::new(RateLimiter::new(8, Duration::from_secs(300)));
        let service = PriceService::new(
            Arc::new(client_for(&server)),
            Arc::new(ExpiringCache::new(Duration::from_secs(60))),
            Arc::clone(&limiter),
            Duration::from_secs(300),
            Duration::from_secs(5),
        );

        let err = service.get_items().await.unwrap_err();
        let retry_after = err.retry_after().unwrap();
        assert!(retry_after <= Duration::from_secs(42));
        assert!(retry_after > Duration::from_secs(40));
        assert_eq!(limiter.remaining(), 0);

        // Denied locally, no new request reaches the server
        assert!(matches!(service.get_items().await, Err(Error::RateLimitExceeded { .. })));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_timeout() {
        let server = MockSkinportServer::start(MockConfig {
            delay_ms: 500,
            ..Default::default()
        })
        .unwrap();
        let service = PriceService::new(
            Arc::new(client_for(&server)),
            Arc::new(ExpiringCache::new(Duration::from_secs(60))),
            Arc::new(RateLimiter::new(8, Duration::from_secs(300))),
            Duration::from_secs(300),
            Duration::from_millis(100),
        );

        let err = service.get_items().await.unwrap_err();
        assert!(matches!(err, Error::Upstream(ref m) if m.contains("did not answer")));
    }
}
