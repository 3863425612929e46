//! Skinport API client
//!
//! Fetches per-item minimum prices for Counter-Strike 2 listings.
//!
//! API Documentation: https://docs.skinport.com/items

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::domain::result::{Error, Result};
use crate::domain::SkinportItem;
use crate::ports::PriceProvider;

/// Default production API URL
pub const SKINPORT_PRODUCTION_URL: &str = "https://api.skinport.com/v1";

/// Steam app id of Counter-Strike 2
const APP_ID: &str = "730";

const CURRENCY: &str = "EUR";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longer `Retry-After` values are treated as bogus and ignored
const MAX_RETRY_AFTER: Duration = Duration::from_secs(86_400);

/// Longest slice of an error body carried into error messages
const MAX_ERROR_BODY: usize = 512;

/// Skinport API client
#[derive(Debug)]
pub struct SkinportClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl SkinportClient {
    /// Create a client for the production API
    pub fn new(client_id: Option<&str>, client_secret: Option<&str>) -> Result<Self> {
        Self::new_with_base_url(SKINPORT_PRODUCTION_URL, client_id, client_secret)
    }

    /// Create a client for a custom base URL (staging, mock servers)
    ///
    /// Basic auth is sent only when both the client id and secret are set.
    pub fn new_with_base_url(
        base_url: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<Self> {
        let base_url = validate_base_url(base_url)?;

        // The `brotli` feature advertises `Accept-Encoding: br` and decodes the body
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.to_string(), secret.to_string()))
            }
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::upstream(format!(
                "Skinport request timed out after {} seconds",
                REQUEST_TIMEOUT.as_secs()
            ))
        } else if error.is_connect() {
            Error::upstream("Unable to connect to Skinport servers")
        } else {
            Error::upstream(format!("Skinport request failed: {}", error))
        }
    }

    /// Turn non-success responses into errors
    async fn check_response_status(&self, response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
                Err(Error::UpstreamThrottled { retry_after })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(MAX_ERROR_BODY).collect();
                Err(Error::upstream(format!(
                    "Skinport API error: HTTP {}: {}",
                    status.as_u16(),
                    body.trim()
                )))
            }
        }
    }
}

#[async_trait]
impl PriceProvider for SkinportClient {
    fn name(&self) -> &str {
        "skinport"
    }

    async fn fetch_items(&self, tradable: bool) -> Result<Vec<SkinportItem>> {
        let url = format!("{}/items", self.base_url);
        let tradable = if tradable { "true" } else { "false" };

        let mut request = self
            .client
            .get(&url)
            .query(&[("app_id", APP_ID), ("currency", CURRENCY), ("tradable", tradable)]);
        if let Some((id, secret)) = &self.credentials {
            request = request.basic_auth(id, Some(secret));
        }

        let response = request.send().await.map_err(|e| self.map_request_error(e))?;
        let response = self.check_response_status(response).await?;

        let items: Vec<SkinportItem> = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse Skinport items response: {}", e)))?;

        log::debug!("Skinport returned {} items (tradable={})", items.len(), tradable);
        Ok(items)
    }
}

/// Accept only absolute http(s) URLs with a host; trailing slashes are dropped
pub(crate) fn validate_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| Error::Config(format!("invalid Skinport URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "invalid Skinport URL '{}': scheme must be http or https",
            raw
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Config(format!("invalid Skinport URL '{}': missing host", raw)));
    }

    Ok(raw.trim_end_matches('/').to_string())
}

/// Parse a `Retry-After` value given in whole seconds
///
/// Missing or unparseable values mean "no hint"; HTTP-date values are not
/// used by Skinport and count as unparseable. So do values above a day.
fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let raw = value?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>().map(Duration::from_secs) {
        Ok(hint) if hint <= MAX_RETRY_AFTER => Some(hint),
        Ok(hint) => {
            log::warn!("Ignoring implausible Retry-After of {}s", hint.as_secs());
            None
        }
        Err(_) => {
            log::warn!("Ignoring unparseable Retry-After header: {:?}", raw);
            None
        }
    }
}
