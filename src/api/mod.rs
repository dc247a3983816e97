//! Remote timeline API and the transport used to reach it.

pub mod error;
pub mod types;

pub use error::FetchError;
pub use types::{MediaEntity, Page, Post};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Client, Url};
use serde_json::Value;

pub const DEFAULT_API_BASE: &str = "https://api.sotwe.com";

const DEFAULT_REFERER: &str = "https://www.sotwe.com/";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Fetch capability used by the paginator and the media store.
///
/// Chosen once at startup. The HTTP implementation is the only one shipped;
/// tests swap in an in-memory one.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and decode the body as JSON.
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;

    /// GET `url` and return the raw body.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Plain `reqwest` transport with browser-like default headers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        default_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));
        default_headers.insert("priority", HeaderValue::from_static("u=1, i"));
        default_headers.insert(REFERER, HeaderValue::from_static(DEFAULT_REFERER));
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                source: e,
                url: url.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.send(url).await?;
        response.json().await.map_err(|e| FetchError::Decode {
            source: e,
            url: url.to_string(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url).await?;
        let bytes = response.bytes().await.map_err(|e| FetchError::Http {
            source: e,
            url: url.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Build the timeline URL for `username`, optionally resuming at `cursor`.
pub fn page_url(api_base: &str, username: &str, cursor: Option<&str>) -> Result<String, FetchError> {
    let raw = format!("{}/v3/user/", api_base.trim_end_matches('/'));
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.clone(),
        reason,
    };
    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    // Pushed as a segment so `?`, `#` and `/` in the name are percent-encoded.
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .push(username)
        .push("");
    if let Some(cursor) = cursor {
        url.query_pairs_mut().append_pair("after", cursor);
    }
    Ok(url.into())
}
