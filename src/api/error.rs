use thiserror::Error;

/// Failures talking to the remote API or the media CDN.
///
/// A `FetchError` on a page request ends the run for that user; on a media
/// request it only costs that one file.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("Could not decode response from {url}: {source}")]
    Decode {
        source: reqwest::Error,
        url: String,
    },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Http { source, .. } | FetchError::Decode { source, .. } => {
                source.status().map(|s| s.as_u16())
            }
            FetchError::InvalidUrl { .. } | FetchError::Client(_) => None,
        }
    }
}
