use thiserror::Error;

use crate::api::FetchError;

/// Failure storing a single media item. Never fatal to the pagination loop.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("No usable filename in media URL {0}")]
    InvalidUrl(String),
}
