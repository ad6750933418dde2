//! Image download for notification attachments

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::{Attachment, NotificationContent, ATTACHMENT_IDENTIFIER};

/// Errors that can occur while fetching an attachment
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Download failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Downloaded image is empty")]
    EmptyBody,

    #[error("Failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads notification images into a temporary directory
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
    temp_dir: PathBuf,
}

impl ImageFetcher {
    /// Create a fetcher that stores images under `temp_dir`
    pub fn new(temp_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            temp_dir: temp_dir.into(),
        })
    }

    /// Create a fetcher using the system temporary directory and a 30s timeout
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(std::env::temp_dir(), Duration::from_secs(30))
    }

    /// Attach the image named by the content's user info
    ///
    /// Returns the content unmodified when there is no URL or the download fails.
    pub async fn enrich(&self, mut content: NotificationContent) -> NotificationContent {
        let Some(raw_url) = content.image_url() else {
            debug!("Notification carries no image URL");
            return content;
        };

        let attachment = match Url::parse(raw_url) {
            Ok(url) => self.download(&url).await,
            Err(e) => Err(FetchError::InvalidUrl(e.to_string())),
        };

        match attachment {
            Ok(attachment) => {
                debug!(path = %attachment.path.display(), "Attached notification image");
                content.attachments = vec![attachment];
            }
            Err(e) => warn!("Delivering notification without image: {}", e),
        }

        content
    }

    /// Download `url` to a uniquely named `.jpg` file
    pub async fn download(&self, url: &Url) -> Result<Attachment, FetchError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(FetchError::InvalidUrl(format!(
                    "URL scheme must be http or https, got: {}",
                    scheme
                )))
            }
        }

        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let mut file = tempfile::Builder::new()
            .prefix("notification-")
            .suffix(".jpg")
            .tempfile_in(&self.temp_dir)?;
        file.write_all(&bytes)?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        Ok(Attachment {
            identifier: ATTACHMENT_IDENTIFIER.to_string(),
            path,
        })
    }
}
