//! Notification content enrichment
//!
//! Push notifications may carry an image URL in their user info. The
//! fetcher downloads it into a temporary directory and attaches it; any
//! failure delivers the original content unmodified.

pub mod fetcher;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use fetcher::{FetchError, ImageFetcher};

/// User-info key holding the image URL
pub const IMAGE_URL_KEY: &str = "url";

/// Identifier given to downloaded image attachments
pub const ATTACHMENT_IDENTIFIER: &str = "picture";

/// File attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub identifier: String,
    pub path: PathBuf,
}

/// Content of a delivered notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    /// Arbitrary payload sent along with the notification
    #[serde(default)]
    pub user_info: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl NotificationContent {
    /// Image URL from the user info, if present
    pub fn image_url(&self) -> Option<&str> {
        self.user_info.get(IMAGE_URL_KEY).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url_lookup() {
        let content: NotificationContent = serde_json::from_str(
            r#"{"title":"Hi","user_info":{"url":"https://cdn.example.com/a.jpg","icon_name":"bell"}}"#,
        )
        .unwrap();
        assert_eq!(content.image_url(), Some("https://cdn.example.com/a.jpg"));
        assert!(content.attachments.is_empty());
        assert_eq!(content.body, "");
    }

    #[test]
    fn test_non_string_url_is_ignored() {
        let content: NotificationContent =
            serde_json::from_str(r#"{"user_info":{"url":42}}"#).unwrap();
        assert_eq!(content.image_url(), None);
    }
}
