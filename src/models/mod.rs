//! Data models for scraped board content and sibling-service payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder strings standing in for fields the source markup did not carry.
pub mod sentinel {
    pub const NO_DATE: &str = "no-date";
    pub const NO_FILE: &str = "no-file";
    pub const NO_IMAGE_URL: &str = "no-image-url";
    pub const NO_THUMBNAIL_URL: &str = "no-thumbnail-url";
    pub const NO_TITLE: &str = "no-title";
    pub const NO_UUID: &str = "no-uuid";
    pub const NO_TEASER: &str = "no-teaser";
}

/// One active thread as listed in a board's catalog.
///
/// Wire names follow what the web client already reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCatalogThread {
    pub uuid: String,
    pub date: String,
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "responses")]
    pub reply_count: u64,
    #[serde(rename = "images")]
    pub image_count: u64,
    #[serde(rename = "teaser")]
    pub teaser_text: String,
    #[serde(rename = "image_url")]
    pub cover_image_url: String,
    #[serde(rename = "teaser_thumb_width")]
    pub thumb_width: u64,
    #[serde(rename = "teaser_thumb_height")]
    pub thumb_height: u64,
    pub board_name: String,
}

impl BoardCatalogThread {
    pub fn has_images(&self) -> bool {
        self.image_count > 0
    }

    pub fn has_cover_image(&self) -> bool {
        self.cover_image_url != sentinel::NO_IMAGE_URL
    }

    /// Display filter applied by the catalog endpoint unless the client opts out.
    pub fn is_displayable(&self) -> bool {
        self.has_images() && self.has_cover_image()
    }
}

/// The original post that opens a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPost {
    pub uuid: String,
    pub date: String,
    #[serde(rename = "file")]
    pub file_url: String,
    pub title: String,
    pub description: String,
    pub cover_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadReply {
    pub uuid: String,
    pub message: String,
    pub thumbnail_url: String,
    #[serde(rename = "file")]
    pub file_url: String,
    pub date: String,
}

/// A thread's full content, replies kept in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(flatten)]
    pub post: ThreadPost,
    pub replies: Vec<ThreadReply>,
}

/// Storage root owned by the categories service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesCluster {
    pub uuid: String,
    pub name: String,
    pub fs_path: String,
    pub filter_category: String,
    pub root_category: String,
}

/// Payload handed to the downloads service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadBatchRequest {
    pub image_urls: Vec<String>,
    pub category_uuid: String,
    pub cluster_token: String,
    /// Empty asks the downloads service to generate one.
    pub download_uuid: String,
}

/// Board name to description, in settings-file order
pub type TrackedBoards = Map<String, Value>;
