//! Seams between the extraction pipeline and its collaborators

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{BoardCatalogThread, CategoriesCluster};

/// CSS selectors for the parts of a thread page
#[derive(Debug, Clone)]
pub struct ThreadSelectors {
    /// Desktop post-info timestamp of the original post
    pub op_date: String,
    pub op_file_link: String,
    pub op_subject: String,
    pub op_message: String,
    pub op_thumbnail: String,
    /// Every reply container, in document order
    pub reply_container: String,
    /// The following are relative to a reply container
    pub reply_message: String,
    pub reply_thumbnail: String,
    pub reply_file_link: String,
    pub reply_date: String,
    /// Anchors wrapping a thumbnail and pointing at the full image
    pub thumbnail_anchor: String,
    /// Attribute carrying the UTC timestamp on date elements
    pub date_attribute: String,
}

impl Default for ThreadSelectors {
    fn default() -> Self {
        Self {
            op_date: ".postInfo.desktop > .dateTime".to_string(),
            op_file_link: ".opContainer .file a".to_string(),
            op_subject: ".opContainer .subject".to_string(),
            op_message: ".opContainer .postMessage".to_string(),
            op_thumbnail: ".opContainer .fileThumb img".to_string(),
            reply_container: ".thread .replyContainer".to_string(),
            reply_message: ".postMessage".to_string(),
            reply_thumbnail: ".fileThumb img".to_string(),
            reply_file_link: ".file a".to_string(),
            reply_date: ".postInfo.desktop > .dateTime".to_string(),
            thumbnail_anchor: "a.fileThumb".to_string(),
            date_attribute: "data-utc".to_string(),
        }
    }
}

/// Turns the text of the script tag holding the catalog into its decoded object.
///
/// Locating the script is done by the caller, so a decoder only has to
/// understand the payload format.
pub trait CatalogPayloadDecoder: Send + Sync {
    fn decode(&self, script_text: &str) -> Result<Map<String, Value>>;
}

/// Normalizes one raw catalog entry into a [`BoardCatalogThread`].
pub trait CatalogEntryUnpacker: Send + Sync {
    fn unpack(&self, board_name: &str, thread_uuid: &str, entry: &Map<String, Value>)
    -> BoardCatalogThread;
}

/// Source of full-resolution image URLs for a thread
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThreadImageSource: Send + Sync {
    async fn thread_images(&self, board_name: &str, thread_uuid: &str) -> Result<Vec<String>>;
}

/// Categories service contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoriesService: Send + Sync {
    /// Fails with a not-found cause when the cluster does not exist.
    async fn get_categories_cluster(&self, cluster_uuid: &str) -> Result<CategoriesCluster>;

    /// Returns the uuid of the created (or already existing) category.
    async fn create_category(&self, name: &str, parent_uuid: &str, cluster_uuid: &str)
    -> Result<String>;
}

/// Downloads service contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadsService: Send + Sync {
    /// Returns the job uuid; an empty `download_uuid` lets the service pick one.
    async fn download_images_batch(
        &self,
        image_urls: Vec<String>,
        category_uuid: &str,
        cluster_token: &str,
        download_uuid: &str,
    ) -> Result<String>;
}
