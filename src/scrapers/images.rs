use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::config::SourceSettings;
use crate::error::Result;
use crate::http::{FetchOptions, SourceClient, TlsProfile};
use crate::scrapers::{absolutize, page_url, parse_selector};
use crate::traits::{ThreadImageSource, ThreadSelectors};

/// Collects full-size image URLs from a thread's thumbnail anchors.
///
/// Thread pages hosting images are filtered harder than catalog pages, so
/// this extractor always fetches with a browser TLS profile.
pub struct ImageUrlExtractor {
    client: SourceClient,
    settings: Arc<SourceSettings>,
    thumbnail_anchor: Selector,
}

impl ImageUrlExtractor {
    pub fn new(
        client: SourceClient,
        settings: Arc<SourceSettings>,
        selectors: &ThreadSelectors,
    ) -> Result<Self> {
        Ok(Self {
            client,
            settings,
            thumbnail_anchor: parse_selector(&selectors.thumbnail_anchor)?,
        })
    }

    /// Anchors without an `href` are skipped rather than failing the batch.
    pub fn extract_image_urls(&self, html: &str, page: &Url) -> Vec<String> {
        let document = Html::parse_document(html);

        document
            .select(&self.thumbnail_anchor)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href").filter(|h| !h.trim().is_empty());
                if href.is_none() {
                    debug!("Skipping thumbnail anchor without href");
                }
                href
            })
            .map(|href| absolutize(href, page))
            .collect()
    }
}

#[async_trait]
impl ThreadImageSource for ImageUrlExtractor {
    async fn thread_images(&self, board_name: &str, thread_uuid: &str) -> Result<Vec<String>> {
        let url = self.settings.thread_url(board_name, thread_uuid);

        let page = self
            .client
            .fetch(&url, FetchOptions::impersonating(TlsProfile::Chrome))
            .await?;
        let images = self.extract_image_urls(&page.text(), &page_url(&url)?);

        info!(
            "Found {} images in thread {thread_uuid} on /{board_name}/",
            images.len()
        );
        Ok(images)
    }
}
