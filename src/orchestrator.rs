use std::sync::Arc;

use tracing::info;

use crate::credentials::ClusterSigner;
use crate::error::{WorkflowError, WorkflowStage};
use crate::traits::{CategoriesService, DownloadsService, ThreadImageSource};

/// What to download and where to put it
#[derive(Debug, Clone)]
pub struct ThreadDownloadRequest {
    pub board_name: String,
    pub thread_uuid: String,
    pub target_category_name: String,
    pub parent_category_uuid: String,
    pub cluster_uuid: String,
}

/// Repeated submissions for one thread share a key, so the downloads
/// service coalesces them into a single job.
pub fn idempotency_key(thread_uuid: &str) -> String {
    thread_uuid.to_string()
}

/// Turns "download this thread's images" into a downloads-service job.
///
/// Steps run strictly in order and the first failure aborts the rest. A
/// category created before a later failure is left in place.
#[derive(Clone)]
pub struct ThreadDownloadOrchestrator {
    images: Arc<dyn ThreadImageSource>,
    categories: Arc<dyn CategoriesService>,
    downloads: Arc<dyn DownloadsService>,
    signer: Arc<ClusterSigner>,
}

impl ThreadDownloadOrchestrator {
    pub fn new(
        images: Arc<dyn ThreadImageSource>,
        categories: Arc<dyn CategoriesService>,
        downloads: Arc<dyn DownloadsService>,
        signer: Arc<ClusterSigner>,
    ) -> Self {
        Self {
            images,
            categories,
            downloads,
            signer,
        }
    }

    /// Returns the downloads service's job uuid.
    pub async fn request_thread_image_download(
        &self,
        request: &ThreadDownloadRequest,
    ) -> Result<String, WorkflowError> {
        let image_urls = self
            .images
            .thread_images(&request.board_name, &request.thread_uuid)
            .await
            .map_err(WorkflowError::at(WorkflowStage::ImageExtraction))?;

        let cluster = self
            .categories
            .get_categories_cluster(&request.cluster_uuid)
            .await
            .map_err(WorkflowError::at(WorkflowStage::ClusterLookup))?;

        let category_uuid = self
            .categories
            .create_category(
                &request.target_category_name,
                &request.parent_category_uuid,
                &cluster.uuid,
            )
            .await
            .map_err(WorkflowError::at(WorkflowStage::CategoryCreation))?;

        let cluster_token = self
            .signer
            .mint(&cluster)
            .map_err(WorkflowError::at(WorkflowStage::CredentialMint))?;

        let image_count = image_urls.len();
        let download_uuid = self
            .downloads
            .download_images_batch(
                image_urls,
                &category_uuid,
                &cluster_token,
                &idempotency_key(&request.thread_uuid),
            )
            .await
            .map_err(WorkflowError::at(WorkflowStage::Submission))?;

        info!(
            "Queued {image_count} images from thread {} into category {category_uuid} as download {download_uuid}",
            request.thread_uuid
        );

        Ok(download_uuid)
    }
}
