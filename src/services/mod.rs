//! # Sibling Service Clients
//!
//! JSON adapters for the categories and downloads services. Every call is a
//! `POST {rpc_server}/{Service}/{Method}` whose body is the request message
//! serialized as JSON, answered by the response message in the same form.
//!
//! A `404` means the addressed resource does not exist. Other non-2xx
//! statuses, bodies that fail to decode and clusters missing their identity
//! are all reported as [`CollectError::UpstreamRpc`], tagged with the service.

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CollectError, Result, RpcFailure, Service};
use crate::models::{CategoriesCluster, DownloadBatchRequest};
use crate::traits::{CategoriesService, DownloadsService};

#[derive(Debug, Serialize)]
struct GetCategoriesClusterRequest<'a> {
    uuid: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetCategoriesClusterResponse {
    cluster: Option<CategoriesCluster>,
}

#[derive(Debug, Serialize)]
struct CreateCategoryRequest<'a> {
    name: &'a str,
    parent: &'a str,
    cluster: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateCategoryResponse {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct DownloadBatchResponse {
    download_uuid: String,
}

/// Shared transport for both services
#[derive(Clone)]
pub struct RpcGateway {
    client: Client,
    base_url: String,
}

impl RpcGateway {
    pub fn new(base_url: &str, extra_root: Option<Certificate>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(root) = extra_root {
            builder = builder.add_root_certificate(root);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds the gateway from config, trusting the development CA when set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let extra_root = match (&config.ca_cert_path, config.development_mode) {
            (Some(path), true) => {
                let pem = std::fs::read(path).map_err(|e| {
                    CollectError::Config(format!("CA certificate {}: {e}", path.display()))
                })?;
                info!("Trusting development CA from {}", path.display());
                Some(Certificate::from_pem(&pem)?)
            }
            (Some(_), false) => {
                warn!("CA_CERT_PATH ignored outside development mode");
                None
            }
            (None, _) => None,
        };

        Self::new(&config.rpc_server, extra_root)
    }

    async fn call<Req, Resp>(&self, service: Service, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}/{method}", self.base_url, service_path(service));
        debug!("Calling {url}");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CollectError::upstream(service, RpcFailure::Transport(e.to_string())))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(CollectError::upstream(service, RpcFailure::NotFound));
            }
            status => {
                return Err(CollectError::upstream(
                    service,
                    RpcFailure::Status(status.as_u16()),
                ));
            }
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| CollectError::upstream(service, RpcFailure::Malformed(e.to_string())))
    }
}

fn service_path(service: Service) -> &'static str {
    match service {
        Service::Categories => "CategoriesService",
        Service::Downloads => "DownloadService",
    }
}

pub struct CategoriesClient {
    gateway: RpcGateway,
}

impl CategoriesClient {
    pub fn new(gateway: RpcGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CategoriesService for CategoriesClient {
    async fn get_categories_cluster(&self, cluster_uuid: &str) -> Result<CategoriesCluster> {
        let response: GetCategoriesClusterResponse = self
            .gateway
            .call(
                Service::Categories,
                "GetCategoriesCluster",
                &GetCategoriesClusterRequest { uuid: cluster_uuid },
            )
            .await?;

        let cluster = response.cluster.ok_or_else(|| {
            CollectError::upstream(Service::Categories, RpcFailure::NotFound)
        })?;

        validate_cluster(cluster)
    }

    async fn create_category(
        &self,
        name: &str,
        parent_uuid: &str,
        cluster_uuid: &str,
    ) -> Result<String> {
        let response: CreateCategoryResponse = self
            .gateway
            .call(
                Service::Categories,
                "CreateCategory",
                &CreateCategoryRequest {
                    name,
                    parent: parent_uuid,
                    cluster: cluster_uuid,
                },
            )
            .await?;

        if response.uuid.is_empty() {
            return Err(CollectError::upstream(
                Service::Categories,
                RpcFailure::Malformed("created category has no uuid".to_string()),
            ));
        }

        Ok(response.uuid)
    }
}

/// A cluster without its identity or filesystem placement is unusable.
fn validate_cluster(cluster: CategoriesCluster) -> Result<CategoriesCluster> {
    let missing = [("uuid", &cluster.uuid), ("fs_path", &cluster.fs_path)]
        .into_iter()
        .find(|(_, value)| value.is_empty());

    match missing {
        Some((field, _)) => Err(CollectError::upstream(
            Service::Categories,
            RpcFailure::Malformed(format!("cluster has an empty {field}")),
        )),
        None => Ok(cluster),
    }
}

pub struct DownloadsClient {
    gateway: RpcGateway,
}

impl DownloadsClient {
    pub fn new(gateway: RpcGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DownloadsService for DownloadsClient {
    async fn download_images_batch(
        &self,
        image_urls: Vec<String>,
        category_uuid: &str,
        cluster_token: &str,
        download_uuid: &str,
    ) -> Result<String> {
        let request = DownloadBatchRequest {
            image_urls,
            category_uuid: category_uuid.to_string(),
            cluster_token: cluster_token.to_string(),
            download_uuid: download_uuid.to_string(),
        };

        let response: DownloadBatchResponse = self
            .gateway
            .call(Service::Downloads, "DownloadImagesBatch", &request)
            .await?;

        Ok(response.download_uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> RpcGateway {
        RpcGateway::new(&server.uri(), None).unwrap()
    }

    #[tokio::test]
    async fn fetches_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/CategoriesService/GetCategoriesCluster"))
            .and(body_json(json!({"uuid": "c1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cluster": {
                    "uuid": "c1",
                    "name": "Wallpapers",
                    "fs_path": "/srv/wallpapers",
                    "filter_category": "f1",
                    "root_category": "r1"
                }
            })))
            .mount(&server)
            .await;

        let cluster = CategoriesClient::new(gateway(&server))
            .get_categories_cluster("c1")
            .await
            .unwrap();

        assert_eq!(cluster.fs_path, "/srv/wallpapers");
    }

    #[tokio::test]
    async fn missing_cluster_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = CategoriesClient::new(gateway(&server))
            .get_categories_cluster("nope")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CollectError::UpstreamRpc {
                service: Service::Categories,
                cause: RpcFailure::NotFound
            }
        ));
    }

    #[tokio::test]
    async fn partially_populated_cluster_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cluster": {"uuid": "c1", "name": "Wallpapers"}
            })))
            .mount(&server)
            .await;

        let err = CategoriesClient::new(gateway(&server))
            .get_categories_cluster("c1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CollectError::UpstreamRpc {
                cause: RpcFailure::Malformed(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn submits_download_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/DownloadService/DownloadImagesBatch"))
            .and(body_json(json!({
                "image_urls": ["https://i.example.org/g/1.jpg"],
                "category_uuid": "cat-1",
                "cluster_token": "token",
                "download_uuid": "99000003"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"download_uuid": "99000003"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let download_uuid = DownloadsClient::new(gateway(&server))
            .download_images_batch(
                vec!["https://i.example.org/g/1.jpg".to_string()],
                "cat-1",
                "token",
                "99000003",
            )
            .await
            .unwrap();

        assert_eq!(download_uuid, "99000003");
    }

    #[tokio::test]
    async fn creates_category() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/CategoriesService/CreateCategory"))
            .and(body_json(json!({"name": "desks", "parent": "p1", "cluster": "c1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "cat-9"})))
            .mount(&server)
            .await;

        let uuid = CategoriesClient::new(gateway(&server))
            .create_category("desks", "p1", "c1")
            .await
            .unwrap();

        assert_eq!(uuid, "cat-9");
    }
}
