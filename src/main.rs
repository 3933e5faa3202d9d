use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chan_collect::api::{self, AppState};
use chan_collect::config::Config;
use chan_collect::credentials::ClusterSigner;
use chan_collect::http::SourceClient;
use chan_collect::orchestrator::ThreadDownloadOrchestrator;
use chan_collect::sanitizer::Sanitizer;
use chan_collect::scrapers::{CatalogExtractor, ImageUrlExtractor, ThreadParser};
use chan_collect::services::{CategoriesClient, DownloadsClient, RpcGateway};
use chan_collect::traits::ThreadSelectors;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Starting {}", config.service_name);

    let settings = Arc::new(config.source.clone());
    let selectors = ThreadSelectors::default();
    let client = SourceClient::new()?;

    let gateway = RpcGateway::from_config(&config)?;
    let orchestrator = ThreadDownloadOrchestrator::new(
        Arc::new(ImageUrlExtractor::new(
            client.clone(),
            settings.clone(),
            &selectors,
        )?),
        Arc::new(CategoriesClient::new(gateway.clone())),
        Arc::new(DownloadsClient::new(gateway)),
        Arc::new(ClusterSigner::new(&config.domain_secret)),
    );

    let state = AppState {
        tracked_boards: Arc::new(config.tracked_boards.clone()),
        source_client: client.clone(),
        catalog: Arc::new(CatalogExtractor::new(client.clone(), settings.clone())?),
        threads: Arc::new(ThreadParser::new(
            client,
            settings,
            Arc::new(Sanitizer::new()),
            &selectors,
        )?),
        orchestrator,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.service_port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, api::router(state)).await?;

    Ok(())
}
