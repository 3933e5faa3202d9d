//! Process configuration, loaded once at startup and shared read-only

use std::env;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use tracing::info;

use crate::error::{CollectError, Result};
use crate::models::TrackedBoards;

const DEFAULT_SERVICE_NAME: &str = "collect";
const DEFAULT_CATALOG_VARIABLE: &str = "catalog";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Contents of the local settings file
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSettings {
    pub tracked_boards: TrackedBoards,
    #[serde(flatten)]
    pub source: SourceSettings,
}

/// URL templates and lookup markers for the source site
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Catalog page, with `{board_name}` placeholder
    pub board_catalog_template: String,
    /// Thread page, with `{board_name}` and `{thread_uuid}` placeholders
    pub thread_template: String,
    /// Cover thumbnail, with `{board_name}` and `{thread_id}` placeholders
    pub thread_cover_image_template: String,
    /// Substring identifying the script tag that embeds the catalog
    pub catalog_threads_lookup_string: String,
    /// JavaScript variable the catalog literal is assigned to
    #[serde(default = "default_catalog_variable")]
    pub catalog_variable: String,
}

impl SourceSettings {
    pub fn board_catalog_url(&self, board_name: &str) -> String {
        fill_template(&self.board_catalog_template, &[("board_name", board_name)])
    }

    pub fn thread_url(&self, board_name: &str, thread_uuid: &str) -> String {
        fill_template(
            &self.thread_template,
            &[("board_name", board_name), ("thread_uuid", thread_uuid)],
        )
    }

    pub fn cover_image_url(&self, board_name: &str, cover_image_id: &str) -> String {
        fill_template(
            &self.thread_cover_image_template,
            &[("board_name", board_name), ("thread_id", cover_image_id)],
        )
    }
}

/// Replaces each `{key}` in `template` with the percent-encoded value.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |url, (key, value)| {
        url.replace(&format!("{{{key}}}"), &urlencoding::encode(value))
    })
}

#[derive(Debug)]
pub struct Config {
    pub service_name: String,
    pub service_port: u16,
    pub development_mode: bool,
    /// HS256 key for cluster credentials
    pub domain_secret: SecretString,
    /// Base URL of the sibling-service RPC gateway
    pub rpc_server: String,
    /// Extra PEM trust anchor for the gateway, development only
    pub ca_cert_path: Option<PathBuf>,
    pub tracked_boards: TrackedBoards,
    pub source: SourceSettings,
}

impl Config {
    /// Reads the environment (after loading `.env`) and the local settings file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let service_port = required_var("SERVICE_PORT")?
            .parse::<u16>()
            .map_err(|e| CollectError::Config(format!("SERVICE_PORT is not a port: {e}")))?;
        let service_name =
            env::var("SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
        let domain_secret = SecretString::from(required_var("DOMAIN_SECRET")?);
        let rpc_server = required_var("RPC_SERVER")?;
        let development_mode = env::var("DEVELOPMENT").is_ok_and(|v| v == "1");
        let ca_cert_path = env::var("CA_CERT_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let settings_path = match env::var("LOCAL_SETTINGS_PATH") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(required_var("OPERATION_DATA_PATH")?).join(SETTINGS_FILE_NAME),
        };

        let LocalSettings {
            tracked_boards,
            source,
        } = load_local_settings(&settings_path)?;

        info!(
            "Loaded settings from {} ({} tracked boards)",
            settings_path.display(),
            tracked_boards.len()
        );

        Ok(Self {
            service_name,
            service_port,
            development_mode,
            domain_secret,
            rpc_server,
            ca_cert_path,
            tracked_boards,
            source,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(CollectError::Config(format!("{name} is not set"))),
    }
}

pub fn load_local_settings(path: &Path) -> Result<LocalSettings> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CollectError::Config(format!(
            "local settings not readable at {}: {e}",
            path.display()
        ))
    })?;

    parse_local_settings(&raw)
}

pub fn parse_local_settings(raw: &str) -> Result<LocalSettings> {
    serde_json::from_str(raw)
        .map_err(|e| CollectError::Config(format!("local settings are malformed: {e}")))
}

fn default_catalog_variable() -> String {
    DEFAULT_CATALOG_VARIABLE.to_string()
}

#[cfg(test)]
pub(crate) fn test_source_settings(base: &str) -> SourceSettings {
    SourceSettings {
        board_catalog_template: format!("{base}/{{board_name}}/catalog"),
        thread_template: format!("{base}/{{board_name}}/thread/{{thread_uuid}}"),
        thread_cover_image_template: "https://i.example.org/{board_name}/{thread_id}s.jpg"
            .to_string(),
        catalog_threads_lookup_string: "var catalog".to_string(),
        catalog_variable: DEFAULT_CATALOG_VARIABLE.to_string(),
    }
}
