use std::fmt;

use thiserror::Error;

/// Sibling service a failed call was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Categories,
    Downloads,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Categories => f.write_str("categories service"),
            Self::Downloads => f.write_str("downloads service"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    #[error("resource not found")]
    NotFound,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("responded with status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("source site responded to {url} with status {status}")]
    Fetch { url: String, status: u16 },

    #[error("request to source site failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not parse source content: {reason}")]
    Parse { reason: String },

    #[error("{service} call failed: {cause}")]
    UpstreamRpc { service: Service, cause: RpcFailure },

    #[error("could not sign cluster credential: {0}")]
    Credential(#[from] jsonwebtoken::errors::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CollectError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn upstream(service: Service, cause: RpcFailure) -> Self {
        Self::UpstreamRpc { service, cause }
    }
}

/// Step of the thread download workflow that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    ImageExtraction,
    ClusterLookup,
    CategoryCreation,
    CredentialMint,
    Submission,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::ImageExtraction => "image extraction",
            Self::ClusterLookup => "cluster lookup",
            Self::CategoryCreation => "category creation",
            Self::CredentialMint => "credential mint",
            Self::Submission => "download submission",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
#[error("thread download failed during {stage}: {source}")]
pub struct WorkflowError {
    pub stage: WorkflowStage,
    #[source]
    pub source: CollectError,
}

impl WorkflowError {
    pub fn at(stage: WorkflowStage) -> impl FnOnce(CollectError) -> Self {
        move |source| Self { stage, source }
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;
