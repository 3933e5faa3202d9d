//! Content extraction and download orchestration for imageboard threads.
//!
//! Board catalogs and thread pages are scraped into typed records, and whole
//! threads can be handed to the downloads service as a single batch.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod sanitizer;
pub mod scrapers;
pub mod services;
pub mod traits;
