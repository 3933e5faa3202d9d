//! Extractors for the source site's catalog and thread pages

pub mod catalog;
pub mod images;
pub mod thread;

pub use catalog::{CatalogExtractor, FieldTableUnpacker, ObjectLiteralDecoder};
pub use images::ImageUrlExtractor;
pub use thread::ThreadParser;

use reqwest::Url;
use scraper::Selector;

use crate::error::{CollectError, Result};

pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| CollectError::Config(format!("bad selector {selector:?}: {e:?}")))
}

pub(crate) fn page_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| CollectError::parse(format!("page url {url:?} is invalid: {e}")))
}

/// Rewrites protocol-relative `//host/path` URLs to `https://host/path`.
pub fn to_https(raw: &str) -> String {
    if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    }
}

/// Makes a URL found on `page` absolute. Protocol-relative URLs get https,
/// absolute ones are returned untouched and anything else is resolved
/// against the page.
pub fn absolutize(raw: &str, page: &Url) -> String {
    let raw = raw.trim();

    if raw.starts_with("//") {
        return to_https(raw);
    }

    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }

    page.join(raw)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| raw.to_string())
}
