//! Board catalog extraction.
//!
//! The source site ships a board's catalog as a JavaScript object literal
//! assigned inside one of the page's `<script>` tags. Extraction happens in
//! two stages: locate the script by its marker, then hand its text to a
//! [`CatalogPayloadDecoder`]. The decoder can be swapped without touching
//! the locating stage.

use std::sync::Arc;

use regex::Regex;
use scraper::Html;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::SourceSettings;
use crate::error::{CollectError, Result};
use crate::http::{FetchOptions, SourceClient};
use crate::models::{BoardCatalogThread, sentinel};
use crate::scrapers::{parse_selector, to_https};
use crate::traits::{CatalogEntryUnpacker, CatalogPayloadDecoder};

/// Short source keys for every normalized catalog field
#[derive(Debug, Clone, Copy)]
pub struct CatalogFieldTable {
    pub date: &'static str,
    pub file_name: &'static str,
    pub reply_count: &'static str,
    pub image_count: &'static str,
    pub teaser_text: &'static str,
    pub cover_image: &'static str,
    pub thumb_width: &'static str,
    pub thumb_height: &'static str,
    /// Appended to the teaser when present
    pub subject: &'static str,
}

pub const SOURCE_FIELDS: CatalogFieldTable = CatalogFieldTable {
    date: "date",
    file_name: "file",
    reply_count: "r",
    image_count: "i",
    teaser_text: "teaser",
    cover_image: "imgurl",
    thumb_width: "tn_w",
    thumb_height: "tn_h",
    subject: "sub",
};

/// Unpacks catalog entries through [`SOURCE_FIELDS`], each field falling back
/// to its sentinel (or zero for counts) on its own.
pub struct FieldTableUnpacker {
    settings: Arc<SourceSettings>,
    fields: CatalogFieldTable,
}

impl FieldTableUnpacker {
    pub fn new(settings: Arc<SourceSettings>) -> Self {
        Self {
            settings,
            fields: SOURCE_FIELDS,
        }
    }
}

impl CatalogEntryUnpacker for FieldTableUnpacker {
    fn unpack(
        &self,
        board_name: &str,
        thread_uuid: &str,
        entry: &Map<String, Value>,
    ) -> BoardCatalogThread {
        let f = &self.fields;

        let cover_image_url = match text_field(entry, f.cover_image) {
            Some(id) => to_https(&self.settings.cover_image_url(board_name, &id)),
            None => sentinel::NO_IMAGE_URL.to_string(),
        };

        let mut teaser_text =
            text_field(entry, f.teaser_text).unwrap_or_else(|| sentinel::NO_TEASER.to_string());
        if let Some(subject) = text_field(entry, f.subject) {
            teaser_text = format!("{teaser_text} - {subject}");
        }

        BoardCatalogThread {
            uuid: thread_uuid.to_string(),
            date: text_field(entry, f.date).unwrap_or_else(|| sentinel::NO_DATE.to_string()),
            file_name: text_field(entry, f.file_name)
                .unwrap_or_else(|| sentinel::NO_FILE.to_string()),
            reply_count: count_field(entry, f.reply_count),
            image_count: count_field(entry, f.image_count),
            teaser_text,
            cover_image_url,
            thumb_width: count_field(entry, f.thumb_width),
            thumb_height: count_field(entry, f.thumb_height),
            board_name: board_name.to_string(),
        }
    }
}

/// Strings as-is, numbers in decimal; anything else counts as absent.
fn text_field(entry: &Map<String, Value>, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_field(entry: &Map<String, Value>, key: &str) -> u64 {
    match entry.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Decodes `var <name> = {...};` by scanning for the brace that balances the
/// opening one, so trailing formatting after the literal does not matter.
pub struct ObjectLiteralDecoder {
    assignment: Regex,
}

impl ObjectLiteralDecoder {
    pub fn new(variable: &str) -> Result<Self> {
        let pattern = format!(r"(?:var|let|const)\s+{}\s*=\s*\{{", regex::escape(variable));
        let assignment = Regex::new(&pattern)
            .map_err(|e| CollectError::Config(format!("bad catalog variable {variable:?}: {e}")))?;

        Ok(Self { assignment })
    }
}

impl CatalogPayloadDecoder for ObjectLiteralDecoder {
    fn decode(&self, script_text: &str) -> Result<Map<String, Value>> {
        let found = self
            .assignment
            .find(script_text)
            .ok_or_else(|| CollectError::parse("catalog assignment not found in script"))?;

        let literal = balanced_object_literal(&script_text[found.end() - 1..])
            .ok_or_else(|| CollectError::parse("catalog literal is not terminated"))?;

        serde_json::from_str(literal)
            .map_err(|e| CollectError::parse(format!("catalog literal could not be decoded: {e}")))
    }
}

/// Returns the `{...}` prefix of `text` whose braces balance, skipping braces
/// that sit inside string literals.
pub fn balanced_object_literal(text: &str) -> Option<&str> {
    if !text.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Text of the first `<script>` containing `marker`.
pub fn locate_catalog_script(html: &str, marker: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let script_selector = parse_selector("script")?;

    document
        .select(&script_selector)
        .map(|script| script.text().collect::<String>())
        .find(|text| text.contains(marker))
        .ok_or_else(|| CollectError::parse("no catalog data located"))
}

pub struct CatalogExtractor {
    client: SourceClient,
    settings: Arc<SourceSettings>,
    decoder: Box<dyn CatalogPayloadDecoder>,
    unpacker: Box<dyn CatalogEntryUnpacker>,
}

impl CatalogExtractor {
    pub fn new(client: SourceClient, settings: Arc<SourceSettings>) -> Result<Self> {
        let decoder = ObjectLiteralDecoder::new(&settings.catalog_variable)?;
        let unpacker = FieldTableUnpacker::new(Arc::clone(&settings));

        Ok(Self::with_stages(
            client,
            settings,
            Box::new(decoder),
            Box::new(unpacker),
        ))
    }

    pub fn with_stages(
        client: SourceClient,
        settings: Arc<SourceSettings>,
        decoder: Box<dyn CatalogPayloadDecoder>,
        unpacker: Box<dyn CatalogEntryUnpacker>,
    ) -> Self {
        Self {
            client,
            settings,
            decoder,
            unpacker,
        }
    }

    /// Active threads of `board_name`, in the catalog's own key order.
    pub async fn board_catalog(&self, board_name: &str) -> Result<Vec<BoardCatalogThread>> {
        let url = self.settings.board_catalog_url(board_name);
        info!("Fetching catalog for /{board_name}/");

        let page = self.client.fetch(&url, FetchOptions::default()).await?;
        let threads = self.parse_catalog(board_name, &page.text())?;

        info!("Found {} threads in /{board_name}/ catalog", threads.len());
        Ok(threads)
    }

    pub fn parse_catalog(&self, board_name: &str, html: &str) -> Result<Vec<BoardCatalogThread>> {
        let script = locate_catalog_script(html, &self.settings.catalog_threads_lookup_string)?;
        let payload = self.decoder.decode(&script)?;

        let threads = payload
            .get("threads")
            .and_then(Value::as_object)
            .ok_or_else(|| CollectError::parse("no threads found in catalog"))?;

        let empty = Map::new();
        Ok(threads
            .iter()
            .map(|(thread_uuid, entry)| {
                let entry = entry.as_object().unwrap_or_else(|| {
                    warn!("Catalog entry {thread_uuid} is not an object");
                    &empty
                });
                self.unpacker.unpack(board_name, thread_uuid, entry)
            })
            .collect())
    }
}
