use std::sync::Arc;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::config::SourceSettings;
use crate::error::{CollectError, Result};
use crate::http::{FetchOptions, SourceClient};
use crate::models::{Thread, ThreadPost, ThreadReply, sentinel};
use crate::sanitizer::Sanitizer;
use crate::scrapers::{absolutize, page_url, parse_selector};
use crate::traits::ThreadSelectors;

struct CompiledSelectors {
    op_date: Selector,
    op_file_link: Selector,
    op_subject: Selector,
    op_message: Selector,
    op_thumbnail: Selector,
    reply_container: Selector,
    reply_message: Selector,
    reply_thumbnail: Selector,
    reply_file_link: Selector,
    reply_date: Selector,
    date_attribute: String,
}

impl CompiledSelectors {
    fn compile(selectors: &ThreadSelectors) -> Result<Self> {
        Ok(Self {
            op_date: parse_selector(&selectors.op_date)?,
            op_file_link: parse_selector(&selectors.op_file_link)?,
            op_subject: parse_selector(&selectors.op_subject)?,
            op_message: parse_selector(&selectors.op_message)?,
            op_thumbnail: parse_selector(&selectors.op_thumbnail)?,
            reply_container: parse_selector(&selectors.reply_container)?,
            reply_message: parse_selector(&selectors.reply_message)?,
            reply_thumbnail: parse_selector(&selectors.reply_thumbnail)?,
            reply_file_link: parse_selector(&selectors.reply_file_link)?,
            reply_date: parse_selector(&selectors.reply_date)?,
            date_attribute: selectors.date_attribute.clone(),
        })
    }
}

/// Decodes a thread page into its original post and replies
pub struct ThreadParser {
    client: SourceClient,
    settings: Arc<SourceSettings>,
    sanitizer: Arc<Sanitizer>,
    selectors: CompiledSelectors,
}

impl ThreadParser {
    pub fn new(
        client: SourceClient,
        settings: Arc<SourceSettings>,
        sanitizer: Arc<Sanitizer>,
        selectors: &ThreadSelectors,
    ) -> Result<Self> {
        Ok(Self {
            client,
            settings,
            sanitizer,
            selectors: CompiledSelectors::compile(selectors)?,
        })
    }

    pub async fn thread_content(&self, board_name: &str, thread_uuid: &str) -> Result<Thread> {
        let url = self.settings.thread_url(board_name, thread_uuid);
        info!("Fetching thread {thread_uuid} on /{board_name}/");

        let page = self.client.fetch(&url, FetchOptions::default()).await?;
        let thread = self.parse_thread(thread_uuid, &page.text(), &page_url(&url)?)?;

        info!(
            "Parsed thread {thread_uuid} with {} replies",
            thread.replies.len()
        );
        Ok(thread)
    }

    /// A missing post-info element fails the parse; every other missing
    /// piece falls back to its sentinel.
    pub fn parse_thread(&self, thread_uuid: &str, html: &str, page: &Url) -> Result<Thread> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let post = self.parse_original_post(thread_uuid, root, page)?;
        let replies = root
            .select(&self.selectors.reply_container)
            .map(|container| self.parse_reply(container, page))
            .collect();

        Ok(Thread { post, replies })
    }

    fn parse_original_post(
        &self,
        thread_uuid: &str,
        root: ElementRef<'_>,
        page: &Url,
    ) -> Result<ThreadPost> {
        let s = &self.selectors;

        let date_element = root
            .select(&s.op_date)
            .next()
            .ok_or_else(|| CollectError::parse("thread page has no post info element"))?;

        let title = root
            .select(&s.op_subject)
            .next()
            .map(|subject| subject.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| sentinel::NO_TITLE.to_string());

        let description = self.sanitizer.sanitize_optional(
            root.select(&s.op_message)
                .next()
                .map(|message| message.inner_html())
                .as_deref(),
        );

        Ok(ThreadPost {
            uuid: thread_uuid.to_string(),
            date: attr_or(date_element, &s.date_attribute, sentinel::NO_DATE),
            file_url: linked_url(root, &s.op_file_link, "href", page, sentinel::NO_FILE),
            title,
            description,
            cover_image_url: linked_url(root, &s.op_thumbnail, "src", page, sentinel::NO_IMAGE_URL),
        })
    }

    fn parse_reply(&self, container: ElementRef<'_>, page: &Url) -> ThreadReply {
        let s = &self.selectors;

        let uuid = attr_or(container, "id", sentinel::NO_UUID);
        if uuid == sentinel::NO_UUID {
            warn!("Reply container without an id attribute");
        }

        let message = self.sanitizer.sanitize_optional(
            container
                .select(&s.reply_message)
                .next()
                .map(|message| message.inner_html())
                .as_deref(),
        );

        let date = container
            .select(&s.reply_date)
            .next()
            .map(|element| attr_or(element, &s.date_attribute, sentinel::NO_DATE))
            .unwrap_or_else(|| sentinel::NO_DATE.to_string());

        ThreadReply {
            uuid,
            message,
            thumbnail_url: linked_url(
                container,
                &s.reply_thumbnail,
                "src",
                page,
                sentinel::NO_THUMBNAIL_URL,
            ),
            file_url: linked_url(container, &s.reply_file_link, "href", page, sentinel::NO_FILE),
            date,
        }
    }
}

fn attr_or(element: ElementRef<'_>, attribute: &str, fallback: &str) -> String {
    element
        .value()
        .attr(attribute)
        .unwrap_or(fallback)
        .to_string()
}

/// Absolute URL from `attribute` of the first `selector` match under `scope`.
fn linked_url(
    scope: ElementRef<'_>,
    selector: &Selector,
    attribute: &str,
    page: &Url,
    fallback: &str,
) -> String {
    scope
        .select(selector)
        .next()
        .and_then(|element| element.value().attr(attribute))
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| absolutize(raw, page))
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_source_settings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const THREAD_PAGE: &str = include_str!("../../tests/fixtures/thread.html");

    fn parser(base: &str) -> ThreadParser {
        ThreadParser::new(
            SourceClient::new().unwrap(),
            Arc::new(test_source_settings(base)),
            Arc::new(Sanitizer::new()),
            &ThreadSelectors::default(),
        )
        .unwrap()
    }

    fn page() -> Url {
        Url::parse("https://boards.example.org/g/thread/99000003").unwrap()
    }

    #[test]
    fn parses_original_post() {
        let thread = parser("https://boards.example.org")
            .parse_thread("99000003", THREAD_PAGE, &page())
            .unwrap();
        let post = &thread.post;

        assert_eq!(post.uuid, "99000003");
        assert_eq!(post.date, "1700000300");
        assert_eq!(post.title, "Desktop thread");
        assert_eq!(post.file_url, "https://i.example.org/g/1700000300123.png");
        assert_eq!(
            post.cover_image_url,
            "https://i.example.org/g/1700000300123s.jpg"
        );
        assert_eq!(post.description, "post your desk<br>no phoneposting");
    }

    #[test]
    fn parses_replies_in_document_order() {
        let thread = parser("https://boards.example.org")
            .parse_thread("99000003", THREAD_PAGE, &page())
            .unwrap();

        let uuids: Vec<&str> = thread.replies.iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(uuids, ["pc99000010", "pc99000011", "no-uuid"]);

        let with_image = &thread.replies[0];
        assert_eq!(
            with_image.thumbnail_url,
            "https://i.example.org/g/1700000400111s.jpg"
        );
        assert_eq!(with_image.file_url, "https://i.example.org/g/1700000400111.jpg");
        assert_eq!(with_image.date, "1700000400");
    }

    #[test]
    fn reply_without_optional_parts_uses_sentinels() {
        let thread = parser("https://boards.example.org")
            .parse_thread("99000003", THREAD_PAGE, &page())
            .unwrap();

        let text_only = &thread.replies[1];
        assert_eq!(text_only.thumbnail_url, sentinel::NO_THUMBNAIL_URL);
        assert_eq!(text_only.file_url, sentinel::NO_FILE);
        assert!(!text_only.message.to_lowercase().contains("<script"));
        assert!(text_only.message.contains("<span>&gt;implying</span>"));

        let stripped = &thread.replies[2];
        assert_eq!(stripped.date, sentinel::NO_DATE);
        assert_eq!(stripped.message, "");
    }

    #[test]
    fn thread_without_replies_is_not_an_error() {
        let html = r#"<div class="thread"><div class="postContainer opContainer">
            <div class="postInfo desktop"><span class="dateTime" data-utc="1700000000">x</span></div>
            <blockquote class="postMessage">only op</blockquote></div></div>"#;

        let thread = parser("https://boards.example.org")
            .parse_thread("1", html, &page())
            .unwrap();

        assert!(thread.replies.is_empty());
        assert_eq!(thread.post.title, sentinel::NO_TITLE);
        assert_eq!(thread.post.file_url, sentinel::NO_FILE);
        assert_eq!(thread.post.cover_image_url, sentinel::NO_IMAGE_URL);
    }

    #[test]
    fn page_without_post_info_is_a_parse_error() {
        let err = parser("https://boards.example.org")
            .parse_thread("1", "<html><body>404 Not Found</body></html>", &page())
            .unwrap_err();

        assert!(matches!(err, CollectError::Parse { .. }));
    }

    #[tokio::test]
    async fn fetches_thread_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/g/thread/99000003"))
            .respond_with(ResponseTemplate::new(200).set_body_string(THREAD_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let thread = parser(&server.uri())
            .thread_content("g", "99000003")
            .await
            .unwrap();

        assert_eq!(thread.replies.len(), 3);
    }
}
