//! Outbound GET requests to the source site dressed up as a desktop browser.
//!
//! Plain mode only attaches realistic browser headers. Impersonating mode
//! additionally negotiates TLS with a browser-shaped cipher suite, key
//! exchange group and ALPN order so handshake-based filters see a browser.
//! This client never retries; a non-2xx response comes back as
//! [`CollectError::Fetch`] and the caller decides what to do.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, redirect};
use rustls::crypto::{CryptoProvider, ring};
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info};

use crate::error::{CollectError, Result};

const CHROME_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";
const FIREFOX_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:137.0) Gecko/20100101 Firefox/137.0";
const BROWSER_REFERER: &str = "https://boards.4chan.org/b/catalog";

/// Browser whose TLS handshake shape gets imitated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsProfile {
    Chrome,
    Firefox,
}

impl TlsProfile {
    pub const ALL: [TlsProfile; 2] = [TlsProfile::Chrome, TlsProfile::Firefox];

    fn crypto_provider(self) -> CryptoProvider {
        use ring::cipher_suite::*;
        use ring::kx_group::{SECP256R1, SECP384R1, X25519};

        let cipher_suites = match self {
            Self::Chrome => vec![
                TLS13_AES_128_GCM_SHA256,
                TLS13_AES_256_GCM_SHA384,
                TLS13_CHACHA20_POLY1305_SHA256,
                TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
                TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
                TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
                TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
            ],
            Self::Firefox => vec![
                TLS13_AES_128_GCM_SHA256,
                TLS13_CHACHA20_POLY1305_SHA256,
                TLS13_AES_256_GCM_SHA384,
                TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
                TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
                TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
                TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            ],
        };

        CryptoProvider {
            cipher_suites,
            kx_groups: vec![X25519, SECP256R1, SECP384R1],
            ..ring::default_provider()
        }
    }

    fn tls_config(self) -> Result<ClientConfig> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = ClientConfig::builder_with_provider(Arc::new(self.crypto_provider()))
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| CollectError::Config(format!("unusable TLS profile {self:?}: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(config)
    }

    fn user_agent(self) -> &'static str {
        match self {
            Self::Chrome => CHROME_USER_AGENT,
            Self::Firefox => FIREFOX_USER_AGENT,
        }
    }
}

/// Per-request switches for [`SourceClient::fetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub spoof_user_agent: bool,
    pub follow_redirects: bool,
    pub impersonate: Option<TlsProfile>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            spoof_user_agent: true,
            follow_redirects: true,
            impersonate: None,
        }
    }
}

impl FetchOptions {
    pub fn impersonating(profile: TlsProfile) -> Self {
        Self {
            impersonate: Some(profile),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub body: Bytes,
    pub status: u16,
    pub content_type: Option<String>,
}

impl FetchedResource {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Browser header set for the given profile, Chrome-shaped when none is set.
pub fn browser_headers(profile: Option<TlsProfile>) -> HeaderMap {
    let profile = profile.unwrap_or(TlsProfile::Chrome);

    let mut pairs: Vec<(&'static str, &'static str)> = vec![
        (
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("priority", "u=0, i"),
        ("referer", BROWSER_REFERER),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "same-origin"),
        ("sec-fetch-user", "?1"),
        ("upgrade-insecure-requests", "1"),
        ("user-agent", profile.user_agent()),
    ];

    if profile == TlsProfile::Chrome {
        pairs.extend([
            (
                "sec-ch-ua",
                "\"Brave\";v=\"135\", \"Not-A.Brand\";v=\"8\", \"Chromium\";v=\"135\"",
            ),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Linux\""),
            ("sec-gpc", "1"),
        ]);
    }

    pairs
        .into_iter()
        .map(|(name, value)| {
            (
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect()
}

type ClientKey = (bool, Option<TlsProfile>);

/// Reusable clients, one per redirect policy and TLS profile
#[derive(Clone)]
pub struct SourceClient {
    clients: Arc<HashMap<ClientKey, Client>>,
}

impl SourceClient {
    pub fn new() -> Result<Self> {
        let mut clients = HashMap::new();

        for follow_redirects in [true, false] {
            clients.insert(
                (follow_redirects, None),
                base_builder(follow_redirects).build()?,
            );

            for profile in TlsProfile::ALL {
                let client = base_builder(follow_redirects)
                    .use_preconfigured_tls(profile.tls_config()?)
                    .build()?;
                clients.insert((follow_redirects, Some(profile)), client);
            }
        }

        info!("Source client ready with {} configurations", clients.len());

        Ok(Self {
            clients: Arc::new(clients),
        })
    }

    /// Issues a single GET; any non-2xx status becomes a fetch error.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<FetchedResource> {
        let client = self
            .clients
            .get(&(options.follow_redirects, options.impersonate))
            .ok_or_else(|| CollectError::Config(format!("no client for {options:?}")))?;

        debug!("Requesting {url} with {options:?}");

        let mut request = client.get(url);
        if options.spoof_user_agent {
            request = request.headers(browser_headers(options.impersonate));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(CollectError::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(FetchedResource {
            body,
            status: status.as_u16(),
            content_type,
        })
    }
}

fn base_builder(follow_redirects: bool) -> reqwest::ClientBuilder {
    let policy = if follow_redirects {
        redirect::Policy::default()
    } else {
        redirect::Policy::none()
    };

    Client::builder().redirect(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    /// Compares a header's full value. User agents contain commas, which the
    /// stock header matcher treats as value separators.
    struct WholeHeader(&'static str, &'static str);

    impl Match for WholeHeader {
        fn matches(&self, request: &Request) -> bool {
            request
                .headers
                .get(self.0)
                .and_then(|value| value.to_str().ok())
                == Some(self.1)
        }
    }

    #[test]
    fn firefox_profile_sends_no_client_hints() {
        let chrome = browser_headers(Some(TlsProfile::Chrome));
        let firefox = browser_headers(Some(TlsProfile::Firefox));

        assert!(chrome.contains_key("sec-ch-ua"));
        assert!(!firefox.contains_key("sec-ch-ua"));
        assert_eq!(firefox["user-agent"], FIREFOX_USER_AGENT);
    }

    #[test]
    fn every_profile_sends_a_referer() {
        for profile in [None, Some(TlsProfile::Chrome), Some(TlsProfile::Firefox)] {
            assert_eq!(browser_headers(profile)["referer"], BROWSER_REFERER);
        }
    }

    #[test]
    fn every_profile_builds_a_tls_config() {
        for profile in TlsProfile::ALL {
            let config = profile.tls_config().unwrap();
            assert_eq!(config.alpn_protocols[0], b"h2".to_vec());
        }
    }

    #[tokio::test]
    async fn spoofed_request_carries_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(WholeHeader("user-agent", CHROME_USER_AGENT))
            .and(header("referer", BROWSER_REFERER))
            .and(header_exists("sec-fetch-mode"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SourceClient::new().unwrap();
        let fetched = client
            .fetch(&format!("{}/page", server.uri()), FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.content_type.as_deref(), Some("image/png"));
        assert_eq!(fetched.body.as_ref(), &[1u8, 2, 3]);
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SourceClient::new().unwrap();
        let err = client
            .fetch(&format!("{}/gone", server.uri()), FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CollectError::Fetch { status: 404, .. }));
    }

    #[tokio::test]
    async fn redirects_are_not_followed_when_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/elsewhere"),
            )
            .mount(&server)
            .await;

        let client = SourceClient::new().unwrap();
        let options = FetchOptions {
            follow_redirects: false,
            ..FetchOptions::default()
        };
        let err = client
            .fetch(&format!("{}/moved", server.uri()), options)
            .await
            .unwrap_err();

        assert!(matches!(err, CollectError::Fetch { status: 302, .. }));
    }
}
