//! Storefront metadata source.
//!
//! [`MetadataSource`] is the seam between the pipeline and the storefront;
//! [`PlayStoreSource`] is the reqwest-backed implementation. HTTP status
//! handling and error classification live here; only a shallow field
//! extraction is performed on the returned markup (og tags and listing
//! anchors), deliberately not a full scraper.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::SourceError;
use crate::fetcher::Locale;
use crate::types::{AppMetadata, SearchEntry};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// One storefront retrieval operation.
///
/// Implementations classify failures via [`SourceError`]; retries and locale
/// fallback are the caller's concern.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the listing page of `package` in `locale` and extract metadata.
    async fn app_metadata(&self, package: &str, locale: &Locale)
    -> Result<AppMetadata, SourceError>;

    /// Search the storefront for `query`, returning up to `limit` ranked entries.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, SourceError>;

    /// List apps the storefront shows alongside `package`.
    async fn similar(&self, package: &str, limit: usize)
    -> Result<Vec<SearchEntry>, SourceError>;
}

/// reqwest-backed Play Store source.
pub struct PlayStoreSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PlayStoreSource {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url("https://play.google.com", timeout)
    }

    /// Point the source at a different base URL (tests, mirrors).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn get_page(&self, url: &str, package: &str) -> Result<String, SourceError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                SourceError::transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                package: package.to_string(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SourceError::transient(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::transient(e.to_string()))
    }
}

#[async_trait]
impl MetadataSource for PlayStoreSource {
    async fn app_metadata(
        &self,
        package: &str,
        locale: &Locale,
    ) -> Result<AppMetadata, SourceError> {
        let url = format!(
            "{}/store/apps/details?id={}&hl={}&gl={}",
            self.base_url,
            urlencoding::encode(package),
            locale.language,
            locale.country
        );
        debug!(package, locale = %locale, "fetching app listing");

        let html = self.get_page(&url, package).await?;
        let mut metadata = extract_listing(&html);
        if metadata.title.is_empty() {
            // A 200 without a usable listing is how the storefront answers
            // for unlisted packages in some regions.
            return Err(SourceError::NotFound {
                package: package.to_string(),
            });
        }
        metadata.package_name = package.to_string();
        metadata.locale = locale.to_string();
        Ok(metadata)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, SourceError> {
        let url = format!(
            "{}/store/search?q={}&c=apps",
            self.base_url,
            urlencoding::encode(query)
        );
        let html = self.get_page(&url, query).await?;
        Ok(extract_entries(&html, None, limit))
    }

    async fn similar(
        &self,
        package: &str,
        limit: usize,
    ) -> Result<Vec<SearchEntry>, SourceError> {
        let url = format!(
            "{}/store/apps/details?id={}",
            self.base_url,
            urlencoding::encode(package)
        );
        let html = self.get_page(&url, package).await?;
        Ok(extract_entries(&html, Some(package), limit))
    }
}

fn meta_content_re(property: &str) -> Regex {
    // <meta property="og:title" content="..."> with either attribute order.
    Regex::new(&format!(
        r#"<meta[^>]*(?:property|name)="{property}"[^>]*content="([^"]*)""#
    ))
    .expect("static meta regex")
}

fn extract_listing(html: &str) -> AppMetadata {
    static TITLE_RE: OnceLock<Regex> = OnceLock::new();
    static DESC_RE: OnceLock<Regex> = OnceLock::new();
    static GENRE_RE: OnceLock<Regex> = OnceLock::new();

    let title_re = TITLE_RE.get_or_init(|| meta_content_re("og:title"));
    let desc_re = DESC_RE.get_or_init(|| meta_content_re("og:description"));
    let genre_re = GENRE_RE.get_or_init(|| {
        Regex::new(r#"itemprop="genre"[^>]*>\s*<span[^>]*>([^<]+)"#).expect("static genre regex")
    });

    let capture = |re: &Regex| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };

    AppMetadata {
        title: capture(title_re)
            .trim_end_matches(" - Apps on Google Play")
            .to_string(),
        description: capture(desc_re),
        category: capture(genre_re),
        ..AppMetadata::default()
    }
}

fn extract_entries(html: &str, exclude: Option<&str>, limit: usize) -> Vec<SearchEntry> {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    let link_re = LINK_RE
        .get_or_init(|| Regex::new(r#"/store/apps/details\?id=([\w.]+)"#).expect("static link regex"));

    let mut seen = Vec::new();
    let mut entries = Vec::new();
    for capture in link_re.captures_iter(html) {
        let package = capture[1].to_string();
        if Some(package.as_str()) == exclude || seen.contains(&package) {
            continue;
        }
        seen.push(package.clone());
        entries.push(SearchEntry {
            rank: entries.len() as u32 + 1,
            package_name: package,
            ..SearchEntry::default()
        });
        if entries.len() >= limit {
            break;
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><head>
        <meta property="og:title" content="Example App - Apps on Google Play">
        <meta property="og:description" content="A handy example.">
        </head><body>
        <span itemprop="genre"><span>Tools</span></span>
        <a href="/store/apps/details?id=com.other.one">other</a>
        <a href="/store/apps/details?id=com.other.two">other2</a>
        <a href="/store/apps/details?id=com.other.one">dup</a>
        </body></html>"#;

    #[test]
    fn extracts_title_and_description() {
        let metadata = extract_listing(LISTING);
        assert_eq!(metadata.title, "Example App");
        assert_eq!(metadata.description, "A handy example.");
    }

    #[test]
    fn extracts_ranked_unique_entries() {
        let entries = extract_entries(LISTING, None, 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].package_name, "com.other.one");
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].rank, 2);
    }

    #[test]
    fn excludes_the_subject_package_and_honors_limit() {
        let entries = extract_entries(LISTING, Some("com.other.one"), 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package_name, "com.other.two");
    }

    #[test]
    fn empty_listing_yields_defaults() {
        let metadata = extract_listing("<html></html>");
        assert!(metadata.title.is_empty());
    }
}
