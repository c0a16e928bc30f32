//! arXiv search and PDF download.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::fs;
use tracing::{debug, info};

use super::{Fetcher, Retriever};
use crate::domain::DocumentItem;

/// Public arXiv Atom API endpoint
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

static ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<entry>([\s\S]*?)</entry>").expect("valid entry regex"));

static AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<author>\s*<name>([\s\S]*?)</name>").expect("valid author regex")
});

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<link\s([^>]*?)/?>").expect("valid link regex"));

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).expect("valid href regex"));

/// Searches the arXiv Atom API by relevance
pub struct ArxivRetriever {
    api_url: String,
    client: reqwest::Client,
}

impl ArxivRetriever {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            api_url: ARXIV_API_URL.to_string(),
            client,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[async_trait]
impl Retriever for ArxivRetriever {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn retrieve(&self, query: &str, max_count: u32) -> Result<Vec<DocumentItem>> {
        info!(%query, max_count, "Searching arXiv");

        let search = format!("all:{}", query);
        let max_results = max_count.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", search.as_str()),
                ("max_results", max_results.as_str()),
                ("sortBy", "relevance"),
            ])
            .send()
            .await
            .context("arXiv search request failed")?
            .error_for_status()
            .context("arXiv search returned an error status")?;

        let feed = response.text().await.context("Failed to read arXiv feed")?;
        let mut items = parse_feed(&feed);
        items.truncate(max_count as usize);

        info!(found = items.len(), "arXiv search finished");
        Ok(items)
    }
}

/// Parse an Atom feed into document items
pub fn parse_feed(feed: &str) -> Vec<DocumentItem> {
    ENTRY
        .captures_iter(feed)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_entry(m.as_str()))
        .collect()
}

fn parse_entry(entry: &str) -> Option<DocumentItem> {
    let entry_id = tag(entry, "id")?;
    let id = entry_id.rsplit('/').next()?.to_string();

    let authors = AUTHOR
        .captures_iter(entry)
        .filter_map(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .collect();

    let pdf_url = LINK
        .captures_iter(entry)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|attrs| attrs.contains(r#"title="pdf""#))
        .and_then(|attrs| HREF.captures(attrs))
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .or_else(|| Some(entry_id.replacen("/abs/", "/pdf/", 1)));

    Some(DocumentItem {
        id,
        title: clean_text(&tag(entry, "title").unwrap_or_default()),
        authors,
        summary: clean_text(&tag(entry, "summary").unwrap_or_default()),
        published: tag(entry, "published").unwrap_or_default(),
        source_url: pdf_url,
        local_handle: None,
        content_extracted: false,
    })
}

/// Text content of the first `<name>...</name>` element
fn tag(entry: &str, name: &str) -> Option<String> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = entry.find(&open)? + open.len();
    let end = entry[start..].find(&close)? + start;
    Some(entry[start..end].trim().to_string())
}

fn clean_text(raw: &str) -> String {
    unescape(&raw.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Downloads document PDFs into a local cache directory
pub struct PdfFetcher {
    pdf_dir: PathBuf,
    client: reqwest::Client,
}

impl PdfFetcher {
    pub fn new(client: reqwest::Client, pdf_dir: PathBuf) -> Self {
        Self { pdf_dir, client }
    }

    /// Cache path for a document id
    pub fn cache_path(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.pdf_dir.join(format!("{}.pdf", safe))
    }

    /// Cached PDF for a document id, if it was downloaded before
    pub fn cached(&self, id: &str) -> Option<PathBuf> {
        let path = self.cache_path(id);
        path.is_file().then_some(path)
    }
}

#[async_trait]
impl Fetcher for PdfFetcher {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn fetch(&self, item: &DocumentItem, timeout: Duration) -> Result<PathBuf> {
        let path = self.cache_path(&item.id);

        if path.exists() {
            debug!(document = %item.id, "PDF already cached");
            return Ok(path);
        }

        let url = item
            .source_url
            .as_deref()
            .with_context(|| format!("Document {} has no source URL", item.id))?;

        info!(document = %item.id, title = %item.title, "Downloading PDF");

        let bytes = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?
            .error_for_status()
            .with_context(|| format!("Download of {} returned an error status", url))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        fs::create_dir_all(&self.pdf_dir)
            .await
            .with_context(|| format!("Failed to create PDF directory: {}", self.pdf_dir.display()))?;
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write PDF: {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <published>2021-01-01T00:00:00Z</published>
    <title>Fast
      Schedulers &amp; You</title>
    <summary>  A study of
  cooperative scheduling.
    </summary>
    <author>
      <name>Ada Lovelace</name>
    </author>
    <author>
      <name>Alan Turing</name>
    </author>
    <link href="http://arxiv.org/abs/2101.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v2" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2102.00002v1</id>
    <published>2021-02-02T00:00:00Z</published>
    <title>No pdf link</title>
    <summary>Short.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let items = parse_feed(FEED);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.id, "2101.00001v2");
        assert_eq!(first.title, "Fast Schedulers & You");
        assert_eq!(first.summary, "A study of cooperative scheduling.");
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.published, "2021-01-01T00:00:00Z");
        assert_eq!(
            first.source_url.as_deref(),
            Some("http://arxiv.org/pdf/2101.00001v2")
        );
        assert!(first.local_handle.is_none());
    }

    #[test]
    fn test_pdf_url_derived_from_id() {
        let items = parse_feed(FEED);
        assert_eq!(
            items[1].source_url.as_deref(),
            Some("http://arxiv.org/pdf/2102.00002v1")
        );
        assert!(items[1].authors.is_empty());
    }

    #[test]
    fn test_feed_title_is_not_an_entry() {
        assert!(parse_feed("<feed><title>Nothing</title></feed>").is_empty());
    }

    #[test]
    fn test_cache_path_is_sanitized() {
        let fetcher = PdfFetcher::new(reqwest::Client::new(), PathBuf::from("/tmp/pdfs"));
        assert_eq!(
            fetcher.cache_path("hep-th/9901001v1"),
            PathBuf::from("/tmp/pdfs/hep-th_9901001v1.pdf")
        );
    }

    #[tokio::test]
    async fn test_fetch_without_url_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = PdfFetcher::new(reqwest::Client::new(), temp.path().to_path_buf());
        let item = DocumentItem::placeholder("x");

        let result = fetcher.fetch(&item, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_cached_only_after_download() {
        let temp = tempfile::TempDir::new().unwrap();
        let fetcher = PdfFetcher::new(reqwest::Client::new(), temp.path().to_path_buf());
        assert!(fetcher.cached("2101.00001v2").is_none());

        let path = fetcher.cache_path("2101.00001v2");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert_eq!(fetcher.cached("2101.00001v2"), Some(path));
    }
}
