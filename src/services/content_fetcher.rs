use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::FetchResult;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Regions tried in order for the article body.
const CONTENT_REGIONS: &[&str] = &["main", "article", "div.content", "body"];

/// Preview image meta tags, first match wins.
const IMAGE_META_TAGS: &[&str] = &[
    r#"meta[property="og:image"]"#,
    r#"meta[property="twitter:image"]"#,
    r#"meta[name="og:image"]"#,
    r#"meta[name="twitter:image"]"#,
    r#"meta[itemprop="image"]"#,
];

static CONTENT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| selectors(CONTENT_REGIONS));
static IMAGE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| selectors(IMAGE_META_TAGS));

fn selectors(css: &[&str]) -> Vec<Selector> {
    css.iter()
        .map(|css| Selector::parse(css).expect("valid selector"))
        .collect()
}

/// Best-effort page scraping. Implementations never fail: anything that goes
/// wrong yields an absent field.
#[async_trait]
pub trait ContentFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_html(&self, article_url: &str) -> Option<String> {
        let url = Url::parse(article_url).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            tracing::debug!("Not an HTTP(S) URL, skip fetch: {}", article_url);
            return None;
        }

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Error accessing {}: {}", article_url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Error accessing {}, status code {}", article_url, response.status());
            return None;
        }

        match response.text().await {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::warn!("Failed to read body of {}: {}", article_url, e);
                None
            }
        }
    }
}

#[async_trait]
impl ContentFetch for ContentFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        let Some(html) = self.fetch_html(url).await else {
            return FetchResult::absent();
        };

        let result = FetchResult {
            main_text: extract_main_text(&html),
            preview_image_url: extract_preview_image(&html),
        };
        if result.preview_image_url.is_none() {
            tracing::debug!("No OGP image found for {}", url);
        }
        result
    }
}

/// Text of the first matching content region, converted with html2text.
pub fn extract_main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let region = CONTENT_SELECTORS
        .iter()
        .find_map(|sel| document.select(sel).next())?;

    let text = match html2text::from_read(region.html().as_bytes(), 80) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    // Clean up the text - remove excessive whitespace
    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn extract_preview_image(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    IMAGE_SELECTORS.iter().find_map(|sel| {
        document
            .select(sel)
            .filter_map(|meta| meta.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(decode_url)
    })
}

fn decode_url(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::debug!("Error decoding URL {}: {}", raw, e);
            raw.to_string()
        }
    }
}
