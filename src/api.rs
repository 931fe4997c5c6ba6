//! Guardian content API client.
//!
//! The pipeline only needs two calls, both plain `GET`s authenticated with
//! an `api-key` query parameter:
//!
//! - `GET {base}/sections` lists the section ids available to the key
//! - `GET {base}/{section}?show-fields=all` returns the latest articles of
//!   one section, bodies and lead-image markup included
//!
//! # Architecture
//!
//! - [`ContentSource`]: what the pipeline fetches from; tests plug in fakes
//! - [`GuardianClient`]: the `reqwest` implementation against the live API
//!
//! Failures are returned, never retried.

use crate::error::SourceError;
use crate::models::Article;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Production API root.
pub const DEFAULT_API_BASE: &str = "https://content.guardianapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Supplier of articles grouped by section.
pub trait ContentSource {
    /// All section ids the source offers.
    async fn fetch_sections(&self) -> Result<Vec<String>, SourceError>;

    /// Articles of one section, in the order the source returns them.
    async fn fetch_section(&self, section_id: &str) -> Result<Vec<Article>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: ResultsPage<T>,
}

#[derive(Debug, Deserialize)]
struct ResultsPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SectionEntry {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    web_title: String,
    #[serde(default)]
    fields: ApiFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFields {
    #[serde(default)]
    body: String,
    #[serde(default)]
    byline: String,
    main: Option<String>,
    thumbnail: Option<String>,
    first_publication_date: Option<String>,
}

impl From<ApiArticle> for Article {
    fn from(api: ApiArticle) -> Self {
        let ApiArticle {
            web_url,
            web_title,
            fields,
        } = api;
        Article {
            web_url,
            web_title,
            byline: fields.byline,
            body: fields.body,
            main_image_html: fields.main.filter(|html| !html.trim().is_empty()),
            thumbnail_url: fields.thumbnail.filter(|url| !url.is_empty()),
            first_publication_date: fields.first_publication_date,
        }
    }
}

/// Shared HTTP client with the crate's user agent and timeout.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Client for the Guardian Open Platform content API.
#[derive(Debug, Clone)]
pub struct GuardianClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GuardianClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build `{base}/{path}` with the api key and any extra query pairs.
    ///
    /// `path` is percent-encoded as a single segment.
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, SourceError> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.base_url,
            urlencoding::encode(path)
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api-key", &self.api_key);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        // The key travels in the query string; keep it out of errors and logs.
        let display = format!("{}{}", url.origin().ascii_serialization(), url.path());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: display.clone(),
                source: source.without_url(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: display,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| SourceError::Http {
                url: display,
                source: source.without_url(),
            })
    }
}

impl ContentSource for GuardianClient {
    #[instrument(level = "info", skip_all)]
    async fn fetch_sections(&self) -> Result<Vec<String>, SourceError> {
        let url = self.endpoint("sections", &[])?;
        let envelope: Envelope<SectionEntry> = self.get_json(url).await?;
        let ids: Vec<String> = envelope
            .response
            .results
            .into_iter()
            .map(|section| section.id)
            .collect();
        info!(count = ids.len(), "Fetched section list");
        Ok(ids)
    }

    #[instrument(level = "info", skip(self))]
    async fn fetch_section(&self, section_id: &str) -> Result<Vec<Article>, SourceError> {
        let url = self.endpoint(section_id, &[("show-fields", "all")])?;
        let envelope: Envelope<ApiArticle> = self.get_json(url).await?;
        let articles: Vec<Article> = envelope
            .response
            .results
            .into_iter()
            .map(Article::from)
            .collect();
        for article in &articles {
            debug!(url = %article.web_url, title = %article.web_title, "Fetched article");
        }
        info!(count = articles.len(), "Fetched section articles");
        Ok(articles)
    }
}
