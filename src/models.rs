//! Data models for fetched articles and the EPUB manifest built from them.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`Article`]: one article as returned by the content API
//! - [`SectionGroup`]: the ordered articles fetched for one section
//! - [`ContentItem`]: one entry of the manifest handed to the packager
//! - [`CoverCandidate`]: a possible source image for the book cover
//! - [`RunResult`]: what a pipeline run reports back to its caller
//!
//! Everything here is created fresh for each run and dropped at its end.

use serde::{Deserialize, Serialize};

/// A single article as supplied by the content source.
///
/// Identity is `web_url`, which is unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Canonical URL of the article on the source site.
    pub web_url: String,
    /// Headline.
    pub web_title: String,
    /// Author line, possibly empty.
    pub byline: String,
    /// Article body as an HTML fragment.
    pub body: String,
    /// HTML fragment holding the lead image, usually a `<figure>`.
    pub main_image_html: Option<String>,
    /// Small preview image URL.
    pub thumbnail_url: Option<String>,
    /// ISO-8601 first publication timestamp, as sent by the API.
    pub first_publication_date: Option<String>,
}

/// The articles fetched for one section, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGroup {
    pub section_id: String,
    pub articles: Vec<Article>,
}

impl SectionGroup {
    pub fn new(section_id: impl Into<String>, articles: Vec<Article>) -> Self {
        Self {
            section_id: section_id.into(),
            articles,
        }
    }
}

/// A non-linked section heading in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHeaderItem {
    pub title: String,
    pub html_data: String,
}

/// One chapter of the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleItem {
    pub title: String,
    /// Article body with internal links already rewritten.
    pub html_data: String,
    pub author: String,
    /// Short display date such as `15 Mar`, or an ISO stamp as fallback.
    pub published_date_display: String,
    /// Chapter filename inside the package, e.g. `3_some-headline.xhtml`.
    pub filename: String,
}

/// An entry of the ordered manifest consumed by the packager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContentItem {
    SectionHeader(SectionHeaderItem),
    Article(ArticleItem),
}

impl ContentItem {
    pub fn title(&self) -> &str {
        match self {
            ContentItem::SectionHeader(header) => &header.title,
            ContentItem::Article(article) => &article.title,
        }
    }

    /// Section headers render inline but never get their own ToC entry.
    pub fn exclude_from_toc(&self) -> bool {
        matches!(self, ContentItem::SectionHeader(_))
    }

    pub fn as_article(&self) -> Option<&ArticleItem> {
        match self {
            ContentItem::Article(article) => Some(article),
            ContentItem::SectionHeader(_) => None,
        }
    }
}

/// A possible cover image found in an article's lead image markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverCandidate {
    pub url: String,
    pub caption: String,
    /// `width * height` from the markup, `0` when either is unknown.
    pub area: u64,
}

/// The image picked for the cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverSelection {
    pub url: String,
    pub caption: String,
}

/// What happened when fetching one section.
#[derive(Debug)]
pub struct SectionOutcome {
    pub section_id: String,
    pub result: Result<usize, String>,
}

impl SectionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// An article whose body could not be rewritten; the raw body was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleFailure {
    pub web_url: String,
    pub error: String,
}

/// Result of the fetch phase: the groups that loaded and a per-section record.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub groups: Vec<SectionGroup>,
    pub outcomes: Vec<SectionOutcome>,
}

impl FetchReport {
    pub fn total_articles(&self) -> usize {
        self.groups.iter().map(|group| group.articles.len()).sum()
    }

    pub fn failed_sections(&self) -> impl Iterator<Item = &SectionOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_ok())
    }
}

/// What a pipeline run reports back to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// `None` when nothing was fetched.
    pub epub_path: Option<std::path::PathBuf>,
    /// Local run date, `yyyy-MM-dd`.
    pub date_string: String,
    /// Local run time, `HHmm`.
    pub time_string: String,
    pub total_article_count: usize,
    pub used_sections: Vec<String>,
    #[serde(skip)]
    pub section_outcomes: Vec<SectionOutcome>,
    pub article_failures: Vec<ArticleFailure>,
}
