//! Manifest assembly.
//!
//! Turns the ordered section groups into the ordered list of
//! [`ContentItem`]s the packager consumes: one non-linked header per
//! section, followed by that section's articles in source order.

use crate::epub::filenames::UrlToFileMap;
use crate::epub::links::{LinkRewriter, RewrittenBody, xml_chars};
use crate::error::RewriteError;
use crate::models::{ArticleFailure, ArticleItem, ContentItem, SectionGroup, SectionHeaderItem};
use crate::utils::{format_publish_date, truncate_for_log};
use quick_xml::escape::partial_escape;
use scraper::Html;
use tracing::{debug, info, instrument, warn};

/// The assembled reading order of the book.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Headers interleaved with articles, in reading order.
    pub items: Vec<ContentItem>,
    /// Articles whose body could not be rewritten and went in as plain text.
    pub failures: Vec<ArticleFailure>,
}

impl Manifest {
    /// Articles only, section-major and article-minor.
    pub fn articles(&self) -> impl Iterator<Item = &ArticleItem> {
        self.items.iter().filter_map(ContentItem::as_article)
    }

    pub fn section_titles(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            ContentItem::SectionHeader(header) => Some(header.title.as_str()),
            ContentItem::Article(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Heading shown where a section starts.
pub fn section_header(section_id: &str) -> SectionHeaderItem {
    let title = section_id.to_uppercase();
    let html_data = format!(
        r#"<h2 style="font-weight:bold;">{}</h2>"#,
        partial_escape(title.as_str())
    );
    SectionHeaderItem { title, html_data }
}

/// Plain-text rendering of a body whose markup could not be rewritten.
pub fn plain_text_body(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    let text: String = fragment.root_element().text().collect();
    format!("<p>{}</p>", partial_escape(&*xml_chars(text.trim())))
}

/// Build the manifest in caller-chosen section order.
///
/// `map` must come from [`crate::epub::filenames::allocate_filenames`] over
/// the same `groups`; filenames are taken positionally from it. A body that
/// fails to rewrite goes in as plain text and is recorded in
/// [`Manifest::failures`].
pub fn assemble_manifest(
    groups: &[SectionGroup],
    map: &UrlToFileMap,
    domain_marker: &str,
) -> Manifest {
    let rewriter = LinkRewriter::new(map, domain_marker);
    assemble_manifest_with(groups, map, |body| rewriter.rewrite(body))
}

/// [`assemble_manifest`] with the body rewriter supplied by the caller.
#[instrument(level = "info", skip_all, fields(sections = groups.len()))]
pub fn assemble_manifest_with<F>(
    groups: &[SectionGroup],
    map: &UrlToFileMap,
    mut rewrite: F,
) -> Manifest
where
    F: FnMut(&str) -> Result<RewrittenBody, RewriteError>,
{
    let mut filenames = map.ordered().iter();
    let mut manifest = Manifest::default();

    for group in groups {
        manifest
            .items
            .push(ContentItem::SectionHeader(section_header(&group.section_id)));

        for article in &group.articles {
            let Some(filename) = filenames.next() else {
                warn!(url = %article.web_url, "No chapter filename allocated; skipping article");
                continue;
            };

            let html_data = match rewrite(&article.body) {
                Ok(body) => body.html,
                Err(e) => {
                    warn!(
                        url = %article.web_url,
                        error = %e,
                        body_preview = %truncate_for_log(&article.body, 200),
                        "Link rewrite failed; using plain text body"
                    );
                    manifest.failures.push(ArticleFailure {
                        web_url: article.web_url.clone(),
                        error: e.to_string(),
                    });
                    plain_text_body(&article.body)
                }
            };

            let published_date_display =
                format_publish_date(article.first_publication_date.as_deref());
            debug!(%filename, date = %published_date_display, "Added chapter");

            manifest.items.push(ContentItem::Article(ArticleItem {
                title: article.web_title.clone(),
                html_data,
                author: article.byline.clone(),
                published_date_display,
                filename: filename.clone(),
            }));
        }
    }

    info!(
        items = manifest.items.len(),
        failures = manifest.failures.len(),
        "Assembled manifest"
    );
    manifest
}
