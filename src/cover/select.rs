//! Picking the cover photo.
//!
//! Looks through the lead-image markup of the run's articles, the `news`
//! section first and then every other section in order, and takes the first
//! image it finds. An article without a usable `<img>` can still contribute
//! its thumbnail. Finding nothing is normal and means a text-only cover.

use crate::models::{Article, CoverCandidate, CoverSelection, SectionGroup};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("valid selector"));
static FIGCAPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse("figcaption").expect("valid selector"));

/// Section searched before all others.
pub const PRIORITY_SECTION: &str = "news";

fn dimension(element: &ElementRef<'_>, names: [&str; 2]) -> f64 {
    names
        .iter()
        .filter_map(|name| element.value().attr(name))
        .filter_map(|raw| raw.trim().parse::<f64>().ok())
        .find(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(0.0)
}

fn figure_caption(img: &ElementRef<'_>) -> String {
    img.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "figure")
        .and_then(|figure| figure.select(&FIGCAPTION).next())
        .map(|caption| caption.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Extract every `<img>` with a `src` from a lead-image HTML fragment.
///
/// Width and height come from `width`/`height`, falling back to
/// `data-width`/`data-height`. The caption is the `figcaption` of the
/// nearest enclosing `figure`, or empty.
pub fn parse_image_candidates(html: &str) -> Vec<CoverCandidate> {
    if html.trim().is_empty() {
        return Vec::new();
    }

    let fragment = Html::parse_fragment(html);
    fragment
        .select(&IMG)
        .filter_map(|img| {
            let src = img.value().attr("src").filter(|src| !src.is_empty())?;
            let width = dimension(&img, ["width", "data-width"]);
            let height = dimension(&img, ["height", "data-height"]);
            let area = if width > 0.0 && height > 0.0 {
                (width * height) as u64
            } else {
                0
            };
            Some(CoverCandidate {
                url: src.to_string(),
                caption: figure_caption(&img),
                area,
            })
        })
        .collect()
}

fn article_candidate(article: &Article) -> Option<CoverCandidate> {
    let from_main = article
        .main_image_html
        .as_deref()
        .map(parse_image_candidates)
        .unwrap_or_default()
        .into_iter()
        .next();
    if from_main.is_some() {
        return from_main;
    }

    article
        .thumbnail_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .map(|url| CoverCandidate {
            url: url.to_string(),
            caption: String::new(),
            area: 0,
        })
}

/// Sections in the order they are searched for a cover image.
fn by_priority(groups: &[SectionGroup]) -> impl Iterator<Item = &SectionGroup> {
    let priority = groups
        .iter()
        .filter(|group| group.section_id == PRIORITY_SECTION);
    let rest = groups
        .iter()
        .filter(|group| group.section_id != PRIORITY_SECTION);
    priority.chain(rest)
}

/// Return the first usable cover image of the run, if any.
///
/// Candidates carry an `area`, but the rule is first found, not largest.
pub fn select_cover_image(groups: &[SectionGroup]) -> Option<CoverSelection> {
    for group in by_priority(groups) {
        for article in &group.articles {
            if let Some(candidate) = article_candidate(article) {
                info!(
                    section = %group.section_id,
                    url = %candidate.url,
                    area = candidate.area,
                    "Selected cover image"
                );
                return Some(CoverSelection {
                    url: candidate.url,
                    caption: candidate.caption,
                });
            }
        }
        debug!(section = %group.section_id, "No cover image in section");
    }
    info!("No cover image found; text cover will be used");
    None
}
