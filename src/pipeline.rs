//! The run: fetch every requested section, then build one EPUB.
//!
//! # Phases
//!
//! 1. **Fetching articles**: sections are fetched one after another in the
//!    caller's order. A failed section is reported and skipped.
//! 2. **Building the EPUB**: filename allocation, link rewriting and
//!    manifest assembly, cover selection and rendering, then packaging.
//!
//! The phases never overlap. Progress and errors are reported through
//! [`PipelineHooks`] as they happen; the returned [`RunResult`] records what
//! failed so callers do not have to parse logs.

use crate::api::{ContentSource, http_client};
use crate::config::PipelineConfig;
use crate::cover::{CoverKind, CoverRequest, create_cover_image, select_cover_image};
use crate::epub::{PackageRequest, allocate_filenames, assemble_manifest, package_epub};
use crate::error::PipelineError;
use crate::models::{ArticleFailure, FetchReport, RunResult, SectionGroup, SectionOutcome};
use crate::utils::{RunClock, ensure_writable_dir};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Coarse stage of a run, announced once when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FetchingArticles,
    BuildingEpub,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::FetchingArticles => f.write_str("fetchingArticles"),
            Phase::BuildingEpub => f.write_str("buildingEpub"),
        }
    }
}

/// One step of the fetch phase; `current` runs from 1 to `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Observer of a run. Every method defaults to doing nothing.
pub trait PipelineHooks {
    fn on_phase(&mut self, _phase: Phase) {}
    fn on_progress(&mut self, _progress: &Progress) {}
    fn on_log(&mut self, _message: &str) {}
    fn on_error(&mut self, _error: &str) {}
}

/// Hooks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl PipelineHooks for NoopHooks {}

/// Fetch `sections` in order, one progress event per section.
///
/// Failed sections are left out of the returned groups and recorded in
/// [`FetchReport::outcomes`].
#[instrument(level = "info", skip_all, fields(sections = sections.len()))]
pub async fn fetch_articles<S, H>(source: &S, sections: &[String], hooks: &mut H) -> FetchReport
where
    S: ContentSource,
    H: PipelineHooks + ?Sized,
{
    let mut report = FetchReport::default();
    let total = sections.len();

    let mut fetched = stream::iter(sections.iter().enumerate())
        .then(move |(index, section)| async move {
            let fetch = source.fetch_section(section).await;
            (index, section, fetch)
        })
        .boxed_local();

    while let Some((index, section, fetch)) = fetched.next().await {
        match fetch {
            Ok(articles) => {
                info!(%section, count = articles.len(), "Fetched section");
                report.outcomes.push(SectionOutcome {
                    section_id: section.clone(),
                    result: Ok(articles.len()),
                });
                report.groups.push(SectionGroup::new(section.as_str(), articles));
            }
            Err(e) => {
                error!(%section, error = %e, "Section fetch failed; skipping section");
                hooks.on_error(&format!("Failed to fetch section {section}: {e}"));
                report.outcomes.push(SectionOutcome {
                    section_id: section.clone(),
                    result: Err(e.to_string()),
                });
            }
        }

        hooks.on_progress(&Progress {
            current: index + 1,
            total,
            message: section.clone(),
        });
    }

    report
}

/// What the build phase produced.
#[derive(Debug)]
pub struct EpubBuild {
    pub epub_path: PathBuf,
    pub cover_path: PathBuf,
    pub cover: CoverKind,
    pub article_failures: Vec<ArticleFailure>,
}

/// Build the EPUB for `groups` into `config.output_dir`.
///
/// Allocates chapter filenames, assembles the manifest, renders the cover
/// and packages the book. Articles whose links could not be rewritten are
/// reported through `hooks.on_error` and carried in the result.
///
/// # Arguments
///
/// * `groups` - Fetched sections in reading order
/// * `config` - Output directory, templates, author and language
/// * `clock` - The run timestamp used for the filename, title and subtitle
/// * `client` - HTTP client used to download the cover photo
/// * `hooks` - Receives log lines and per-article errors
///
/// # Returns
///
/// The written EPUB and cover paths, which cover strategy was used and the
/// per-article rewrite failures.
///
/// # Errors
///
/// * [`PipelineError::OutputDir`] if the output directory is not writable
/// * [`PipelineError::Cover`] if not even the text cover could be written
/// * [`PipelineError::Package`] if a template is missing or the archive cannot be written
#[instrument(level = "info", skip_all, fields(sections = groups.len(), date = %clock.date_string()))]
pub async fn create_epub<H>(
    groups: &[SectionGroup],
    config: &PipelineConfig,
    clock: &RunClock,
    client: &reqwest::Client,
    hooks: &mut H,
) -> Result<EpubBuild, PipelineError>
where
    H: PipelineHooks + ?Sized,
{
    ensure_writable_dir(&config.output_dir)
        .await
        .map_err(|source| PipelineError::OutputDir {
            path: config.output_dir.clone(),
            source,
        })?;

    let map = allocate_filenames(groups);
    let manifest = assemble_manifest(groups, &map, &config.domain_marker);
    for failure in &manifest.failures {
        hooks.on_error(&format!(
            "Could not rewrite links in {}: {}",
            failure.web_url, failure.error
        ));
    }

    let date = clock.date_string();
    let time = clock.time_display();
    let title = format!("{} {date}:{time}", config.author);
    let subtitle = format!("{} {date}:{time}", clock.day_of_week());

    let selection = select_cover_image(groups);
    let cover_path = config.cover_path();
    let cover = create_cover_image(
        client,
        &CoverRequest {
            output: &cover_path,
            title: &config.author,
            subtitle: &subtitle,
            image: selection.as_ref(),
        },
    )
    .await?;
    if let CoverKind::Text {
        fallback_reason: Some(reason),
    } = &cover
    {
        hooks.on_log(&format!("Cover photo unavailable, using text cover: {reason}"));
    }

    let book_id = format!("urn:uuid:{}", Uuid::new_v4());
    let html_toc_template = config.html_toc_template();
    let ncx_toc_template = config.ncx_toc_template();
    let epub_path = config.output_dir.join(clock.epub_filename());
    hooks.on_log(&format!("Creating EPUB at {}", epub_path.display()));

    let request = PackageRequest {
        title: &title,
        author: &config.author,
        book_id: &book_id,
        lang: &config.lang,
        manifest: &manifest,
        cover_path: &cover_path,
        html_toc_template: &html_toc_template,
        ncx_toc_template: &ncx_toc_template,
    };
    let epub_path = package_epub(&request, &epub_path).await?;
    info!(path = %epub_path.display(), chapters = map.len(), "EPUB created");

    Ok(EpubBuild {
        epub_path,
        cover_path,
        cover,
        article_failures: manifest.failures,
    })
}

/// Run both phases for `config.sections`.
///
/// Fetches every section through `source`, then builds the book. Section
/// fetch failures are reported through `hooks.on_error` and recorded in
/// [`RunResult::section_outcomes`]; the run carries on without them.
///
/// # Arguments
///
/// * `config` - The run configuration; `sections` gives the reading order
/// * `source` - Supplies the articles of each section
/// * `hooks` - Receives phase, progress, log and error events
///
/// # Returns
///
/// The run summary. `epub_path` is `None` when no articles were fetched.
///
/// # Errors
///
/// * [`PipelineError::NoSections`] or [`PipelineError::MissingApiKey`], before any I/O
/// * Any error from [`create_epub`]
#[instrument(level = "info", skip_all, fields(sections = ?config.sections))]
pub async fn run_guardian_epub<S, H>(
    config: &PipelineConfig,
    source: &S,
    hooks: &mut H,
) -> Result<RunResult, PipelineError>
where
    S: ContentSource,
    H: PipelineHooks + ?Sized,
{
    if config.sections.is_empty() {
        return Err(PipelineError::NoSections);
    }
    if config.api_key.trim().is_empty() {
        return Err(PipelineError::MissingApiKey);
    }

    let clock = RunClock::new(config.date_override.as_deref());

    hooks.on_phase(Phase::FetchingArticles);
    let report = fetch_articles(source, &config.sections, hooks).await;
    let total_article_count = report.total_articles();
    let FetchReport { groups, outcomes } = report;

    let mut result = RunResult {
        epub_path: None,
        date_string: clock.date_string(),
        time_string: clock.time_string(),
        total_article_count,
        used_sections: config.sections.clone(),
        section_outcomes: outcomes,
        article_failures: Vec::new(),
    };

    if total_article_count == 0 {
        warn!("No articles fetched; skipping EPUB build");
        hooks.on_log("No articles fetched.");
        return Ok(result);
    }

    hooks.on_phase(Phase::BuildingEpub);
    let client = http_client();
    match create_epub(&groups, config, &clock, &client, hooks).await {
        Ok(build) => {
            result.epub_path = Some(build.epub_path);
            result.article_failures = build.article_failures;
            Ok(result)
        }
        Err(e) => {
            error!(error = %e, "EPUB build failed");
            hooks.on_error(&e.to_string());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::models::Article;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeSource {
        sections: HashMap<String, Vec<Article>>,
    }

    impl FakeSource {
        fn with(mut self, section: &str, articles: Vec<Article>) -> Self {
            self.sections.insert(section.to_string(), articles);
            self
        }
    }

    impl ContentSource for FakeSource {
        async fn fetch_sections(&self) -> Result<Vec<String>, SourceError> {
            Ok(self.sections.keys().cloned().collect())
        }

        async fn fetch_section(&self, section_id: &str) -> Result<Vec<Article>, SourceError> {
            self.sections
                .get(section_id)
                .cloned()
                .ok_or_else(|| SourceError::Status {
                    url: format!("https://content.example.com/{section_id}"),
                    status: 404,
                })
        }
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<Phase>,
        progress: Vec<Progress>,
        logs: Vec<String>,
        errors: Vec<String>,
    }

    impl PipelineHooks for Recorder {
        fn on_phase(&mut self, phase: Phase) {
            self.phases.push(phase);
        }
        fn on_progress(&mut self, progress: &Progress) {
            self.progress.push(progress.clone());
        }
        fn on_log(&mut self, message: &str) {
            self.logs.push(message.to_string());
        }
        fn on_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }
    }

    fn article(url: &str, title: &str) -> Article {
        Article {
            web_url: url.to_string(),
            web_title: title.to_string(),
            byline: "Staff".to_string(),
            body: "<p>Text</p>".to_string(),
            first_publication_date: Some("2024-03-15T08:00:00Z".to_string()),
            ..Default::default()
        }
    }

    fn config(output_dir: &std::path::Path, sections: &[&str]) -> PipelineConfig {
        PipelineConfig {
            api_key: "test-key".to_string(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
            output_dir: output_dir.to_path_buf(),
            date_override: Some("2024-03-15T09:05:00".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_sections_rejected_before_io() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("never-created");
        let mut hooks = Recorder::default();
        let err = run_guardian_epub(&config(&output, &[]), &FakeSource::default(), &mut hooks)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoSections));
        assert!(hooks.phases.is_empty());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_blank_api_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(tmp.path(), &["news"]);
        cfg.api_key = "  ".to_string();
        let err = run_guardian_epub(&cfg, &FakeSource::default(), &mut NoopHooks)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_fetch_progress_is_ordered_and_failures_skipped() {
        let source = FakeSource::default()
            .with("news", vec![article("https://www.theguardian.com/n/1", "One")])
            .with("sport", vec![article("https://www.theguardian.com/s/1", "Two")]);
        let sections: Vec<String> = ["news", "missing", "sport"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut hooks = Recorder::default();

        let report = fetch_articles(&source, &sections, &mut hooks).await;

        let currents: Vec<_> = hooks.progress.iter().map(|p| (p.current, p.total)).collect();
        assert_eq!(currents, vec![(1, 3), (2, 3), (3, 3)]);
        let messages: Vec<_> = hooks.progress.iter().map(|p| p.message.as_str()).collect();
        assert_eq!(messages, vec!["news", "missing", "sport"]);

        let ids: Vec<_> = report.groups.iter().map(|g| g.section_id.as_str()).collect();
        assert_eq!(ids, vec!["news", "sport"]);
        let failed: Vec<_> = report.failed_sections().map(|o| o.section_id.as_str()).collect();
        assert_eq!(failed, vec!["missing"]);
        assert_eq!(hooks.errors.len(), 1);
        assert!(hooks.errors[0].contains("missing"));
    }

    #[tokio::test]
    async fn test_no_articles_returns_result_without_epub() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default().with("news", vec![]);
        let mut hooks = Recorder::default();

        let result = run_guardian_epub(&config(tmp.path(), &["news"]), &source, &mut hooks)
            .await
            .unwrap();

        assert_eq!(result.epub_path, None);
        assert_eq!(result.total_article_count, 0);
        assert_eq!(result.used_sections, vec!["news"]);
        assert_eq!(result.date_string, "2024-03-15");
        assert_eq!(hooks.phases, vec![Phase::FetchingArticles]);
    }

    #[tokio::test]
    async fn test_full_run_writes_named_epub_and_cover() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FakeSource::default()
            .with("news", vec![article("https://www.theguardian.com/n/1", "Big news")])
            .with("sport", vec![article("https://www.theguardian.com/s/1", "Match")]);
        let mut hooks = Recorder::default();

        let result = run_guardian_epub(&config(tmp.path(), &["news", "sport"]), &source, &mut hooks)
            .await
            .unwrap();

        let epub = result.epub_path.unwrap();
        assert_eq!(epub, tmp.path().join("guardian-2024-03-15-0905.epub"));
        assert!(epub.exists());
        assert!(tmp.path().join("guardian-cover.jpg").exists());
        assert_eq!(result.time_string, "0905");
        assert_eq!(result.total_article_count, 2);
        assert_eq!(hooks.phases, vec![Phase::FetchingArticles, Phase::BuildingEpub]);
        assert!(hooks.logs.iter().any(|l| l.starts_with("Creating EPUB at")));
        assert!(hooks.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_template_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(&tmp.path().join("out"), &["news"]);
        cfg.templates_dir = Some(tmp.path().join("no-templates"));
        let source =
            FakeSource::default().with("news", vec![article("https://www.theguardian.com/n/1", "A")]);
        let mut hooks = Recorder::default();

        let err = run_guardian_epub(&cfg, &source, &mut hooks).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Package(crate::error::PackageError::TemplateMissing(_))
        ));
        assert_eq!(hooks.errors.len(), 1);
        assert!(!tmp.path().join("out/guardian-2024-03-15-0905.epub").exists());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::FetchingArticles.to_string(), "fetchingArticles");
        assert_eq!(Phase::BuildingEpub.to_string(), "buildingEpub");
    }
}
