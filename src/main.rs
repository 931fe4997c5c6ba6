//! # Guardian EPUB
//!
//! Command-line front end: resolves configuration from flags, an optional
//! YAML file and the saved settings, then runs the pipeline and reports
//! where the book was written.
//!
//! ## Usage
//!
//! ```sh
//! guardian_epub --set-api-key YOUR_KEY
//! guardian_epub -s news,sport,culture -o ~/Books
//! ```

use clap::Parser;
use guardian_epub::api::{ContentSource, GuardianClient, http_client};
use guardian_epub::cli::Cli;
use guardian_epub::config::{PipelineConfig, SettingsStore, order_by_preference};
use guardian_epub::pipeline::{Phase, PipelineHooks, Progress, run_guardian_epub};
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

/// Forwards pipeline events to the tracing log.
struct LogHooks;

impl PipelineHooks for LogHooks {
    fn on_phase(&mut self, phase: Phase) {
        info!(%phase, "Phase started");
    }

    fn on_progress(&mut self, progress: &Progress) {
        info!(
            current = progress.current,
            total = progress.total,
            section = %progress.message,
            "Section done"
        );
    }

    fn on_log(&mut self, message: &str) {
        info!("{message}");
    }

    fn on_error(&mut self, error: &str) {
        warn!("{error}");
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args.sections, ?args.output_dir, no_select = args.no_select, "Parsed CLI arguments");

    let store = SettingsStore::in_home()?;

    if let Some(key) = args.set_api_key.as_deref() {
        store.save_api_key(key.trim()).await?;
        println!("API key saved to {}", store.dir().display());
        return Ok(());
    }

    // ---- Resolve configuration: defaults < YAML < flags; saved settings fill gaps ----
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_yaml_file(path).await?,
        None => PipelineConfig::default(),
    };
    args.apply(&mut config);

    if config.api_key.is_empty() {
        match store.load_api_key().await? {
            Some(key) => config.api_key = key,
            None => {
                error!(
                    dir = %store.dir().display(),
                    "No API key; pass --api-key, set GUARDIAN_API_KEY or run --set-api-key"
                );
                return Err("missing Guardian API key".into());
            }
        }
    }

    let saved_sections = store.load_sections().await?;
    let client = GuardianClient::new(http_client(), &config.api_base_url, &config.api_key);

    if args.list_sections {
        let available = client.fetch_sections().await?;
        for section in order_by_preference(&available, &saved_sections) {
            let marker = if saved_sections.contains(&section) { "*" } else { " " };
            println!("{marker} {section}");
        }
        return Ok(());
    }

    if args.no_select || config.sections.is_empty() {
        info!(sections = ?saved_sections, "Using saved sections");
        config.sections = saved_sections;
    } else {
        store.save_sections(&config.sections).await?;
    }

    let result = run_guardian_epub(&config, &client, &mut LogHooks).await?;

    for outcome in result.section_outcomes.iter().filter(|o| !o.is_ok()) {
        warn!(section = %outcome.section_id, "Section was skipped");
    }
    match &result.epub_path {
        Some(path) => {
            info!(
                path = %path.display(),
                articles = result.total_article_count,
                "EPUB file created successfully"
            );
            println!("{}", path.display());
        }
        None => warn!("No articles fetched; no EPUB written"),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
