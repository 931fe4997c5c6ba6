//! # Guardian EPUB
//!
//! Fetches the latest Guardian articles for a chosen, ordered list of
//! sections and bundles them into a single EPUB with a generated cover.
//!
//! ## Architecture
//!
//! A run is a two-phase pipeline (see [`pipeline`]):
//! 1. **Fetching**: one content API request per section, in reading order
//! 2. **Building**: chapter filenames, link localisation, manifest, cover
//!    art and finally the `.epub` container
//!
//! Everything a run needs comes in through [`config::PipelineConfig`];
//! progress is reported through [`pipeline::PipelineHooks`].

pub mod api;
pub mod cli;
pub mod config;
pub mod cover;
pub mod epub;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use api::{ContentSource, GuardianClient};
pub use config::{PipelineConfig, SettingsStore};
pub use error::PipelineError;
pub use models::{Article, ContentItem, RunResult, SectionGroup};
pub use pipeline::{NoopHooks, Phase, PipelineHooks, Progress, run_guardian_epub};
