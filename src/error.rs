//! Error types for each layer of the pipeline.
//!
//! Only [`PipelineError`] ever escapes [`crate::pipeline::run_guardian_epub`].
//! Source, rewrite and cover errors are recovered where they happen and
//! end up in the structured run result or the hook stream.

use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the content API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("content API returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("invalid content API url: {0}")]
    Url(#[from] url::ParseError),
}

/// Failure rewriting a single article body.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("rewritten article body is not well-formed XML: {0}")]
    Malformed(String),
}

/// Failure producing the cover. Photo failures are recovered by falling
/// back to the text-only cover; only a failed text cover is fatal.
#[derive(Debug, Error)]
pub enum CoverError {
    #[error("failed to fetch cover image {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cover image {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("cover image source {0} is not an http(s) or file URL")]
    UnsupportedSource(String),

    #[error("failed to decode or encode cover image: {0}")]
    Image(#[from] image::ImageError),

    #[error("cover I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure writing the EPUB container. Fatal for the run.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("table of contents template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("cover image not readable at {}: {source}", path.display())]
    Cover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("EPUB I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure loading or saving configuration and settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHome,

    #[error("settings I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Run-level failure: invalid input or a packaging error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("run requires at least one section")]
    NoSections,

    #[error("run requires an API key")]
    MissingApiKey,

    #[error("output directory {} is not usable: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write cover image: {0}")]
    Cover(#[from] CoverError),

    #[error(transparent)]
    Package(#[from] PackageError),
}
