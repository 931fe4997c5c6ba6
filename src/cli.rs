//! Command-line interface definitions for Guardian EPUB.
//!
//! Flags override values from the optional YAML config, which in turn
//! overrides the built-in defaults. The API key can also come from the
//! environment or from the saved settings.

use crate::config::PipelineConfig;
use clap::Parser;
use itertools::Itertools;
use std::path::PathBuf;

/// Command-line arguments for the Guardian EPUB builder.
///
/// # Examples
///
/// ```sh
/// # Save the API key once
/// guardian_epub --set-api-key YOUR_KEY
///
/// # Build a book from three sections, in this order
/// guardian_epub -s news,sport,culture -o ~/Books
///
/// # Rebuild with the last saved sections
/// guardian_epub --no-select -o ~/Books
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Guardian Open Platform API key (defaults to the saved key)
    #[arg(short = 'k', long, env = "GUARDIAN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Comma-separated sections in reading order, e.g. `news,sport`
    #[arg(short, long, value_delimiter = ',')]
    pub sections: Vec<String>,

    /// Directory the EPUB and cover are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Fixed local timestamp for the run, e.g. `2024-03-15T09:05:00`
    #[arg(long, env = "GUARDIAN_DATE_OVERRIDE")]
    pub date_override: Option<String>,

    /// Directory holding the HTML and NCX table-of-contents templates
    #[arg(long)]
    pub templates_dir: Option<PathBuf>,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Skip section selection and use the saved sections
    #[arg(long, visible_alias = "noselect")]
    pub no_select: bool,

    /// Print the sections available to the API key and exit
    #[arg(long)]
    pub list_sections: bool,

    /// Save an API key to the settings directory and exit
    #[arg(long, value_name = "KEY")]
    pub set_api_key: Option<String>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            config.api_key = key.trim().to_string();
        }
        let sections: Vec<String> = self
            .sections
            .iter()
            .map(|section| section.trim())
            .filter(|section| !section.is_empty())
            .unique()
            .map(str::to_string)
            .collect();
        if !sections.is_empty() {
            config.sections = sections;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(date) = &self.date_override {
            config.date_override = Some(date.clone());
        }
        if let Some(dir) = &self.templates_dir {
            config.templates_dir = Some(dir.clone());
        }
    }
}
