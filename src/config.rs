//! Run configuration and persisted user settings.
//!
//! [`PipelineConfig`] is the single explicit input of a pipeline run. It is
//! built from defaults, optionally overlaid by a YAML file, and finally by
//! command-line flags (see [`crate::cli::Cli::apply`]).
//!
//! [`SettingsStore`] remembers the API key and the last chosen section order
//! between runs, in `~/.guardianEpub/`:
//!
//! ```text
//! ~/.guardianEpub/
//! ├── guardian-open-platform-key.json   {"API_KEY": "..."}
//! └── settings.json                     {"sections": ["news", "sport"], ...}
//! ```

use crate::api::DEFAULT_API_BASE;
use crate::epub::package::{BUILTIN_HTML_TOC, BUILTIN_NCX_TOC, TemplateSource};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Hrefs containing this are candidates for local rewriting.
pub const DEFAULT_DOMAIN_MARKER: &str = "theguardian.com";
pub const DEFAULT_AUTHOR: &str = "The Guardian";
pub const DEFAULT_LANG: &str = "en";

pub const HTML_TOC_TEMPLATE: &str = "guardian-toc-html.tmpl";
pub const NCX_TOC_TEMPLATE: &str = "guardian-toc-ncx.tmpl";
pub const COVER_FILENAME: &str = "guardian-cover.jpg";

pub const SETTINGS_DIR: &str = ".guardianEpub";
pub const API_KEY_FILE: &str = "guardian-open-platform-key.json";
pub const SETTINGS_FILE: &str = "settings.json";

/// Everything one run needs. Passed by reference into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api_key: String,
    /// Sections to fetch, in reading order.
    pub sections: Vec<String>,
    pub output_dir: PathBuf,
    /// Fixed local timestamp for reproducible filenames and titles.
    pub date_override: Option<String>,
    /// Directory with replacement ToC templates; the built-in pair is used
    /// when unset.
    pub templates_dir: Option<PathBuf>,
    pub domain_marker: String,
    pub api_base_url: String,
    pub author: String,
    pub lang: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sections: Vec::new(),
            output_dir: PathBuf::from("."),
            date_override: None,
            templates_dir: None,
            domain_marker: DEFAULT_DOMAIN_MARKER.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            lang: DEFAULT_LANG.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load a YAML config; keys it omits keep their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml_str(&raw)?;
        info!(sections = config.sections.len(), "Loaded YAML configuration");
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn html_toc_template(&self) -> TemplateSource {
        match &self.templates_dir {
            Some(dir) => TemplateSource::File(dir.join(HTML_TOC_TEMPLATE)),
            None => TemplateSource::Builtin(BUILTIN_HTML_TOC),
        }
    }

    pub fn ncx_toc_template(&self) -> TemplateSource {
        match &self.templates_dir {
            Some(dir) => TemplateSource::File(dir.join(NCX_TOC_TEMPLATE)),
            None => TemplateSource::Builtin(BUILTIN_NCX_TOC),
        }
    }

    pub fn cover_path(&self) -> PathBuf {
        self.output_dir.join(COVER_FILENAME)
    }
}

/// Order `chosen` so that sections found in `preferred` come first, in
/// `preferred` order, followed by the rest in their original order.
/// Duplicates in `chosen` are dropped.
pub fn order_by_preference(chosen: &[String], preferred: &[String]) -> Vec<String> {
    use itertools::Itertools;

    let rank: HashMap<&str, usize> = preferred
        .iter()
        .enumerate()
        .rev()
        .map(|(i, section)| (section.as_str(), i))
        .collect();

    let (mut known, unknown): (Vec<&String>, Vec<&String>) = chosen
        .iter()
        .unique()
        .partition(|section| rank.contains_key(section.as_str()));
    known.sort_by_key(|section| rank[section.as_str()]);

    known.into_iter().chain(unknown).cloned().collect()
}

/// The settings directory under the user's home.
pub fn default_settings_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(SETTINGS_DIR))
        .ok_or(ConfigError::NoHome)
}

#[derive(Debug, Deserialize, Serialize)]
struct ApiKeyFile {
    #[serde(rename = "API_KEY")]
    api_key: Option<String>,
}

/// Persisted API key and section preferences.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `~/.guardianEpub`.
    pub fn in_home() -> Result<Self, ConfigError> {
        default_settings_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn api_key_path(&self) -> PathBuf {
        self.dir.join(API_KEY_FILE)
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    async fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    /// Read a file, treating "not found" as `None`.
    async fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
        match fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn write(path: &Path, contents: String) -> Result<(), ConfigError> {
        fs::write(path, contents)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub async fn load_api_key(&self) -> Result<Option<String>, ConfigError> {
        let Some(raw) = Self::read_optional(&self.api_key_path()).await? else {
            debug!(dir = %self.dir.display(), "No saved API key");
            return Ok(None);
        };
        let file: ApiKeyFile = serde_json::from_str(&raw)?;
        Ok(file.api_key.filter(|key| !key.trim().is_empty()))
    }

    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    pub async fn save_api_key(&self, api_key: &str) -> Result<(), ConfigError> {
        self.ensure_dir().await?;
        let file = ApiKeyFile {
            api_key: Some(api_key.to_string()),
        };
        Self::write(&self.api_key_path(), serde_json::to_string(&file)?).await?;
        info!("Saved API key");
        Ok(())
    }

    /// Current settings object. A missing or corrupt file reads as empty.
    async fn load_settings(&self) -> Result<Map<String, Value>, ConfigError> {
        let path = self.settings_path();
        let Some(raw) = Self::read_optional(&path).await? else {
            return Ok(Map::new());
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                warn!(path = %path.display(), "Settings file is not a JSON object; ignoring it");
                Ok(Map::new())
            }
        }
    }

    /// Saved section order, empty when nothing has been saved yet.
    pub async fn load_sections(&self) -> Result<Vec<String>, ConfigError> {
        let settings = self.load_settings().await?;
        let sections = settings
            .get("sections")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(sections)
    }

    /// Replace the saved section order, keeping every other setting.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display(), count = sections.len()))]
    pub async fn save_sections(&self, sections: &[String]) -> Result<(), ConfigError> {
        self.ensure_dir().await?;
        let mut settings = self.load_settings().await?;
        settings.insert("sections".to_string(), serde_json::to_value(sections)?);
        let pretty = serde_json::to_string_pretty(&Value::Object(settings))?;
        Self::write(&self.settings_path(), pretty).await?;
        info!("Saved section order");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_order_by_preference() {
        let chosen = strings(&["culture", "sport", "technology", "news"]);
        let preferred = strings(&["news", "sport", "world"]);
        assert_eq!(
            order_by_preference(&chosen, &preferred),
            strings(&["news", "sport", "culture", "technology"])
        );
    }

    #[test]
    fn test_order_by_preference_without_saved_order() {
        let chosen = strings(&["b", "a", "b"]);
        assert_eq!(order_by_preference(&chosen, &[]), strings(&["b", "a"]));
    }

    #[test]
    fn test_yaml_overlay_keeps_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "sections: [news, sport]\noutput_dir: /tmp/books\n",
        )
        .unwrap();
        assert_eq!(config.sections, strings(&["news", "sport"]));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/books"));
        assert_eq!(config.author, DEFAULT_AUTHOR);
        assert_eq!(config.domain_marker, DEFAULT_DOMAIN_MARKER);
        assert_eq!(config.cover_path(), PathBuf::from("/tmp/books/guardian-cover.jpg"));
    }

    #[test]
    fn test_templates_default_to_builtin() {
        let config = PipelineConfig::default();
        assert_eq!(config.html_toc_template(), TemplateSource::Builtin(BUILTIN_HTML_TOC));
        assert!(BUILTIN_HTML_TOC.contains("{{toc_items}}"));
        assert!(BUILTIN_NCX_TOC.contains("{{nav_points}}"));

        let config =
            PipelineConfig::from_yaml_str("templates_dir: /srv/templates\n").unwrap();
        assert_eq!(
            config.ncx_toc_template(),
            TemplateSource::File(PathBuf::from("/srv/templates/guardian-toc-ncx.tmpl"))
        );
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(PipelineConfig::from_yaml_str("").unwrap(), PipelineConfig::default());
        assert!(PipelineConfig::from_yaml_str("sections: 3").is_err());
    }

    #[tokio::test]
    async fn test_api_key_roundtrip_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path().join(SETTINGS_DIR));
        assert_eq!(store.load_api_key().await.unwrap(), None);

        store.save_api_key("secret").await.unwrap();
        assert_eq!(store.load_api_key().await.unwrap().as_deref(), Some("secret"));

        let raw = std::fs::read_to_string(store.dir().join(API_KEY_FILE)).unwrap();
        assert_eq!(raw, r#"{"API_KEY":"secret"}"#);
    }

    #[tokio::test]
    async fn test_save_sections_preserves_other_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path());
        std::fs::write(
            tmp.path().join(SETTINGS_FILE),
            r#"{"sectionsOrder": {"news": 1}, "sections": ["old"]}"#,
        )
        .unwrap();

        store.save_sections(&strings(&["news", "sport"])).await.unwrap();

        assert_eq!(store.load_sections().await.unwrap(), strings(&["news", "sport"]));
        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(tmp.path().join(SETTINGS_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved["sectionsOrder"]["news"], 1);
    }

    #[tokio::test]
    async fn test_corrupt_settings_read_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path());
        std::fs::write(tmp.path().join(SETTINGS_FILE), "not json").unwrap();
        assert!(store.load_sections().await.unwrap().is_empty());

        store.save_sections(&strings(&["news"])).await.unwrap();
        assert_eq!(store.load_sections().await.unwrap(), strings(&["news"]));
    }
}
