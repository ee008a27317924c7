//! Application configuration for notemerge.
//!
//! User config lives at `~/.notemerge/notemerge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NoteMergeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "notemerge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".notemerge";

// ---------------------------------------------------------------------------
// Config structs (matching notemerge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Merge and comparison policy.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Where the note collection lives.
    #[serde(default)]
    pub collection: CollectionConfig,
}

/// `[merge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Inserted between merged field values. `\n`, `\t` and `\r` escapes are
    /// interpreted.
    #[serde(default)]
    pub field_separator: String,

    /// Characters ignored when comparing fields.
    #[serde(default = "default_punctuation")]
    pub punctuation_characters: String,

    /// Name of the ordering applied before merging (e.g. "Due", "Card ID").
    #[serde(default = "default_ordering")]
    pub ordering: String,

    /// Field used by the "Custom field" orderings.
    #[serde(default)]
    pub custom_sort_field: String,

    /// Sort in reverse, so the first note in the ordering receives the others.
    #[serde(default)]
    pub reverse_order: bool,

    /// Delete every note but the last after merging.
    #[serde(default)]
    pub delete_original_notes: bool,

    /// Merge tags in addition to field contents.
    #[serde(default = "default_true")]
    pub merge_tags: bool,

    /// Only copy into fields that are empty.
    #[serde(default)]
    pub only_empty: bool,

    /// Merge notes with fewer common fields first.
    #[serde(default = "default_true")]
    pub avoid_content_loss: bool,

    /// Strip HTML before comparing fields.
    #[serde(default = "default_true")]
    pub html_agnostic_comparison: bool,

    /// Strip `punctuation_characters` before comparing fields.
    #[serde(default)]
    pub strip_punctuation_before_comparison: bool,

    /// Strip furigana readings before comparing fields.
    #[serde(default)]
    pub strip_furigana_before_comparison: bool,

    /// Treat full-width digits as their ASCII counterparts when comparing.
    #[serde(default = "default_true")]
    pub normalize_digits: bool,

    /// Use the comparison options above when searching for duplicates.
    #[serde(default = "default_true")]
    pub apply_when_searching_duplicates: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            field_separator: String::new(),
            punctuation_characters: default_punctuation(),
            ordering: default_ordering(),
            custom_sort_field: String::new(),
            reverse_order: false,
            delete_original_notes: false,
            merge_tags: true,
            only_empty: false,
            avoid_content_loss: true,
            html_agnostic_comparison: true,
            strip_punctuation_before_comparison: false,
            strip_furigana_before_comparison: false,
            normalize_digits: true,
            apply_when_searching_duplicates: true,
        }
    }
}

fn default_punctuation() -> String {
    ",.;:!?'\"()[]{}-、。，．！？：；・「」『』（）【】〜～".into()
}
fn default_ordering() -> String {
    "Due".into()
}
fn default_true() -> bool {
    true
}

/// `[collection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Path to the collection database. A leading `~/` is expanded.
    #[serde(default = "default_collection_path")]
    pub path: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            path: default_collection_path(),
        }
    }
}

fn default_collection_path() -> String {
    "~/.notemerge/collection.db".into()
}

// ---------------------------------------------------------------------------
// Normalization options (runtime, derived from [merge])
// ---------------------------------------------------------------------------

/// Switches for the comparison normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub strip_html: bool,
    pub strip_furigana: bool,
    pub strip_punctuation: bool,
    /// Characters removed when `strip_punctuation` is set.
    pub punctuation: String,
    pub fold_full_width_digits: bool,
}

impl NormalizeOptions {
    /// Only HTML stripping, which is what the host's own duplicate finder does.
    pub fn html_only() -> Self {
        Self {
            strip_html: true,
            ..Self::default()
        }
    }
}

impl From<&MergeConfig> for NormalizeOptions {
    fn from(config: &MergeConfig) -> Self {
        Self {
            strip_html: config.html_agnostic_comparison,
            strip_furigana: config.strip_furigana_before_comparison,
            strip_punctuation: config.strip_punctuation_before_comparison,
            punctuation: config.punctuation_characters.clone(),
            fold_full_width_digits: config.normalize_digits,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.notemerge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NoteMergeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.notemerge/notemerge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NoteMergeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NoteMergeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NoteMergeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NoteMergeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NoteMergeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the collection database path, expanding a leading `~/`.
pub fn collection_path(config: &AppConfig) -> Result<PathBuf> {
    expand_home(&config.collection.path)
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| NoteMergeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("field_separator"));
        assert!(toml_str.contains("collection.db"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.merge.ordering, "Due");
        assert!(parsed.merge.merge_tags);
        assert!(!parsed.merge.delete_original_notes);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[merge]
field_separator = "<br>"
delete_original_notes = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.merge.field_separator, "<br>");
        assert!(config.merge.delete_original_notes);
        assert!(config.merge.html_agnostic_comparison);
        assert_eq!(config.collection.path, "~/.notemerge/collection.db");
    }

    #[test]
    fn normalize_options_from_merge_config() {
        let mut merge = MergeConfig::default();
        merge.strip_punctuation_before_comparison = true;
        merge.punctuation_characters = "!?".into();
        let opts = NormalizeOptions::from(&merge);
        assert!(opts.strip_html);
        assert!(opts.strip_punctuation);
        assert!(!opts.strip_furigana);
        assert!(opts.fold_full_width_digits);
        assert_eq!(opts.punctuation, "!?");
    }

    #[test]
    fn absolute_collection_path_untouched() {
        let mut config = AppConfig::default();
        config.collection.path = "/tmp/notes.db".into();
        let path = collection_path(&config).expect("resolve");
        assert_eq!(path, PathBuf::from("/tmp/notes.db"));
    }
}
