//! Configuration types for chook-core.
//!
//! [`ChookConfig`] is the resolved configuration injected into every
//! component at startup. It is assembled from a YAML [`FileConfig`]
//! (all keys optional) and [`EnvOverrides`] read from the process
//! environment, with environment values taking precedence over the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Default generation model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default base URL of the generation API.
pub const DEFAULT_GENERATION_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Language tag used while the editor is empty.
pub const DEFAULT_FALLBACK_LANGUAGE: &str = "javascript";

/// Primary environment variable holding the generation credential.
pub const API_KEY_ENV: &str = "API_KEY";

/// Secondary environment variable checked when [`API_KEY_ENV`] is unset.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable holding the storage project URL.
pub const STORAGE_URL_ENV: &str = "SUPABASE_URL";

/// Environment variable holding the storage anonymous key.
pub const STORAGE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Reported when saving or listing without storage settings.
pub const STORAGE_MISSING_MESSAGE: &str = "Supabase URL or Anon Key is missing.";

// ── Resolved configuration ───────────────────────────────────

/// Resolved runtime configuration.
///
/// # Examples
///
/// ```
/// use chook_core::ChookConfig;
///
/// let config = ChookConfig::builder()
///     .api_key("secret")
///     .debounce_ms(250_u64)
///     .build();
/// assert_eq!(config.model(), "gemini-2.5-flash");
/// ```
#[derive(Clone, Serialize, TypedBuilder)]
pub struct ChookConfig {
    /// Credential for the generation endpoint.
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing)]
    api_key: Option<String>,

    /// Generation model name.
    #[builder(default = DEFAULT_MODEL.to_owned(), setter(into))]
    model: String,

    /// Base URL of the generation API.
    #[builder(default = DEFAULT_GENERATION_BASE_URL.to_owned(), setter(into))]
    generation_base_url: String,

    /// Storage backend; `None` disables saving and the gallery.
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    storage: Option<StorageConfig>,

    /// Quiet period before a classification pass runs.
    #[builder(default = 500)]
    debounce_ms: u64,

    /// How long a failed save stays visible before the save control re-enables.
    #[builder(default = 4000)]
    save_failure_reset_ms: u64,

    /// Viewports narrower than this (in px) get a panel-switch hint.
    #[builder(default = 768)]
    narrow_viewport_breakpoint: u32,

    /// Language tag used when the editor is empty.
    #[builder(default = DEFAULT_FALLBACK_LANGUAGE.to_owned(), setter(into))]
    fallback_language: String,

    /// Number of records shown in the gallery.
    #[builder(default = 10)]
    recent_limit: usize,

    /// Directory of prompt template overrides.
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_dir: Option<PathBuf>,
}

impl ChookConfig {
    /// Returns the generation credential, if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Returns the generation credential or a configuration error.
    ///
    /// Callers run this before opening any request so a missing key is
    /// reported without touching the network.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when no non-empty key is set.
    pub fn check_generation(&self) -> Result<&str, CoreError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(CoreError::Configuration(format!(
                "{API_KEY_ENV} environment variable not set."
            ))),
        }
    }

    /// Returns the storage configuration or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when storage is not configured.
    pub fn check_storage(&self) -> Result<&StorageConfig, CoreError> {
        self.storage
            .as_ref()
            .ok_or_else(|| CoreError::Configuration(STORAGE_MISSING_MESSAGE.to_owned()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation_base_url(&self) -> &str {
        &self.generation_base_url
    }

    pub fn storage(&self) -> Option<&StorageConfig> {
        self.storage.as_ref()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn save_failure_reset(&self) -> Duration {
        Duration::from_millis(self.save_failure_reset_ms)
    }

    pub fn narrow_viewport_breakpoint(&self) -> u32 {
        self.narrow_viewport_breakpoint
    }

    pub fn fallback_language(&self) -> &str {
        &self.fallback_language
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    pub fn prompt_dir(&self) -> Option<&Path> {
        self.prompt_dir.as_deref()
    }

    /// Replace the generation model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl fmt::Debug for ChookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChookConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("generation_base_url", &self.generation_base_url)
            .field("storage", &self.storage)
            .field("debounce_ms", &self.debounce_ms)
            .field("save_failure_reset_ms", &self.save_failure_reset_ms)
            .field("narrow_viewport_breakpoint", &self.narrow_viewport_breakpoint)
            .field("fallback_language", &self.fallback_language)
            .field("recent_limit", &self.recent_limit)
            .field("prompt_dir", &self.prompt_dir)
            .finish()
    }
}

/// Connection settings for the hosted roast table.
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    #[builder(setter(into))]
    pub url: String,

    /// Public anonymous key.
    #[builder(setter(into))]
    #[serde(skip_serializing)]
    pub anon_key: String,

    /// Table holding roast records.
    #[builder(default = default_table(), setter(into))]
    #[serde(default = "default_table")]
    pub table: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("table", &self.table)
            .finish()
    }
}

// ── File configuration (chook.yaml) ──────────────────────────

/// Configuration file contents. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub generation: GenerationFileConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageFileConfig>,

    #[serde(default)]
    pub session: SessionFileConfig,

    #[serde(default)]
    pub prompts: PromptsFileConfig,
}

/// Generation endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Storage settings; either half may come from the environment instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StorageFileConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            table: default_table(),
        }
    }
}

/// Session timing and display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFileConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_save_failure_reset_ms")]
    pub save_failure_reset_ms: u64,

    #[serde(default = "default_breakpoint")]
    pub narrow_viewport_breakpoint: u32,

    #[serde(default = "default_fallback_language")]
    pub fallback_language: String,

    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            save_failure_reset_ms: default_save_failure_reset_ms(),
            narrow_viewport_breakpoint: default_breakpoint(),
            fallback_language: default_fallback_language(),
            recent_limit: default_recent_limit(),
        }
    }
}

/// Prompt template override location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_table() -> String {
    "roasts".to_owned()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_save_failure_reset_ms() -> u64 {
    4000
}

fn default_breakpoint() -> u32 {
    768
}

fn default_fallback_language() -> String {
    DEFAULT_FALLBACK_LANGUAGE.to_owned()
}

fn default_recent_limit() -> usize {
    10
}

// ── Environment overrides ────────────────────────────────────

/// Values read from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub api_key: Option<String>,
    pub storage_url: Option<String>,
    pub storage_anon_key: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary lookup function. Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            api_key: get(API_KEY_ENV).or_else(|| get(GEMINI_API_KEY_ENV)),
            storage_url: get(STORAGE_URL_ENV),
            storage_anon_key: get(STORAGE_ANON_KEY_ENV),
        }
    }
}

impl FileConfig {
    /// Merge with environment overrides into a resolved [`ChookConfig`].
    ///
    /// Storage is enabled only when both a URL and an anonymous key are
    /// available from either source.
    pub fn resolve(self, env: EnvOverrides) -> ChookConfig {
        let generation = self.generation;
        let storage_file = self.storage.unwrap_or_default();

        let url = env.storage_url.or(storage_file.url);
        let anon_key = env.storage_anon_key.or(storage_file.anon_key);
        let storage = match (url, anon_key) {
            (Some(url), Some(anon_key)) => Some(StorageConfig {
                url,
                anon_key,
                table: storage_file.table,
            }),
            _ => None,
        };

        ChookConfig {
            api_key: env.api_key.or(generation.api_key),
            model: generation.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            generation_base_url: generation
                .base_url
                .unwrap_or_else(|| DEFAULT_GENERATION_BASE_URL.to_owned()),
            storage,
            debounce_ms: self.session.debounce_ms,
            save_failure_reset_ms: self.session.save_failure_reset_ms,
            narrow_viewport_breakpoint: self.session.narrow_viewport_breakpoint,
            fallback_language: self.session.fallback_language,
            recent_limit: self.session.recent_limit,
            prompt_dir: self.prompts.dir,
        }
    }
}

/// Load [`FileConfig`] from a YAML file.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_file_config(path: &Path) -> Result<FileConfig, CoreError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    let config: FileConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
