//! Application configuration for LeadForge.
//!
//! User config lives at `~/.leadforge/leadforge.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file: each provider section names the
//! environment variable the key is read from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadforge";

// ---------------------------------------------------------------------------
// Config structs (matching leadforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// External provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Opportunity scoring settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Social presence lookups.
    #[serde(default)]
    pub social: SocialConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the lead database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Business category used when searching for competitors.
    #[serde(default = "default_service_category")]
    pub service_category: String,

    /// Pause between leads during bulk campaign operations.
    #[serde(default = "default_bulk_delay")]
    pub bulk_delay_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            service_category: default_service_category(),
            bulk_delay_ms: default_bulk_delay(),
        }
    }
}

fn default_database_path() -> String {
    "~/.leadforge/leadforge.db".into()
}
fn default_service_category() -> String {
    "commercial landscaping".into()
}
fn default_bulk_delay() -> u64 {
    500
}

/// `[providers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai_env")]
    pub openai_api_key_env: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_perplexity_env")]
    pub perplexity_api_key_env: String,

    #[serde(default = "default_perplexity_model")]
    pub perplexity_model: String,

    #[serde(default = "default_google_maps_env")]
    pub google_maps_api_key_env: String,

    /// Programmable Search engine id (`cx`). Web research is skipped without it.
    #[serde(default)]
    pub google_search_engine_id: Option<String>,

    #[serde(default = "default_apollo_env")]
    pub apollo_api_key_env: String,

    /// Per-request timeout for every provider call.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_api_key_env: default_openai_env(),
            openai_model: default_openai_model(),
            perplexity_api_key_env: default_perplexity_env(),
            perplexity_model: default_perplexity_model(),
            google_maps_api_key_env: default_google_maps_env(),
            google_search_engine_id: None,
            apollo_api_key_env: default_apollo_env(),
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_openai_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_perplexity_env() -> String {
    "PERPLEXITY_API_KEY".into()
}
fn default_perplexity_model() -> String {
    "sonar".into()
}
fn default_google_maps_env() -> String {
    "GOOGLE_MAPS_API_KEY".into()
}
fn default_apollo_env() -> String {
    "APOLLO_API_KEY".into()
}
fn default_timeout() -> u64 {
    30
}

/// `[scoring]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Add bounded random jitter to scores for visual variety.
    #[serde(default)]
    pub jitter: bool,

    /// Seed for the jitter RNG; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `[social]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    /// Pause between per-platform lookups.
    #[serde(default = "default_social_delay")]
    pub delay_ms: u64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_social_delay(),
        }
    }
}

fn default_social_delay() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// External services that need an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Perplexity,
    GoogleMaps,
    Apollo,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Perplexity,
        Provider::GoogleMaps,
        Provider::Apollo,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Perplexity => "Perplexity",
            Self::GoogleMaps => "Google Maps",
            Self::Apollo => "Apollo",
        }
    }

    fn key_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://platform.openai.com/api-keys",
            Self::Perplexity => "https://www.perplexity.ai/settings/api",
            Self::GoogleMaps => "https://console.cloud.google.com/google/maps-apis/credentials",
            Self::Apollo => "https://app.apollo.io/#/settings/integrations/api",
        }
    }
}

impl ProvidersConfig {
    /// Name of the env var holding `provider`'s key.
    pub fn env_var(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.openai_api_key_env,
            Provider::Perplexity => &self.perplexity_api_key_env,
            Provider::GoogleMaps => &self.google_maps_api_key_env,
            Provider::Apollo => &self.apollo_api_key_env,
        }
    }

    /// Read `provider`'s key from the environment, if set and non-empty.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        std::env::var(self.env_var(provider))
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Search engine id, if configured and non-empty.
    pub fn search_engine_id(&self) -> Option<&str> {
        self.google_search_engine_id
            .as_deref()
            .filter(|cx| !cx.trim().is_empty())
    }
}

/// Which providers are configured. Never carries key values.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub openai: bool,
    pub perplexity: bool,
    pub google_maps: bool,
    pub google_search: bool,
    pub apollo: bool,
    pub openai_model: String,
    pub service_category: String,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        let providers = &config.providers;
        let has = |p| providers.api_key(p).is_some();
        Self {
            openai: has(Provider::OpenAi),
            perplexity: has(Provider::Perplexity),
            google_maps: has(Provider::GoogleMaps),
            google_search: has(Provider::GoogleMaps) && providers.search_engine_id().is_some(),
            apollo: has(Provider::Apollo),
            openai_model: providers.openai_model.clone(),
            service_category: config.defaults.service_category.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadforge/leadforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
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
    let content = std::fs::read_to_string(path).map_err(|e| LeadForgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadForgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Return `provider`'s key, or a config error telling the user which env var to set.
pub fn validate_provider_key(config: &AppConfig, provider: Provider) -> Result<String> {
    config.providers.api_key(provider).ok_or_else(|| {
        let var_name = config.providers.env_var(provider);
        LeadForgeError::config(format!(
            "{} API key not found. Set the {var_name} environment variable.\n\
             Get a key at {}",
            provider.label(),
            provider.key_url()
        ))
    })
}
