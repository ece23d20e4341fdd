//! Application configuration for Leadflow.
//!
//! User config lives at `~/.leadflow/leadflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::types::{BusinessProfile, Channel};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadflow";

// ---------------------------------------------------------------------------
// Config structs (matching leadflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Signal source used by discovery.
    #[serde(default)]
    pub signals: SignalsConfig,

    /// Enrichment sources, in priority order.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// OpenRouter settings for drafting and research.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Outbound messaging channel.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Lead scoring knobs.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Target business profiles.
    #[serde(default)]
    pub profiles: Vec<BusinessProfile>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the lead database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Default number of leads a discovery run may create.
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: usize,

    /// Worker count for batch enrichment.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Profile used when discovery is invoked without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            discovery_limit: default_discovery_limit(),
            batch_concurrency: default_batch_concurrency(),
            default_profile: None,
        }
    }
}

fn default_database_path() -> String {
    "~/.leadflow/leadflow.db".into()
}
fn default_discovery_limit() -> usize {
    25
}
fn default_batch_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    20
}

/// `[signals]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Source name recorded on created leads.
    #[serde(default = "default_signals_name")]
    pub name: String,

    /// Base URL of the signal search API.
    #[serde(default = "default_signals_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_signals_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            name: default_signals_name(),
            base_url: default_signals_url(),
            api_key_env: default_signals_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_signals_name() -> String {
    "signals".into()
}
fn default_signals_url() -> String {
    "http://localhost:8700".into()
}
fn default_signals_key_env() -> String {
    "LEADFLOW_SIGNALS_API_KEY".into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Per-adapter lookup timeout.
    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,

    /// Sources, most trusted first.
    #[serde(default)]
    pub sources: Vec<EnrichmentSourceConfig>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_enrichment_timeout(),
            sources: Vec::new(),
        }
    }
}

fn default_enrichment_timeout() -> u64 {
    15
}

/// `[[enrichment.sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSourceConfig {
    /// Source name reported in enrichment results.
    pub name: String,
    /// Base URL of the lookup API.
    pub base_url: String,
    /// Env var holding the API key, if the source needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for drafting and research summaries.
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_openrouter_url")]
    pub base_url: String,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_url(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_generation_timeout() -> u64 {
    60
}

/// `[messaging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Channel the configured sender delivers on.
    #[serde(default = "default_channel")]
    pub channel: Channel,

    #[serde(default = "default_messaging_url")]
    pub base_url: String,

    #[serde(default = "default_messaging_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum sends per channel in any rolling hour, `0` for no limit.
    /// Counted per process: each CLI invocation starts with an empty window.
    #[serde(default = "default_max_sends")]
    pub max_sends_per_hour: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            base_url: default_messaging_url(),
            api_key_env: default_messaging_key_env(),
            timeout_secs: default_timeout_secs(),
            max_sends_per_hour: default_max_sends(),
        }
    }
}

fn default_channel() -> Channel {
    Channel::Linkedin
}
fn default_messaging_url() -> String {
    "http://localhost:8710".into()
}
fn default_messaging_key_env() -> String {
    "LEADFLOW_MESSAGING_API_KEY".into()
}
fn default_max_sends() -> u32 {
    20
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Score at or above which a lead is marked hot.
    #[serde(default = "default_hot_threshold")]
    pub hot_threshold: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hot_threshold: default_hot_threshold(),
        }
    }
}

fn default_hot_threshold() -> u8 {
    70
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration derived from the config file.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Timeout for the signal source query.
    pub signal_timeout: Duration,
    /// Timeout for each enrichment adapter lookup.
    pub enrichment_timeout: Duration,
    /// Timeout for drafting and research calls.
    pub generation_timeout: Duration,
    /// Timeout for a single messaging send.
    pub send_timeout: Duration,
    /// Worker count for batch and cascaded enrichment.
    pub batch_concurrency: usize,
    /// Maximum sends per channel per rolling hour.
    pub max_sends_per_hour: u32,
    /// Hot marker threshold.
    pub hot_threshold: u8,
    /// Profile used when discovery runs without one.
    pub default_profile: BusinessProfile,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            signal_timeout: Duration::from_secs(config.signals.timeout_secs),
            enrichment_timeout: Duration::from_secs(config.enrichment.timeout_secs),
            generation_timeout: Duration::from_secs(config.openrouter.timeout_secs),
            send_timeout: Duration::from_secs(config.messaging.timeout_secs),
            batch_concurrency: config.defaults.batch_concurrency.max(1),
            max_sends_per_hour: config.messaging.max_sends_per_hour,
            hot_threshold: config.scoring.hot_threshold,
            default_profile: config.default_profile(),
        }
    }
}

impl AppConfig {
    /// Look up a business profile by name (case-insensitive).
    pub fn profile(&self, name: &str) -> Result<BusinessProfile> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| LeadflowError::config(format!("unknown business profile '{name}'")))
    }

    /// The profile named in `[defaults]`, else the first configured one,
    /// else a catch-all `general` profile.
    pub fn default_profile(&self) -> BusinessProfile {
        self.defaults
            .default_profile
            .as_deref()
            .and_then(|name| self.profile(name).ok())
            .or_else(|| self.profiles.first().cloned())
            .unwrap_or_else(|| BusinessProfile {
                name: "general".into(),
                ..Default::default()
            })
    }

    /// Database path with a leading `~` expanded.
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.defaults.database_path)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LeadflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadflow/leadflow.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LeadflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the env var named by `var_name` is set and non-empty, returning its value.
pub fn resolve_api_key(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LeadflowError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.openrouter.api_key_env, "OpenRouter").map(|_| ())
}

/// Join an API path onto a configured base URL, keeping any base path
/// (`https://host/api/v1` + `chat/completions` → `https://host/api/v1/chat/completions`).
pub fn endpoint_url(base_url: &str, path: &str) -> Result<url::Url> {
    let mut base = url::Url::parse(base_url.trim())
        .map_err(|e| LeadflowError::config(format!("invalid base URL '{base_url}': {e}")))?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| LeadflowError::config(format!("invalid endpoint '{path}': {e}")))
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| LeadflowError::config("could not determine home directory"))?;
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
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("max_sends_per_hour"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.discovery_limit, 25);
        assert_eq!(parsed.messaging.channel, Channel::Linkedin);
        assert_eq!(parsed.scoring.hot_threshold, 70);
    }

    #[test]
    fn config_with_sources_and_profiles() {
        let toml_str = r#"
[defaults]
default_profile = "fintech"

[enrichment]
timeout_secs = 5

[[enrichment.sources]]
name = "people-data"
base_url = "https://people.example.com"
api_key_env = "PEOPLE_KEY"

[[enrichment.sources]]
name = "company-registry"
base_url = "https://registry.example.com"

[messaging]
channel = "email"

[[profiles]]
name = "saas"
industries = ["software"]

[[profiles]]
name = "fintech"
industries = ["payments", "banking"]
titles = ["CTO", "Head of Engineering"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.enrichment.sources.len(), 2);
        assert_eq!(config.enrichment.sources[0].name, "people-data");
        assert!(config.enrichment.sources[1].api_key_env.is_none());
        assert_eq!(config.messaging.channel, Channel::Email);

        let profile = config.default_profile();
        assert_eq!(profile.name, "fintech");
        assert_eq!(profile.titles.len(), 2);
        assert!(config.profile("SAAS").is_ok());
        assert!(config.profile("retail").is_err());
    }

    #[test]
    fn default_profile_falls_back_to_general() {
        let config = AppConfig::default();
        assert_eq!(config.default_profile().name, "general");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let mut app = AppConfig::default();
        app.defaults.batch_concurrency = 0;
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.enrichment_timeout, Duration::from_secs(15));
        assert_eq!(pipeline.batch_concurrency, 1);
        assert_eq!(pipeline.max_sends_per_hour, 20);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "LF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn endpoint_url_keeps_base_path() {
        let url = endpoint_url("https://openrouter.ai/api/v1", "chat/completions").unwrap();
        assert_eq!(url.as_str(), "https://openrouter.ai/api/v1/chat/completions");

        let url = endpoint_url("http://localhost:8700/", "/v1/signals/search").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8700/v1/signals/search");

        assert!(endpoint_url("not a url", "x").is_err());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/leads.db").unwrap(), PathBuf::from("/tmp/leads.db"));
    }
}
