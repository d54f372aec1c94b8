//! Configuration loading, validation, and management for evidex.
//!
//! Loads configuration from `evidex.toml` (or the path in `EVIDEX_CONFIG`)
//! with environment variable overrides. Validates all settings at startup.

use evidex_core::{BudgetConfig, ContextOrdering};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `evidex.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External services (Ollama, Chroma)
    #[serde(default)]
    pub services: ServicesConfig,

    /// Input and output locations
    #[serde(default)]
    pub data: DataConfig,

    /// How chunk files map onto vector-store collections
    #[serde(default)]
    pub vectorization: VectorizationConfig,

    /// Retrieval limits and the query template
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Budget used by the `context` command
    #[serde(default = "default_context_budget")]
    pub context: BudgetConfig,

    /// Token estimation and model windows
    #[serde(default)]
    pub budget: BudgetSettings,

    /// Per-pipeline budgets and sampling
    #[serde(default)]
    pub pipelines: PipelinesConfig,

    /// Log level and format
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_context_budget() -> BudgetConfig {
    BudgetConfig::default().with_ordering(ContextOrdering::ByPageThenId)
}

fn default_true() -> bool {
    true
}

// ── Services ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub chroma: ChromaConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Timeout for one embedding request
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,

    /// Timeout for one generation request
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_secs: u64,

    /// Key for hosted Ollama endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".into()
}
fn default_embed_model() -> String {
    "nomic-embed-text".into()
}
fn default_llm_model() -> String {
    "llama3.1:8b".into()
}
fn default_embed_timeout() -> u64 {
    120
}
fn default_generate_timeout() -> u64 {
    300
}
fn default_auth_header() -> String {
    "Authorization".into()
}
fn default_auth_scheme() -> String {
    "Bearer".into()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            embed_model: default_embed_model(),
            llm_model: default_llm_model(),
            timeout_secs: default_embed_timeout(),
            generate_timeout_secs: default_generate_timeout(),
            api_key: None,
            auth_header: default_auth_header(),
            auth_scheme: default_auth_scheme(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for OllamaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaConfig")
            .field("host", &self.host)
            .field("embed_model", &self.embed_model)
            .field("llm_model", &self.llm_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("generate_timeout_secs", &self.generate_timeout_secs)
            .field("api_key", &redact(&self.api_key))
            .field("auth_header", &self.auth_header)
            .field("auth_scheme", &self.auth_scheme)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaConfig {
    #[serde(default = "default_chroma_host")]
    pub host: String,

    #[serde(default = "default_chroma_port")]
    pub port: u16,

    #[serde(default = "default_tenant")]
    pub tenant: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_chroma_timeout")]
    pub timeout_secs: u64,
}

fn default_chroma_host() -> String {
    "127.0.0.1".into()
}
fn default_chroma_port() -> u16 {
    8000
}
fn default_tenant() -> String {
    "default_tenant".into()
}
fn default_database() -> String {
    "default_database".into()
}
fn default_chroma_timeout() -> u64 {
    30
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            host: default_chroma_host(),
            port: default_chroma_port(),
            tenant: default_tenant(),
            database: default_database(),
            timeout_secs: default_chroma_timeout(),
        }
    }
}

// ── Data & vectorization ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding `*.chunks.json` files
    #[serde(default = "default_chunks_dir")]
    pub chunks_dir: PathBuf,

    /// Directory receiving run artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_chunks_dir() -> PathBuf {
    PathBuf::from("data/chunks")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            chunks_dir: default_chunks_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizationConfig {
    /// `per_source` or `one_collection`
    #[serde(default = "default_collection_mode")]
    pub collection_mode: String,

    #[serde(default = "default_one_collection_name")]
    pub one_collection_name: String,

    /// Prepended to per-source collection names
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_collection_mode() -> String {
    "one_collection".into()
}
fn default_one_collection_name() -> String {
    "evidex_all".into()
}
fn default_batch_size() -> usize {
    24
}

impl Default for VectorizationConfig {
    fn default() -> Self {
        Self {
            collection_mode: default_collection_mode(),
            one_collection_name: default_one_collection_name(),
            prefix: String::new(),
            batch_size: default_batch_size(),
        }
    }
}

impl VectorizationConfig {
    /// The mode string in the form `CollectionMode::from_str` accepts.
    pub fn mode_spec(&self) -> String {
        match self.collection_mode.trim() {
            "one_collection" => format!("one_collection:{}", self.one_collection_name),
            other => other.to_string(),
        }
    }
}

// ── Retrieval ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Query template; `None` uses the built-in three-line template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_template: Option<String>,

    #[serde(default = "default_per_collection_limit")]
    pub per_collection_limit: usize,

    #[serde(default = "default_max_total_results")]
    pub max_total_results: usize,

    /// Evidence block limits
    #[serde(default = "default_evidence_total")]
    pub max_total_chars: usize,

    #[serde(default = "default_evidence_chunk")]
    pub max_chunk_chars: usize,

    #[serde(default = "default_rag_temperature")]
    pub temperature: f32,

    /// Prompt template file with `{{EVIDENCE}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

fn default_per_collection_limit() -> usize {
    6
}
fn default_max_total_results() -> usize {
    12
}
fn default_evidence_total() -> usize {
    18_000
}
fn default_evidence_chunk() -> usize {
    2_500
}
fn default_rag_temperature() -> f32 {
    0.2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query_template: None,
            per_collection_limit: default_per_collection_limit(),
            max_total_results: default_max_total_results(),
            max_total_chars: default_evidence_total(),
            max_chunk_chars: default_evidence_chunk(),
            temperature: default_rag_temperature(),
            prompt_template: None,
        }
    }
}

// ── Budget estimation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSettings {
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,

    /// Fraction of the model window the context may use
    #[serde(default = "default_safety")]
    pub safety: f64,

    /// Average chunk length assumed when deriving a chunk count
    #[serde(default = "default_avg_chunk_chars")]
    pub avg_chunk_chars: usize,

    /// Context windows (tokens) added to or overriding the built-in table
    #[serde(default)]
    pub model_windows: BTreeMap<String, usize>,
}

fn default_chars_per_token() -> f64 {
    4.0
}
fn default_safety() -> f64 {
    0.8
}
fn default_avg_chunk_chars() -> usize {
    1_200
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
            safety: default_safety(),
            avg_chunk_chars: default_avg_chunk_chars(),
            model_windows: BTreeMap::new(),
        }
    }
}

// ── Pipelines ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelinesConfig {
    #[serde(default)]
    pub single_shot: SingleShotConfig,

    #[serde(default)]
    pub iterative: IterativeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleShotConfig {
    #[serde(default = "default_single_shot_budget")]
    pub budget: BudgetConfig,

    #[serde(default = "default_pipeline_temperature")]
    pub temperature: f32,

    /// Raise the budget to what the model window allows
    #[serde(default = "default_true")]
    pub widen_from_model: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

fn default_single_shot_budget() -> BudgetConfig {
    BudgetConfig {
        max_total_chars: 140_000,
        max_chunk_chars: 6_000,
        max_chunk_count: 120,
        ..BudgetConfig::default()
    }
    .with_ordering(ContextOrdering::ByPageThenId)
}

fn default_pipeline_temperature() -> f32 {
    0.2
}

impl Default for SingleShotConfig {
    fn default() -> Self {
        Self {
            budget: default_single_shot_budget(),
            temperature: default_pipeline_temperature(),
            widen_from_model: true,
            prompt_template: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterativeConfig {
    /// Budget applied to each delta block
    #[serde(default = "default_iterative_budget")]
    pub budget: BudgetConfig,

    #[serde(default = "default_pipeline_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

fn default_iterative_budget() -> BudgetConfig {
    BudgetConfig {
        max_total_chars: 50_000,
        max_chunk_chars: 6_000,
        max_chunk_count: 50,
        ..BudgetConfig::default()
    }
    .with_ordering(ContextOrdering::ByPageThenId)
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            budget: default_iterative_budget(),
            temperature: default_pipeline_temperature(),
            prompt_template: None,
        }
    }
}

// ── Logging ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILE_NAME: &str = "evidex.toml";

impl AppConfig {
    /// Load configuration from the default path with environment overrides.
    ///
    /// The path is `EVIDEX_CONFIG` if set, otherwise `./evidex.toml`.
    /// Overrides recognised after the file is read:
    /// - `OLLAMA_HOST`, `OLLAMA_EMBED_MODEL`, `OLLAMA_LLM_MODEL`
    /// - `CHROMA_HOST`, `CHROMA_PORT`
    /// - `EVIDEX_CHUNKS_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("EVIDEX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME));
        Self::load_with_env(&path)
    }

    /// Load from `path`, then apply process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("OLLAMA_HOST") {
            self.services.ollama.host = host;
        }
        if let Some(model) = get("OLLAMA_EMBED_MODEL") {
            self.services.ollama.embed_model = model;
        }
        if let Some(model) = get("OLLAMA_LLM_MODEL") {
            self.services.ollama.llm_model = model;
        }
        if let Some(host) = get("CHROMA_HOST") {
            self.services.chroma.host = host;
        }
        if let Some(port) = get("CHROMA_PORT") {
            self.services.chroma.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("CHROMA_PORT must be a port number, got '{port}'"))
            })?;
        }
        if let Some(dir) = get("EVIDEX_CHUNKS_DIR") {
            self.data.chunks_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.budget.chars_per_token > 0.0) {
            return Err(ConfigError::ValidationError(
                "budget.chars_per_token must be > 0".into(),
            ));
        }

        if !(self.budget.safety > 0.0 && self.budget.safety <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.safety must be in (0, 1]".into(),
            ));
        }

        if self.vectorization.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "vectorization.batch_size must be > 0".into(),
            ));
        }

        if !matches!(
            self.vectorization.collection_mode.trim(),
            "per_source" | "one_collection"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "vectorization.collection_mode must be per_source or one_collection, got '{}'",
                self.vectorization.collection_mode
            )));
        }

        if self.retrieval.per_collection_limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.per_collection_limit must be > 0".into(),
            ));
        }

        for (name, temperature) in [
            ("retrieval", self.retrieval.temperature),
            ("pipelines.single_shot", self.pipelines.single_shot.temperature),
            ("pipelines.iterative", self.pipelines.iterative.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "{name}.temperature must be between 0.0 and 2.0"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `evidex init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.services.ollama.host, "http://127.0.0.1:11434");
        assert_eq!(config.retrieval.per_collection_limit, 6);
        assert_eq!(config.retrieval.max_total_results, 12);
        assert_eq!(config.vectorization.batch_size, 24);
        assert_eq!(config.pipelines.single_shot.budget.max_total_chars, 140_000);
        assert_eq!(config.pipelines.iterative.budget.max_chunk_count, 50);
        assert_eq!(config.context.ordering, ContextOrdering::ByPageThenId);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.services.chroma.port, config.services.chroma.port);
        assert_eq!(
            parsed.pipelines.single_shot.budget,
            config.pipelines.single_shot.budget
        );
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/evidex.toml")).unwrap();
        assert_eq!(config.vectorization.one_collection_name, "evidex_all");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidex.toml");
        std::fs::write(
            &path,
            r#"
[services.ollama]
llm_model = "qwen2.5:14b"

[budget.model_windows]
"custom:1b" = 2048
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.services.ollama.llm_model, "qwen2.5:14b");
        assert_eq!(config.services.ollama.embed_model, "nomic-embed-text");
        assert_eq!(config.budget.model_windows.get("custom:1b"), Some(&2048));
    }

    #[test]
    fn negative_budget_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidex.toml");
        std::fs::write(&path, "[context]\nmax_total_chars = -5\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("max_total_chars"));
    }

    #[test]
    fn invalid_safety_rejected() {
        let mut config = AppConfig::default();
        config.budget.safety = 1.5;
        assert!(config.validate().is_err());
        config.budget.safety = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_chars_per_token_rejected() {
        let mut config = AppConfig::default();
        config.budget.chars_per_token = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.vectorization.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_collection_mode_rejected() {
        let mut config = AppConfig::default();
        config.vectorization.collection_mode = "sharded".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("OLLAMA_LLM_MODEL", "mistral:7b"),
            ("CHROMA_PORT", "9000"),
            ("EVIDEX_CHUNKS_DIR", "/srv/chunks"),
            ("OLLAMA_EMBED_MODEL", "  "),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.services.ollama.host, "http://gpu-box:11434");
        assert_eq!(config.services.ollama.llm_model, "mistral:7b");
        assert_eq!(config.services.ollama.embed_model, "nomic-embed-text");
        assert_eq!(config.services.chroma.port, 9000);
        assert_eq!(config.data.chunks_dir, PathBuf::from("/srv/chunks"));
    }

    #[test]
    fn bad_port_override_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides_with(|key| (key == "CHROMA_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CHROMA_PORT"));
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.services.ollama.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn mode_spec_expands_one_collection() {
        let config = VectorizationConfig::default();
        assert_eq!(config.mode_spec(), "one_collection:evidex_all");

        let per_source = VectorizationConfig {
            collection_mode: "per_source".into(),
            ..VectorizationConfig::default()
        };
        assert_eq!(per_source.mode_spec(), "per_source");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("nomic-embed-text"));
        assert!(toml_str.contains("evidex_all"));
    }
}
