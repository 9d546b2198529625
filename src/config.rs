//! Configuration for loopwise.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LOOPWISE_API_KEY / OPENAI_API_KEY, LOOPWISE_BASE_URL,
//!    LOOPWISE_MODEL, LOOPWISE_HOME)
//! 2. Config file (.loopwise/config.yaml)
//! 3. Defaults (~/.loopwise)
//!
//! Config file discovery:
//! - Searches current directory and parents for .loopwise/config.yaml
//! - `home` in the config file is relative to the .loopwise/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::openai::DEFAULT_BASE_URL;
use crate::core::safety::MAX_INPUT_CHARS;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub completion: Option<CompletionConfig>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Tunables for the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Model selector passed to the completion service
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,

    #[serde(default = "default_decision_temperature")]
    pub decision_temperature: f32,

    #[serde(default = "default_extraction_max_tokens")]
    pub extraction_max_tokens: u32,

    #[serde(default = "default_decision_max_tokens")]
    pub decision_max_tokens: u32,

    #[serde(default = "default_questions_max_tokens")]
    pub questions_max_tokens: u32,

    #[serde(default = "default_repair_max_tokens")]
    pub repair_max_tokens: u32,

    /// Sanitized input cap in characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_summary_max_words")]
    pub summary_max_words: usize,

    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_seconds() -> u64 {
    20
}
fn default_extraction_temperature() -> f32 {
    0.3
}
fn default_decision_temperature() -> f32 {
    0.1
}
fn default_extraction_max_tokens() -> u32 {
    1500
}
fn default_decision_max_tokens() -> u32 {
    5
}
fn default_questions_max_tokens() -> u32 {
    300
}
fn default_repair_max_tokens() -> u32 {
    1500
}
fn default_max_input_chars() -> usize {
    MAX_INPUT_CHARS
}
fn default_summary_max_words() -> usize {
    250
}
fn default_max_questions() -> usize {
    3
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            timeout_seconds: default_timeout_seconds(),
            extraction_temperature: default_extraction_temperature(),
            decision_temperature: default_decision_temperature(),
            extraction_max_tokens: default_extraction_max_tokens(),
            decision_max_tokens: default_decision_max_tokens(),
            questions_max_tokens: default_questions_max_tokens(),
            repair_max_tokens: default_repair_max_tokens(),
            max_input_chars: default_max_input_chars(),
            summary_max_words: default_summary_max_words(),
            max_questions: default_max_questions(),
        }
    }
}

impl PipelineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to loopwise home (analytics log lives here)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Completion service base URL
    pub base_url: String,
    /// API key for the completion service
    pub api_key: Option<String>,
    pub pipeline: PipelineSettings,
}

impl ResolvedConfig {
    /// API key with all but the last four characters masked
    pub fn masked_api_key(&self) -> String {
        match &self.api_key {
            Some(key) if key.chars().count() > 4 => {
                let suffix: String = key.chars().skip(key.chars().count() - 4).collect();
                format!("****{}", suffix)
            }
            Some(_) => "****".to_string(),
            None => "(not set)".to_string(),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".loopwise").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".loopwise");

    let config_file = find_config_file();
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Some(env_home) = env_var("LOOPWISE_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home)) = (
        config_file.as_ref(),
        file.as_ref().and_then(|f| f.home.as_ref()),
    ) {
        let loopwise_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(loopwise_dir, home)
    } else {
        default_home
    };

    let completion = file.as_ref().and_then(|f| f.completion.clone());
    let mut pipeline = file.map(|f| f.pipeline).unwrap_or_default();

    if let Some(model) = env_var("LOOPWISE_MODEL").or_else(|| completion.as_ref().and_then(|c| c.model.clone())) {
        pipeline.model = model;
    }

    let base_url = env_var("LOOPWISE_BASE_URL")
        .or_else(|| completion.as_ref().and_then(|c| c.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let api_key = env_var("LOOPWISE_API_KEY").or_else(|| env_var("OPENAI_API_KEY"));

    Ok(ResolvedConfig {
        home,
        config_file,
        base_url,
        api_key,
        pipeline,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the loopwise home directory.
pub fn loopwise_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the analytics log path ($LOOPWISE_HOME/events.jsonl)
pub fn events_path() -> Result<PathBuf> {
    Ok(config()?.home.join("events.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".loopwise");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
home: ./state
completion:
  base_url: http://localhost:11434/v1
pipeline:
  model: llama3
  timeout_seconds: 8
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.home.as_deref(), Some("./state"));
        assert_eq!(
            config.completion.unwrap().base_url.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.pipeline.model, "llama3");
        assert_eq!(config.pipeline.timeout_seconds, 8);
        // Unspecified values keep their defaults
        assert_eq!(config.pipeline.summary_max_words, 250);
        assert_eq!(config.pipeline.max_questions, 3);
    }

    #[test]
    fn test_pipeline_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.max_input_chars, 10_000);
        assert!(settings.decision_temperature <= 0.3);
        assert_eq!(settings.timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_masked_api_key() {
        let mut config = ResolvedConfig {
            home: PathBuf::from("/tmp/.loopwise"),
            config_file: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: Some("sk-abcdef1234".to_string()),
            pipeline: PipelineSettings::default(),
        };
        assert_eq!(config.masked_api_key(), "****1234");

        config.api_key = Some("sk-éxyz".to_string());
        assert_eq!(config.masked_api_key(), "****éxyz");

        config.api_key = None;
        assert_eq!(config.masked_api_key(), "(not set)");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "./missing"),
            PathBuf::from("/home/user/project/./missing")
        );
    }
}
