//! Engine configuration: explicit struct, loadable from env or a TOML file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::error::{ColloquyError, Result};
use crate::tools::ExecutionMode;
use crate::util::retry::RetryPolicy;

/// Default endpoint of a local OpenAI-compatible server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

/// Everything the client and engine need; passed in, never global.
///
/// ```
/// use colloquy::config::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::builder()
///     .model("qwen2.5-7b-instruct")
///     .turn_timeout(Duration::from_secs(30))
///     .build();
/// assert!(config.stream);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    #[builder(into)]
    pub model: String,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into)]
    pub api_key: Option<String>,
    /// Stream model responses chunk by chunk.
    #[builder(default = true)]
    pub stream: bool,
    /// Per-HTTP-request timeout.
    #[builder(default = Duration::from_secs(120))]
    pub request_timeout: Duration,
    /// Default wall-clock bound for one `handle` call.
    pub turn_timeout: Option<Duration>,
    /// Maximum model calls within one turn.
    #[builder(default = 20)]
    pub max_iterations: usize,
    #[builder(default)]
    pub default_execution: ExecutionMode,
    /// Tools always run through the deferred executor.
    #[builder(default)]
    pub deferred_tools: Vec<String>,
    /// Tools always run inline, regardless of `default_execution`.
    #[builder(default)]
    pub inline_tools: Vec<String>,
    #[builder(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    stream: Option<bool>,
    request_timeout_ms: Option<u64>,
    turn_timeout_ms: Option<u64>,
    max_iterations: Option<usize>,
    default_execution: Option<ExecutionMode>,
    #[serde(default)]
    deferred_tools: Vec<String>,
    #[serde(default)]
    inline_tools: Vec<String>,
}

impl EngineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self::builder().model(model).build()
    }

    /// Load `.env` if present, then read `COLLOQUY_*` variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup using the `COLLOQUY_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model = lookup("COLLOQUY_MODEL")
            .ok_or_else(|| ColloquyError::Configuration("Missing COLLOQUY_MODEL".into()))?;
        let mut config = Self::new(model);
        if let Some(url) = lookup("COLLOQUY_BASE_URL") {
            config.base_url = url;
        }
        config.api_key = lookup("COLLOQUY_API_KEY").filter(|k| !k.is_empty());
        if let Some(stream) = parse_var::<bool, _>(&lookup, "COLLOQUY_STREAM")? {
            config.stream = stream;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "COLLOQUY_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        config.turn_timeout =
            parse_var::<u64, _>(&lookup, "COLLOQUY_TURN_TIMEOUT_MS")?.map(Duration::from_millis);
        if let Some(max) = parse_var::<usize, _>(&lookup, "COLLOQUY_MAX_ITERATIONS")? {
            config.max_iterations = max;
        }
        if let Some(mode) = parse_var::<ExecutionMode, _>(&lookup, "COLLOQUY_DEFAULT_EXECUTION")? {
            config.default_execution = mode;
        }
        if let Some(names) = lookup("COLLOQUY_DEFERRED_TOOLS") {
            config.deferred_tools = split_list(&names);
        }
        if let Some(names) = lookup("COLLOQUY_INLINE_TOOLS") {
            config.inline_tools = split_list(&names);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. `model` is required.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| ColloquyError::Configuration(e.to_string()))?;
        let model = file
            .model
            .ok_or_else(|| ColloquyError::Configuration("config file is missing `model`".into()))?;
        let mut config = Self::new(model);
        if let Some(url) = file.base_url {
            config.base_url = url;
        }
        config.api_key = file.api_key;
        if let Some(stream) = file.stream {
            config.stream = stream;
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        config.turn_timeout = file.turn_timeout_ms.map(Duration::from_millis);
        if let Some(max) = file.max_iterations {
            config.max_iterations = max;
        }
        if let Some(mode) = file.default_execution {
            config.default_execution = mode;
        }
        config.deferred_tools = file.deferred_tools;
        config.inline_tools = file.inline_tools;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// `~/.colloquy/config.toml`, when a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".colloquy").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ColloquyError::Configuration("model must not be empty".into()));
        }
        if self.max_iterations == 0 {
            return Err(ColloquyError::Configuration("max_iterations must be at least 1".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ColloquyError::Configuration(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ColloquyError::Configuration(format!("{key}: {e}")))
        })
        .transpose()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
