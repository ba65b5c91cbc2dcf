//! Layered runtime configuration.
//!
//! Precedence, lowest first: built-in defaults, `haggle.toml` (or
//! `config/haggle.toml`), `HAGGLE_*` environment variables, then
//! programmatic [`ConfigOverrides`]. File values may reference the
//! environment with `${VAR}`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "HAGGLE_";
const SEARCH_PATHS: [&str; 2] = ["haggle.toml", "config/haggle.toml"];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"));

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub stream: StreamConfig,
    pub directory: DirectoryConfig,
    pub logging: LoggingConfig,
}

/// `url = ":memory:"` keeps call records in process instead of SQLite.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://haggle.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    #[serde(deserialize_with = "secret_from_string")]
    pub api_key: Option<SecretString>,
    /// Unset means the provider's public endpoint (or `localhost:11434` for Ollama).
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: None,
            model: "llama3.1".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Idle sessions older than this are evicted by the background sweep. `0` disables it.
    pub session_idle_timeout_secs: u64,
    pub session_sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            graceful_shutdown_secs: 15,
            session_idle_timeout_secs: 0,
            session_sweep_interval_secs: 300,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub search_radius_km: f64,
    pub max_candidates: usize,
    pub max_calls_per_session: u32,
    pub call_poll_interval_ms: u64,
    pub call_max_polls: u32,
    /// Market band used when price research is unavailable.
    pub fallback_price_low: Decimal,
    pub fallback_price_high: Decimal,
    pub currency: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 15.0,
            max_candidates: 10,
            max_calls_per_session: 10,
            call_poll_interval_ms: 2_000,
            call_max_polls: 150,
            fallback_price_low: Decimal::new(500, 0),
            fallback_price_high: Decimal::new(1_500, 0),
            currency: "INR".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub replay_events: usize,
    pub heartbeat_secs: u64,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { replay_events: 20, heartbeat_secs: 15, channel_capacity: 256 }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub catalog_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(alias = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "llm.provider `{other}` is not one of openai, anthropic, ollama"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "logging.format `{other}` is not one of compact, pretty, json"
            ))),
        }
    }
}

/// Values set by the embedding program; they win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub server_port: Option<u16>,
    pub catalog_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` is required but does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced in the config file but not set")]
    MissingEnvInterpolation { var: String },
    #[error("config file contains a `${{` without a closing brace")]
    UnterminatedInterpolation,
    #[error("environment variable `{key}` has an invalid value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let LoadOptions { config_path, require_file, overrides } = options;

        let mut config = match find_config_file(config_path.as_deref()) {
            Some(path) => Self::from_file(&path)?,
            None if require_file => {
                let expected = config_path.unwrap_or_else(|| PathBuf::from(SEARCH_PATHS[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => Self::default(),
        };

        config.apply_env(&EnvLayer::new(ENV_PREFIX))?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        toml::from_str(&interpolate_env_vars(&raw)?)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
    }

    fn apply_env(&mut self, env: &EnvLayer) -> Result<(), ConfigError> {
        env.set("DATABASE_URL", &mut self.database.url)?;
        env.set("DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections)?;
        env.set("DATABASE_TIMEOUT_SECS", &mut self.database.timeout_secs)?;

        env.set("LLM_PROVIDER", &mut self.llm.provider)?;
        env.set_some("LLM_BASE_URL", &mut self.llm.base_url)?;
        env.set("LLM_MODEL", &mut self.llm.model)?;
        env.set("LLM_TIMEOUT_SECS", &mut self.llm.timeout_secs)?;
        env.set("LLM_MAX_RETRIES", &mut self.llm.max_retries)?;
        if let Some(key) = env.value("LLM_API_KEY") {
            self.llm.api_key = Some(key.into());
        }

        env.set("SERVER_BIND_ADDRESS", &mut self.server.bind_address)?;
        env.set("SERVER_PORT", &mut self.server.port)?;
        env.set("SERVER_GRACEFUL_SHUTDOWN_SECS", &mut self.server.graceful_shutdown_secs)?;
        env.set("SERVER_SESSION_IDLE_TIMEOUT_SECS", &mut self.server.session_idle_timeout_secs)?;
        let server = &mut self.server;
        env.set("SERVER_SESSION_SWEEP_INTERVAL_SECS", &mut server.session_sweep_interval_secs)?;

        let workflow = &mut self.workflow;
        env.set("WORKFLOW_SEARCH_RADIUS_KM", &mut workflow.search_radius_km)?;
        env.set("WORKFLOW_MAX_CANDIDATES", &mut workflow.max_candidates)?;
        env.set("WORKFLOW_MAX_CALLS_PER_SESSION", &mut workflow.max_calls_per_session)?;
        env.set("WORKFLOW_CALL_POLL_INTERVAL_MS", &mut workflow.call_poll_interval_ms)?;
        env.set("WORKFLOW_CALL_MAX_POLLS", &mut workflow.call_max_polls)?;
        env.set("WORKFLOW_CURRENCY", &mut workflow.currency)?;

        env.set("STREAM_REPLAY_EVENTS", &mut self.stream.replay_events)?;
        env.set("STREAM_HEARTBEAT_SECS", &mut self.stream.heartbeat_secs)?;
        env.set("STREAM_CHANNEL_CAPACITY", &mut self.stream.channel_capacity)?;

        env.set_some("DIRECTORY_CATALOG_PATH", &mut self.directory.catalog_path)?;

        // Short aliases first so the sectioned names win when both are set.
        env.set("LOG_LEVEL", &mut self.logging.level)?;
        env.set("LOGGING_LEVEL", &mut self.logging.level)?;
        env.set("LOG_FORMAT", &mut self.logging.format)?;
        env.set("LOGGING_FORMAT", &mut self.logging.format)?;
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        replace(&mut self.database.url, overrides.database_url);
        replace(&mut self.logging.level, overrides.log_level);
        replace(&mut self.llm.provider, overrides.llm_provider);
        replace(&mut self.llm.model, overrides.llm_model);
        replace(&mut self.server.port, overrides.server_port);
        if let Some(key) = overrides.llm_api_key {
            self.llm.api_key = Some(key.into());
        }
        if overrides.catalog_path.is_some() {
            self.directory.catalog_path = overrides.catalog_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.llm.validate()?;
        self.server.validate()?;
        self.workflow.validate()?;
        self.stream.validate()?;
        self.logging.validate()
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        require(
            url.starts_with("sqlite:") || url == ":memory:",
            "database.url must start with `sqlite:` or be `:memory:`",
        )?;
        require(self.max_connections > 0, "database.max_connections must be at least 1")?;
        require((1..=300).contains(&self.timeout_secs), "database.timeout_secs must be 1..=300")
    }
}

impl LlmConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require((1..=300).contains(&self.timeout_secs), "llm.timeout_secs must be 1..=300")?;
        require(
            self.base_url.as_deref().map_or(true, |url| url.starts_with("http")),
            "llm.base_url must be an http(s) URL",
        )?;
        require(
            self.provider == LlmProvider::Ollama
                || self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty()),
            "llm.api_key must be set for the openai and anthropic providers",
        )
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.port > 0, "server.port must be non-zero")?;
        require(self.graceful_shutdown_secs > 0, "server.graceful_shutdown_secs must be positive")?;
        require(
            self.session_idle_timeout_secs == 0 || self.session_sweep_interval_secs > 0,
            "server.session_sweep_interval_secs must be at least 1 when idle eviction is on",
        )
    }
}

impl WorkflowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.search_radius_km > 0.0 && self.search_radius_km <= 100.0,
            "workflow.search_radius_km must be in (0, 100]",
        )?;
        require((1..=50).contains(&self.max_candidates), "workflow.max_candidates must be 1..=50")?;
        require(self.max_calls_per_session > 0, "workflow.max_calls_per_session must be positive")?;
        require(self.call_max_polls > 0, "workflow.call_max_polls must be at least 1")?;
        require(
            self.fallback_price_low > Decimal::ZERO
                && self.fallback_price_low <= self.fallback_price_high,
            "workflow.fallback_price_low must be positive and at most fallback_price_high",
        )?;
        require(!self.currency.trim().is_empty(), "workflow.currency must not be blank")
    }
}

impl StreamConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.replay_events <= 200, "stream.replay_events must be at most 200")?;
        require((1..=300).contains(&self.heartbeat_secs), "stream.heartbeat_secs must be 1..=300")?;
        require(self.channel_capacity > 0, "stream.channel_capacity must be at least 1")
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        require(
            LEVELS.contains(&self.level.trim().to_ascii_lowercase().as_str()),
            "logging.level must be one of trace, debug, info, warn, error",
        )
    }
}

/// Reads `PREFIX_KEY` variables; blank values count as unset.
struct EnvLayer {
    prefix: &'static str,
}

impl EnvLayer {
    fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    fn value(&self, key: &str) -> Option<String> {
        env::var(format!("{}{key}", self.prefix)).ok().filter(|value| !value.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(raw) = self.value(key) else {
            return Ok(None);
        };
        raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidEnvOverride {
            key: format!("{}{key}", self.prefix),
            value: raw,
        })
    }

    fn set<T: FromStr>(&self, key: &str, slot: &mut T) -> Result<(), ConfigError> {
        replace(slot, self.parse(key)?);
        Ok(())
    }

    fn set_some<T: FromStr>(&self, key: &str, slot: &mut Option<T>) -> Result<(), ConfigError> {
        if let Some(value) = self.parse(key)? {
            *slot = Some(value);
        }
        Ok(())
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}

fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.is_file().then(|| path.to_path_buf()),
        None => SEARCH_PATHS.into_iter().map(PathBuf::from).find(|path| path.is_file()),
    }
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut copied = 0;
    for captures in PLACEHOLDER.captures_iter(input) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = env::var(name.as_str()).map_err(|_| ConfigError::MissingEnvInterpolation {
            var: name.as_str().to_string(),
        })?;
        output.push_str(&input[copied..whole.start()]);
        output.push_str(&value);
        copied = whole.end();
    }

    let rest = &input[copied..];
    if rest.contains("${") {
        return Err(ConfigError::UnterminatedInterpolation);
    }
    output.push_str(rest);
    Ok(output)
}

fn secret_from_string<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV: Mutex<()> = Mutex::new(());

    /// Sets the variables for the duration of the guard's life.
    struct ScopedEnv {
        names: Vec<String>,
        _lock: MutexGuard<'static, ()>,
    }

    impl ScopedEnv {
        fn set(vars: &[(&str, &str)]) -> Self {
            let lock = ENV.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for (name, value) in vars {
                env::set_var(name, value);
            }
            Self { names: vars.iter().map(|(name, _)| name.to_string()).collect(), _lock: lock }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for name in &self.names {
                env::remove_var(name);
            }
        }
    }

    fn write_file(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("haggle.toml");
        std::fs::write(&path, body).expect("write config");
        path
    }

    fn from_file(path: PathBuf) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
    }

    #[test]
    fn defaults_load_without_a_file() {
        let _env = ScopedEnv::set(&[]);

        let config = AppConfig::load(LoadOptions::default()).expect("defaults are valid");

        assert_eq!(config.stream.replay_events, 20);
        assert_eq!(config.stream.heartbeat_secs, 15);
        assert_eq!(config.workflow.max_candidates, 10);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
    }

    #[test]
    fn partial_sections_keep_their_defaults() {
        let _env = ScopedEnv::set(&[("TEST_HAGGLE_LLM_KEY", "sk-from-env")]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_file(
            &dir,
            r#"
[llm]
provider = "openai"
api_key = "${TEST_HAGGLE_LLM_KEY}"
model = "gpt-4o-mini"

[workflow]
fallback_price_low = 800
fallback_price_high = 1200
"#,
        );

        let config = from_file(path).expect("file loads");

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(
            config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            Some("sk-from-env".to_string())
        );
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.workflow.fallback_price_low, Decimal::new(800, 0));
        assert_eq!(config.workflow.max_calls_per_session, 10);
    }

    #[test]
    fn overrides_beat_env_which_beats_the_file() {
        let _env = ScopedEnv::set(&[
            ("HAGGLE_DATABASE_URL", "sqlite://from-env.db"),
            ("HAGGLE_STREAM_HEARTBEAT_SECS", "20"),
        ]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_file(
            &dir,
            r#"
[database]
url = "sqlite://from-file.db"

[stream]
heartbeat_secs = 10
replay_events = 5

[logging]
level = "warn"
"#,
        );

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            overrides: ConfigOverrides {
                database_url: Some("sqlite://from-override.db".to_string()),
                log_level: Some("debug".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("layers load");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.stream.heartbeat_secs, 20);
        assert_eq!(config.stream.replay_events, 5);
    }

    #[test]
    fn sectioned_log_variables_win_over_aliases() {
        let _env = ScopedEnv::set(&[
            ("HAGGLE_LOG_FORMAT", "pretty"),
            ("HAGGLE_LOGGING_FORMAT", "json"),
            ("HAGGLE_LOG_LEVEL", "debug"),
        ]);

        let config = AppConfig::load(LoadOptions::default()).expect("env loads");

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unparseable_env_values_name_the_variable() {
        let _env = ScopedEnv::set(&[("HAGGLE_WORKFLOW_MAX_CANDIDATES", "many")]);

        let error = AppConfig::load(LoadOptions::default()).expect_err("bad number");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, ref value }
                if key == "HAGGLE_WORKFLOW_MAX_CANDIDATES" && value == "many"
        ));
    }

    #[test]
    fn hosted_providers_require_an_api_key() {
        let _env = ScopedEnv::set(&[]);

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Anthropic),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect_err("no key");

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("api_key")
        ));
    }

    #[test]
    fn inverted_fallback_band_is_rejected() {
        let _env = ScopedEnv::set(&[]);
        let dir = TempDir::new().expect("temp dir");
        let path = write_file(
            &dir,
            "[workflow]\nfallback_price_low = 2000\nfallback_price_high = 1000\n",
        );

        let error = from_file(path).expect_err("low above high");

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("fallback_price_low")
        ));
    }

    #[test]
    fn api_key_is_redacted_in_debug_output() {
        let _env = ScopedEnv::set(&[]);

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                llm_api_key: Some("sk-secret-value".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("key supplied");

        assert!(!format!("{config:?}").contains("sk-secret-value"));
    }

    #[test]
    fn required_file_must_exist() {
        let _env = ScopedEnv::set(&[]);
        let dir = TempDir::new().expect("temp dir");

        let result = AppConfig::load(LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn interpolation_reports_missing_and_unterminated_placeholders() {
        let _env = ScopedEnv::set(&[("TEST_HAGGLE_MODEL", "llama3.1")]);

        assert_eq!(
            interpolate_env_vars("model = \"${TEST_HAGGLE_MODEL}\"").expect("known var"),
            "model = \"llama3.1\""
        );
        assert!(matches!(
            interpolate_env_vars("key = \"${TEST_HAGGLE_UNSET}\""),
            Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "TEST_HAGGLE_UNSET"
        ));
        assert!(matches!(
            interpolate_env_vars("key = \"${TEST_HAGGLE_MODEL\""),
            Err(ConfigError::UnterminatedInterpolation)
        ));
    }
}
