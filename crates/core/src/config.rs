use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RoutingPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub poke: PokeConfig,
    pub server: ServerConfig,
    pub routing: RoutingPolicy,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// The cost-routing forward proxy in front of the generation API.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub forward_token: SecretString,
    pub base_url: String,
    pub target_url: String,
    pub timeout_secs: u64,
}

/// Outbound messaging integration, best-effort only.
#[derive(Clone, Debug)]
pub struct PokeConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub seed_demo_data: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub forward_token: Option<String>,
    pub poke_api_key: Option<String>,
    pub seed_demo_data: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leadpipe.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            upstream: UpstreamConfig {
                forward_token: String::new().into(),
                base_url: "https://api.lavapayments.com/v1/forward".to_string(),
                target_url: "https://api.openai.com/v1".to_string(),
                timeout_secs: 30,
            },
            poke: PokeConfig {
                api_key: String::new().into(),
                base_url: "https://poke.com/api/v1".to_string(),
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
                seed_demo_data: false,
            },
            routing: RoutingPolicy::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadpipe.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(upstream) = patch.upstream {
            if let Some(forward_token_value) = upstream.forward_token {
                self.upstream.forward_token = forward_token_value.into();
            }
            if let Some(base_url) = upstream.base_url {
                self.upstream.base_url = base_url;
            }
            if let Some(target_url) = upstream.target_url {
                self.upstream.target_url = target_url;
            }
            if let Some(timeout_secs) = upstream.timeout_secs {
                self.upstream.timeout_secs = timeout_secs;
            }
        }

        if let Some(poke) = patch.poke {
            if let Some(api_key_value) = poke.api_key {
                self.poke.api_key = api_key_value.into();
            }
            if let Some(base_url) = poke.base_url {
                self.poke.base_url = base_url;
            }
            if let Some(timeout_secs) = poke.timeout_secs {
                self.poke.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(seed_demo_data) = server.seed_demo_data {
                self.server.seed_demo_data = seed_demo_data;
            }
        }

        if let Some(routing) = patch.routing {
            self.routing = routing;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADPIPE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADPIPE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEADPIPE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADPIPE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADPIPE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADPIPE_FORWARD_TOKEN") {
            self.upstream.forward_token = value.into();
        }
        if let Some(value) = read_env("LEADPIPE_UPSTREAM_BASE_URL") {
            self.upstream.base_url = value;
        }
        if let Some(value) = read_env("LEADPIPE_UPSTREAM_TARGET_URL") {
            self.upstream.target_url = value;
        }
        if let Some(value) = read_env("LEADPIPE_UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = parse_u64("LEADPIPE_UPSTREAM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADPIPE_POKE_API_KEY") {
            self.poke.api_key = value.into();
        }
        if let Some(value) = read_env("LEADPIPE_POKE_BASE_URL") {
            self.poke.base_url = value;
        }

        if let Some(value) = read_env("LEADPIPE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADPIPE_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_u16("LEADPIPE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADPIPE_SERVER_SEED_DEMO_DATA") {
            self.server.seed_demo_data = parse_bool("LEADPIPE_SERVER_SEED_DEMO_DATA", &value)?;
        }

        let log_level =
            read_env("LEADPIPE_LOGGING_LEVEL").or_else(|| read_env("LEADPIPE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADPIPE_LOGGING_FORMAT").or_else(|| read_env("LEADPIPE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(forward_token) = overrides.forward_token {
            self.upstream.forward_token = forward_token.into();
        }
        if let Some(poke_api_key) = overrides.poke_api_key {
            self.poke.api_key = poke_api_key.into();
        }
        if let Some(seed_demo_data) = overrides.seed_demo_data {
            self.server.seed_demo_data = seed_demo_data;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_upstream(&self.upstream)?;
        validate_poke(&self.poke)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadpipe.toml"), PathBuf::from("config/leadpipe.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), ConfigError> {
    if upstream.forward_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "upstream.forward_token is required; set LEADPIPE_FORWARD_TOKEN or [upstream] forward_token"
                .to_string(),
        ));
    }

    for (field, value) in
        [("upstream.base_url", &upstream.base_url), ("upstream.target_url", &upstream.target_url)]
    {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{field} must start with http:// or https://"
            )));
        }
    }

    if upstream.timeout_secs == 0 || upstream.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "upstream.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_poke(poke: &PokeConfig) -> Result<(), ConfigError> {
    if poke.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "poke.api_key is required; set LEADPIPE_POKE_API_KEY or [poke] api_key".to_string(),
        ));
    }

    if !poke.base_url.starts_with("http://") && !poke.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "poke.base_url must start with http:// or https://".to_string(),
        ));
    }

    if poke.timeout_secs == 0 || poke.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "poke.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    upstream: Option<UpstreamPatch>,
    poke: Option<PokePatch>,
    server: Option<ServerPatch>,
    routing: Option<RoutingPolicy>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamPatch {
    forward_token: Option<String>,
    base_url: Option<String>,
    target_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PokePatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    seed_demo_data: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::cost::ModelTier;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn required_secrets() -> [(&'static str, &'static str); 2] {
        [("LEADPIPE_FORWARD_TOKEN", "fwd-test"), ("LEADPIPE_POKE_API_KEY", "poke-test")]
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_FORWARD_TOKEN", "fwd-from-env");
        env::set_var("TEST_POKE_API_KEY", "poke-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadpipe.toml");
            fs::write(
                &path,
                r#"
[upstream]
forward_token = "${TEST_FORWARD_TOKEN}"

[poke]
api_key = "${TEST_POKE_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.upstream.forward_token.expose_secret() == "fwd-from-env",
                "forward token should be loaded from environment",
            )?;
            ensure(
                config.poke.api_key.expose_secret() == "poke-from-env",
                "poke api key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_FORWARD_TOKEN", "TEST_POKE_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        for (key, value) in required_secrets() {
            env::set_var(key, value);
        }
        env::set_var("LEADPIPE_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadpipe.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["LEADPIPE_FORWARD_TOKEN", "LEADPIPE_POKE_API_KEY", "LEADPIPE_DATABASE_URL"]);
        result
    }

    #[test]
    fn validation_fails_fast_without_forward_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADPIPE_POKE_API_KEY", "poke-test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("upstream.forward_token")
            );
            ensure(has_message, "validation failure should mention upstream.forward_token")
        })();

        clear_vars(&["LEADPIPE_POKE_API_KEY"]);
        result
    }

    #[test]
    fn routing_table_is_loaded_from_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        for (key, value) in required_secrets() {
            env::set_var(key, value);
        }

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadpipe.toml");
            fs::write(
                &path,
                r#"
[routing]
suggestion = "flagship"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.routing.suggestion == ModelTier::Flagship,
                "routing override should reclassify suggestion to the flagship tier",
            )?;
            ensure(
                config.routing.enrichment == ModelTier::Flagship,
                "unspecified routing entries should keep their defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["LEADPIPE_FORWARD_TOKEN", "LEADPIPE_POKE_API_KEY"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADPIPE_FORWARD_TOKEN", "fwd-secret-value");
        env::set_var("LEADPIPE_POKE_API_KEY", "poke-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("fwd-secret-value"),
                "debug output should not contain forward token",
            )?;
            ensure(
                !debug.contains("poke-secret-value"),
                "debug output should not contain poke api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["LEADPIPE_FORWARD_TOKEN", "LEADPIPE_POKE_API_KEY"]);
        result
    }
}
