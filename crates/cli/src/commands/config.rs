use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadpipe_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: Option<&str>| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", Some("LEADPIPE_DATABASE_URL")),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", Some("LEADPIPE_DATABASE_MAX_CONNECTIONS")),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", Some("LEADPIPE_DATABASE_TIMEOUT_SECS")),
    ));

    let forward_token = redact_token(config.upstream.forward_token.expose_secret());
    lines.push(render_line(
        "upstream.forward_token",
        &forward_token,
        source("upstream.forward_token", Some("LEADPIPE_FORWARD_TOKEN")),
    ));
    lines.push(render_line(
        "upstream.base_url",
        &config.upstream.base_url,
        source("upstream.base_url", Some("LEADPIPE_UPSTREAM_BASE_URL")),
    ));
    lines.push(render_line(
        "upstream.target_url",
        &config.upstream.target_url,
        source("upstream.target_url", Some("LEADPIPE_UPSTREAM_TARGET_URL")),
    ));
    lines.push(render_line(
        "upstream.timeout_secs",
        &config.upstream.timeout_secs.to_string(),
        source("upstream.timeout_secs", Some("LEADPIPE_UPSTREAM_TIMEOUT_SECS")),
    ));

    let poke_key = redact_token(config.poke.api_key.expose_secret());
    lines.push(render_line(
        "poke.api_key",
        &poke_key,
        source("poke.api_key", Some("LEADPIPE_POKE_API_KEY")),
    ));
    lines.push(render_line(
        "poke.base_url",
        &config.poke.base_url,
        source("poke.base_url", Some("LEADPIPE_POKE_BASE_URL")),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", Some("LEADPIPE_SERVER_BIND_ADDRESS")),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", Some("LEADPIPE_SERVER_PORT")),
    ));
    lines.push(render_line(
        "server.seed_demo_data",
        &config.server.seed_demo_data.to_string(),
        source("server.seed_demo_data", Some("LEADPIPE_SERVER_SEED_DEMO_DATA")),
    ));

    lines.push(render_line(
        "routing.enrichment",
        config.routing.enrichment.as_str(),
        source("routing.enrichment", None),
    ));
    lines.push(render_line(
        "routing.email_draft",
        config.routing.email_draft.as_str(),
        source("routing.email_draft", None),
    ));
    lines.push(render_line(
        "routing.suggestion",
        config.routing.suggestion.as_str(),
        source("routing.suggestion", None),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("LEADPIPE_LOGGING_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("LEADPIPE_LOGGING_FORMAT")),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("leadpipe.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/leadpipe.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn tokens_never_render_beyond_their_prefix() {
        assert_eq!(redact_token("lava-forward-abc123"), "lava-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }
}
