use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mendflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let webhook_url = config.push.webhook_url.as_deref().unwrap_or("<unset>").to_string();
    let auth_token =
        if config.push.auth_token.is_some() { "<redacted>" } else { "<unset>" }.to_string();

    let rows: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "MENDFLOW_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "MENDFLOW_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "MENDFLOW_DATABASE_TIMEOUT_SECS",
        ),
        ("push.enabled", config.push.enabled.to_string(), "MENDFLOW_PUSH_ENABLED"),
        ("push.webhook_url", webhook_url, "MENDFLOW_PUSH_WEBHOOK_URL"),
        ("push.auth_token", auth_token, "MENDFLOW_PUSH_AUTH_TOKEN"),
        (
            "push.poll_interval_secs",
            config.push.poll_interval_secs.to_string(),
            "MENDFLOW_PUSH_POLL_INTERVAL_SECS",
        ),
        ("push.batch_size", config.push.batch_size.to_string(), "MENDFLOW_PUSH_BATCH_SIZE"),
        (
            "attachments.public_base_url",
            config.attachments.public_base_url.clone(),
            "MENDFLOW_ATTACHMENTS_PUBLIC_BASE_URL",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "MENDFLOW_SERVER_BIND_ADDRESS"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "MENDFLOW_SERVER_HEALTH_CHECK_PORT",
        ),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "MENDFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        ("logging.level", config.logging.level.clone(), "MENDFLOW_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "MENDFLOW_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in rows {
        let source = field_source(
            key,
            Some(env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("mendflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/mendflow.toml");
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
