use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gigboard_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "GIGBOARD_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "GIGBOARD_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "GIGBOARD_DATABASE_TIMEOUT_SECS"),
    ));

    let bot_token = redact_token(config.telegram.bot_token.expose_secret());
    lines.push(render_line(
        "telegram.bot_token",
        &bot_token,
        source("telegram.bot_token", "GIGBOARD_TELEGRAM_BOT_TOKEN"),
    ));
    lines.push(render_line(
        "telegram.api_base_url",
        &config.telegram.api_base_url,
        source("telegram.api_base_url", "GIGBOARD_TELEGRAM_API_BASE_URL"),
    ));
    lines.push(render_line(
        "telegram.timeout_secs",
        &config.telegram.timeout_secs.to_string(),
        source("telegram.timeout_secs", "GIGBOARD_TELEGRAM_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "telegram.poll_timeout_secs",
        &config.telegram.poll_timeout_secs.to_string(),
        source("telegram.poll_timeout_secs", "GIGBOARD_TELEGRAM_POLL_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "channel.chat_id",
        &config.channel.chat_id.to_string(),
        source("channel.chat_id", "GIGBOARD_CHANNEL_CHAT_ID"),
    ));
    lines.push(render_line(
        "channel.invite_url",
        config.channel.invite_url.as_deref().unwrap_or("<unset>"),
        source("channel.invite_url", "GIGBOARD_CHANNEL_INVITE_URL"),
    ));

    let admin_ids =
        config.admin.user_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
    lines.push(render_line(
        "admin.user_ids",
        &admin_ids,
        source("admin.user_ids", "GIGBOARD_ADMIN_USER_IDS"),
    ));
    let notify = config
        .admin
        .notify_user_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(render_line(
        "admin.notify_user_id",
        &notify,
        source("admin.notify_user_id", "GIGBOARD_ADMIN_NOTIFY_USER_ID"),
    ));

    lines.push(render_line(
        "submission.dedup_window_secs",
        &config.submission.dedup_window_secs.to_string(),
        source("submission.dedup_window_secs", "GIGBOARD_SUBMISSION_DEDUP_WINDOW_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "GIGBOARD_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", "GIGBOARD_SERVER_HEALTH_CHECK_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "GIGBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "GIGBOARD_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "GIGBOARD_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("gigboard.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/gigboard.toml");
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
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
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

/// Keeps the numeric bot id visible for support while hiding the secret
/// half of the token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}
