use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use gigboard_cli::commands::grant::{self, GrantRequest};
use gigboard_cli::commands::{migrate, stats, user};
use gigboard_core::domain::user::UserId;
use gigboard_db::connect_with_settings;
use gigboard_db::repositories::{SqlUserRepository, UserRepository};
use serde_json::Value;
use tempfile::TempDir;

const VALID_BASE: &[(&str, &str)] = &[
    ("GIGBOARD_TELEGRAM_BOT_TOKEN", "123456789:test-token"),
    ("GIGBOARD_CHANNEL_CHAT_ID", "-1001234567890"),
    ("GIGBOARD_ADMIN_USER_IDS", "11"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    let mut vars = VALID_BASE.to_vec();
    vars.push(("GIGBOARD_DATABASE_URL", "sqlite::memory:"));

    with_env(&vars, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_token() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn grant_flow_updates_the_ledger_end_to_end() {
    let dir = TempDir::new().expect("create temp dir");
    let db_path = dir.path().join("gigboard.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let mut vars = VALID_BASE.to_vec();
    vars.push(("GIGBOARD_DATABASE_URL", db_url.as_str()));

    with_env(&vars, || {
        assert_eq!(migrate::run().exit_code, 0, "expected schema to apply");
        seed_user(&db_url, UserId(777), Some("ada"));

        let granted = grant::run(GrantRequest::Credit { identifier: "@ada".to_string() });
        assert_eq!(granted.exit_code, 0, "expected grant to land");
        let payload = parse_payload(&granted.output);
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("@ada"));
        assert!(message.contains("balance 1"));

        let shown = user::run("@ada");
        assert_eq!(shown.exit_code, 0, "expected user lookup to succeed");
        let payload = parse_payload(&shown.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("user 777"));
        assert!(message.contains("credits=1"));
    });
}

#[test]
fn grant_reports_unknown_users() {
    let dir = TempDir::new().expect("create temp dir");
    let db_path = dir.path().join("gigboard.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let mut vars = VALID_BASE.to_vec();
    vars.push(("GIGBOARD_DATABASE_URL", db_url.as_str()));

    with_env(&vars, || {
        assert_eq!(migrate::run().exit_code, 0, "expected schema to apply");

        let result = grant::run(GrantRequest::Permanent { identifier: "424242".to_string() });
        assert_eq!(result.exit_code, 7, "expected unknown-user failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "user_not_found");
    });
}

#[test]
fn grant_rejects_malformed_identifiers() {
    let mut vars = VALID_BASE.to_vec();
    vars.push(("GIGBOARD_DATABASE_URL", "sqlite::memory:"));

    with_env(&vars, || {
        let result = grant::run(GrantRequest::Credit { identifier: "not/a/user".to_string() });
        assert_eq!(result.exit_code, 6, "expected invalid identifier failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_identifier");
    });
}

#[test]
fn stats_report_the_current_ledger() {
    let dir = TempDir::new().expect("create temp dir");
    let db_path = dir.path().join("gigboard.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let mut vars = VALID_BASE.to_vec();
    vars.push(("GIGBOARD_DATABASE_URL", db_url.as_str()));

    with_env(&vars, || {
        assert_eq!(migrate::run().exit_code, 0, "expected schema to apply");
        seed_user(&db_url, UserId(101), None);

        let result = stats::run();
        assert_eq!(result.exit_code, 0, "expected stats to succeed");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "stats");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("users=1"));
        assert!(message.contains("live_jobs=0"));
    });
}

fn seed_user(db_url: &str, id: UserId, username: Option<&str>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build seed runtime");
    runtime.block_on(async {
        let pool = connect_with_settings(db_url, 1, 30).await.expect("connect seed pool");
        let users = SqlUserRepository::new(pool.clone());
        users.ensure_user(id, username, Utc::now()).await.expect("seed user row");
        pool.close().await;
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "GIGBOARD_DATABASE_URL",
        "GIGBOARD_DATABASE_MAX_CONNECTIONS",
        "GIGBOARD_DATABASE_TIMEOUT_SECS",
        "GIGBOARD_TELEGRAM_BOT_TOKEN",
        "GIGBOARD_TELEGRAM_API_BASE_URL",
        "GIGBOARD_TELEGRAM_TIMEOUT_SECS",
        "GIGBOARD_TELEGRAM_POLL_TIMEOUT_SECS",
        "GIGBOARD_CHANNEL_CHAT_ID",
        "GIGBOARD_CHANNEL_INVITE_URL",
        "GIGBOARD_ADMIN_USER_IDS",
        "GIGBOARD_ADMIN_NOTIFY_USER_ID",
        "GIGBOARD_SUBMISSION_DEDUP_WINDOW_SECS",
        "GIGBOARD_SERVER_BIND_ADDRESS",
        "GIGBOARD_SERVER_HEALTH_CHECK_PORT",
        "GIGBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "GIGBOARD_LOGGING_LEVEL",
        "GIGBOARD_LOGGING_FORMAT",
        "GIGBOARD_LOG_LEVEL",
        "GIGBOARD_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
