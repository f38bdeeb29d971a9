use std::sync::Arc;

use crate::commands::CommandResult;
use gigboard_core::config::{AppConfig, LoadOptions};
use gigboard_db::repositories::{SqlJobRepository, SqlUserRepository};
use gigboard_db::connect_from_config;
use gigboard_service::AdminService;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "stats",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "stats",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let admin = AdminService::new(
            Arc::new(SqlUserRepository::new(pool.clone())),
            Arc::new(SqlJobRepository::new(pool.clone())),
        );
        let stats =
            admin.stats().await.map_err(|error| ("storage", error.to_string(), 5u8))?;
        pool.close().await;

        Ok::<String, (&'static str, String, u8)>(format!(
            "users={} live_jobs={} active_subscriptions={} permanent_grantees={}",
            stats.total_users,
            stats.live_jobs,
            stats.active_subscriptions,
            stats.permanent_grantees
        ))
    });

    match result {
        Ok(summary) => CommandResult::success("stats", summary),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("stats", error_class, message, exit_code)
        }
    }
}
