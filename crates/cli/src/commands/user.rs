use std::sync::Arc;

use crate::commands::CommandResult;
use gigboard_core::config::{AppConfig, LoadOptions};
use gigboard_core::errors::AdminError;
use gigboard_core::referral::BONUS_THRESHOLD;
use gigboard_db::repositories::{SqlJobRepository, SqlUserRepository};
use gigboard_db::connect_from_config;
use gigboard_service::AdminService;

pub fn run(identifier: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "user",
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
                "user",
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
        let detail = admin.user_info(identifier).await.map_err(classify)?;
        pool.close().await;

        let handle = detail.user.username.as_deref().unwrap_or("<none>");
        let subscription = detail
            .user
            .subscription_until
            .map(|until| until.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "<none>".to_string());
        Ok::<String, (&'static str, String, u8)>(format!(
            "user {} handle={} live_jobs={} credits={} subscription_until={} permanent={} \
             referrals={} (progress {}/{BONUS_THRESHOLD})",
            detail.user.id,
            handle,
            detail.live_jobs,
            detail.user.credited_posts,
            subscription,
            detail.user.permanent_grant,
            detail.user.referral_count,
            detail.referral_progress,
        ))
    });

    match result {
        Ok(summary) => CommandResult::success("user", summary),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("user", error_class, message, exit_code)
        }
    }
}

fn classify(error: AdminError) -> (&'static str, String, u8) {
    match &error {
        AdminError::InvalidIdentifier(_) => ("invalid_identifier", error.to_string(), 6),
        AdminError::UserNotFound(_) => ("user_not_found", error.to_string(), 7),
        AdminError::Storage(_) => ("storage", error.to_string(), 5),
    }
}
