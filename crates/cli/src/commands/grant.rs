use std::sync::Arc;

use crate::commands::CommandResult;
use gigboard_core::config::{AppConfig, LoadOptions};
use gigboard_core::domain::user::User;
use gigboard_core::errors::AdminError;
use gigboard_db::repositories::{SqlJobRepository, SqlUserRepository};
use gigboard_db::connect_from_config;
use gigboard_service::AdminService;

#[derive(Clone, Debug)]
pub enum GrantRequest {
    Permanent { identifier: String },
    Subscription { identifier: String, days: u32 },
    Credit { identifier: String },
}

pub fn run(request: GrantRequest) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "grant",
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
                "grant",
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

        let summary = match &request {
            GrantRequest::Permanent { identifier } => {
                let user = admin.grant_permanent(identifier).await.map_err(classify)?;
                format!("permanent grant set for {}", display_user(&user))
            }
            GrantRequest::Subscription { identifier, days } => {
                let user = admin.grant_subscription(identifier, *days).await.map_err(classify)?;
                let until = user
                    .subscription_until
                    .map(|until| until.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "<unset>".to_string());
                format!("subscription for {} runs until {until}", display_user(&user))
            }
            GrantRequest::Credit { identifier } => {
                let user = admin.grant_credit(identifier).await.map_err(classify)?;
                format!(
                    "posting credit added for {} (balance {})",
                    display_user(&user),
                    user.credited_posts
                )
            }
        };

        pool.close().await;
        Ok::<String, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success("grant", summary),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("grant", error_class, message, exit_code)
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

fn display_user(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{username}"),
        None => format!("user {}", user.id),
    }
}
