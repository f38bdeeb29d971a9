use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use gigboard_core::config::{AppConfig, ConfigError, LoadOptions};
use gigboard_db::repositories::{SqlJobRepository, SqlUserRepository};
use gigboard_db::{connect_from_config, migrations, DbPool};
use gigboard_service::{
    build_dispatcher, AdminService, BotDeps, LifecycleService, ReferralService,
    TelegramOpsNotifier,
};
use gigboard_telegram::api::{ApiError, BotApi};
use gigboard_telegram::gateway::TelegramChannelGateway;
use gigboard_telegram::updates::{LongPollTransport, PollRunner, ReconnectPolicy};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: Arc<BotApi>,
    pub lifecycle: Arc<LifecycleService>,
    pub referrals: Arc<ReferralService>,
    pub admin: Arc<AdminService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("telegram client initialization failed: {0}")]
    Api(#[source] ApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires storage and domain services. Everything here is local; the first
/// network call happens when the update runner is built.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let api = Arc::new(BotApi::new(&config.telegram).map_err(BootstrapError::Api)?);
    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let jobs = Arc::new(SqlJobRepository::new(db_pool.clone()));
    let gateway = Arc::new(TelegramChannelGateway::new(api.clone(), config.channel.chat_id));
    let notifier = Arc::new(TelegramOpsNotifier::new(api.clone(), config.escalation_user_id()));

    let lifecycle = Arc::new(LifecycleService::new(
        users.clone(),
        jobs.clone(),
        gateway,
        notifier,
        config.submission.dedup_window_secs,
    ));
    let referrals = Arc::new(ReferralService::new(users.clone()));
    let admin = Arc::new(AdminService::new(users, jobs));
    info!(event_name = "system.bootstrap.services_wired", "domain services constructed");

    Ok(Application { config, db_pool, api, lifecycle, referrals, admin })
}

impl Application {
    /// Resolves the bot identity and assembles the long-poll runner. The
    /// `getMe` call doubles as the startup credentials check.
    pub async fn build_runner(&self) -> Result<PollRunner, BootstrapError> {
        let me = self.api.get_me().await.map_err(BootstrapError::Api)?;
        let bot_username = me.username.unwrap_or_default();
        info!(
            event_name = "system.bootstrap.identity_resolved",
            bot = %bot_username,
            "telegram identity confirmed"
        );

        let dispatcher = build_dispatcher(BotDeps {
            lifecycle: self.lifecycle.clone(),
            referrals: self.referrals.clone(),
            admin: self.admin.clone(),
            api: self.api.clone(),
            admin_user_ids: self.config.admin.user_ids.clone(),
            invite_url: self.config.channel.invite_url.clone(),
            bot_username,
        });
        let transport = Arc::new(LongPollTransport::new(
            self.api.clone(),
            self.config.telegram.poll_timeout_secs,
        ));

        Ok(PollRunner::new(transport, dispatcher, ReconnectPolicy::default()))
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    use gigboard_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_a_malformed_bot_token() {
        let _guard = env_lock().lock().expect("env mutex");

        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                bot_token: Some("not-a-token".to_string()),
                channel_chat_id: Some(-1001234567890),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("expected config rejection").to_string();
        assert!(message.contains("telegram.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_services() {
        let _guard = env_lock().lock().expect("env mutex");
        env::set_var("GIGBOARD_ADMIN_USER_IDS", "11");
        env::set_var("GIGBOARD_DATABASE_MAX_CONNECTIONS", "1");

        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                bot_token: Some("123456789:test-token".to_string()),
                channel_chat_id: Some(-1001234567890),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        env::remove_var("GIGBOARD_ADMIN_USER_IDS");
        env::remove_var("GIGBOARD_DATABASE_MAX_CONNECTIONS");

        let app = result.expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('users', 'jobs', 'referral_edges')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 3, "bootstrap should expose the posting-path tables");

        let stats = app.admin.stats().await.expect("stats over the fresh schema");
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.live_jobs, 0);

        app.db_pool.close().await;
    }
}
