use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, warn};

use gigboard_telegram::api::BotApi;

/// Escalation channel for state the bot cannot repair on its own, such as
/// a channel message surviving a failed commit. Delivery is best-effort;
/// every escalation also lands in the log.
#[async_trait]
pub trait OpsNotifier: Send + Sync {
    async fn escalate(&self, summary: &str);
}

/// Direct-messages the configured operator. Without a target the log
/// entry is the whole escalation.
pub struct TelegramOpsNotifier {
    api: Arc<BotApi>,
    operator_chat_id: Option<i64>,
}

impl TelegramOpsNotifier {
    pub fn new(api: Arc<BotApi>, operator_chat_id: Option<i64>) -> Self {
        Self { api, operator_chat_id }
    }
}

#[async_trait]
impl OpsNotifier for TelegramOpsNotifier {
    async fn escalate(&self, summary: &str) {
        error!(summary, "operator escalation");
        let Some(chat_id) = self.operator_chat_id else {
            return;
        };

        let text = format!("⚠️ {summary}");
        if let Err(send_error) = self.api.send_message(chat_id, &text).await {
            warn!(%send_error, "operator escalation could not be delivered");
        }
    }
}

/// Collects escalations for assertions.
#[derive(Default)]
pub struct RecordingOpsNotifier {
    escalations: Mutex<Vec<String>>,
}

impl RecordingOpsNotifier {
    pub async fn escalations(&self) -> Vec<String> {
        self.escalations.lock().await.clone()
    }
}

#[async_trait]
impl OpsNotifier for RecordingOpsNotifier {
    async fn escalate(&self, summary: &str) {
        self.escalations.lock().await.push(summary.to_string());
    }
}
