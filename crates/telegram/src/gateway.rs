use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use gigboard_core::domain::job::ChannelMessageId;

use crate::api::BotApi;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("channel publish failed: {0}")]
    Publish(String),
    #[error("channel edit failed: {0}")]
    Edit(String),
    #[error("channel delete failed: {0}")]
    Delete(String),
}

/// Broadcast capability the lifecycle controller consumes. One managed
/// destination; the message handle is the only state shared with it.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    async fn publish(&self, text: &str) -> Result<ChannelMessageId, GatewayError>;
    async fn edit(&self, message: ChannelMessageId, text: &str) -> Result<(), GatewayError>;
    /// Idempotent: deleting an already-deleted message succeeds.
    async fn delete(&self, message: ChannelMessageId) -> Result<(), GatewayError>;
}

pub struct TelegramChannelGateway {
    api: Arc<BotApi>,
    chat_id: i64,
}

impl TelegramChannelGateway {
    pub fn new(api: Arc<BotApi>, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl ChannelGateway for TelegramChannelGateway {
    async fn publish(&self, text: &str) -> Result<ChannelMessageId, GatewayError> {
        let sent = self
            .api
            .send_message(self.chat_id, text)
            .await
            .map_err(|error| GatewayError::Publish(error.to_string()))?;
        Ok(ChannelMessageId(sent.message_id))
    }

    async fn edit(&self, message: ChannelMessageId, text: &str) -> Result<(), GatewayError> {
        self.api
            .edit_message_text(self.chat_id, message.0, text)
            .await
            .map_err(|error| GatewayError::Edit(error.to_string()))
    }

    async fn delete(&self, message: ChannelMessageId) -> Result<(), GatewayError> {
        self.api
            .delete_message(self.chat_id, message.0)
            .await
            .map_err(|error| GatewayError::Delete(error.to_string()))
    }
}

#[derive(Default)]
pub struct NoopChannelGateway;

#[async_trait]
impl ChannelGateway for NoopChannelGateway {
    async fn publish(&self, _text: &str) -> Result<ChannelMessageId, GatewayError> {
        Ok(ChannelMessageId(0))
    }

    async fn edit(&self, _message: ChannelMessageId, _text: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn delete(&self, _message: ChannelMessageId) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Records every call and hands out scripted failures. Lives in the
/// library so downstream crates can drive their tests against it.
#[derive(Default)]
pub struct RecordingChannelGateway {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    next_message_id: i64,
    published: Vec<(ChannelMessageId, String)>,
    edited: Vec<(ChannelMessageId, String)>,
    deleted: Vec<ChannelMessageId>,
    publish_failures: Vec<GatewayError>,
    edit_failures: Vec<GatewayError>,
    delete_failures: Vec<GatewayError>,
}

impl RecordingChannelGateway {
    pub async fn fail_next_publish(&self, error: GatewayError) {
        self.state.lock().await.publish_failures.push(error);
    }

    pub async fn fail_next_edit(&self, error: GatewayError) {
        self.state.lock().await.edit_failures.push(error);
    }

    pub async fn fail_next_delete(&self, error: GatewayError) {
        self.state.lock().await.delete_failures.push(error);
    }

    pub async fn published(&self) -> Vec<(ChannelMessageId, String)> {
        self.state.lock().await.published.clone()
    }

    pub async fn edited(&self) -> Vec<(ChannelMessageId, String)> {
        self.state.lock().await.edited.clone()
    }

    pub async fn deleted(&self) -> Vec<ChannelMessageId> {
        self.state.lock().await.deleted.clone()
    }
}

#[async_trait]
impl ChannelGateway for RecordingChannelGateway {
    async fn publish(&self, text: &str) -> Result<ChannelMessageId, GatewayError> {
        let mut state = self.state.lock().await;
        if !state.publish_failures.is_empty() {
            return Err(state.publish_failures.remove(0));
        }
        state.next_message_id += 1;
        let message = ChannelMessageId(state.next_message_id);
        state.published.push((message, text.to_string()));
        Ok(message)
    }

    async fn edit(&self, message: ChannelMessageId, text: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if !state.edit_failures.is_empty() {
            return Err(state.edit_failures.remove(0));
        }
        state.edited.push((message, text.to_string()));
        Ok(())
    }

    async fn delete(&self, message: ChannelMessageId) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        if !state.delete_failures.is_empty() {
            return Err(state.delete_failures.remove(0));
        }
        state.deleted.push(message);
        Ok(())
    }
}
