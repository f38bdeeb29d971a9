use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use gigboard_core::config::TelegramConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("telegram transport failure: {0}")]
    Transport(String),
    #[error("telegram rejected the call: {0}")]
    Rejected(String),
    #[error("telegram response could not be decoded: {0}")]
    Decode(String),
}

/// One inbound update from `getUpdates`. Only `message` carriers are
/// consumed; everything else dispatches as unsupported.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<UserRef>,
    pub chat: ChatRef,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub new_chat_members: Vec<UserRef>,
    #[serde(default)]
    pub left_chat_member: Option<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRef {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRef {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

pub struct BotApi {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl BotApi {
    pub fn new(config: &TelegramConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ApiError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        })
    }

    pub async fn get_me(&self) -> Result<UserRef, ApiError> {
        self.call("getMe", &json!({}), None).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<SentMessage, ApiError> {
        self.call(
            "sendMessage",
            &json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
            None,
        )
        .await
    }

    /// Editing to identical content is reported as unmodified by the API
    /// and treated here as success.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ApiError> {
        let result: Result<serde_json::Value, ApiError> = self
            .call(
                "editMessageText",
                &json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
                None,
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(ApiError::Rejected(description)) if is_unmodified_edit(&description) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Deleting an already-deleted message is success, matching the
    /// idempotent delete contract of the broadcast surface.
    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        let result: Result<bool, ApiError> = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
                None,
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(ApiError::Rejected(description)) if is_missing_message(&description) => Ok(()),
            Err(error) => Err(error),
        }
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout_secs: u64,
    ) -> Result<Vec<Update>, ApiError> {
        // The request has to outlive the server-side long-poll window.
        let request_timeout = Duration::from_secs(poll_timeout_secs + 10);
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
            Some(request_timeout),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        debug!(method, "calling telegram bot api");

        let url = format!("{}/bot{}/{method}", self.base_url, self.token.expose_secret());
        let mut request = self.http.post(url).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response =
            request.send().await.map_err(|error| ApiError::Transport(error.to_string()))?;
        let body =
            response.text().await.map_err(|error| ApiError::Transport(error.to_string()))?;

        decode_response(&body)
    }
}

fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    #[derive(Deserialize)]
    #[serde(bound(deserialize = "T: DeserializeOwned"))]
    struct Envelope<T> {
        ok: bool,
        #[serde(default)]
        result: Option<T>,
        #[serde(default)]
        description: Option<String>,
    }

    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|error| ApiError::Decode(error.to_string()))?;

    if !envelope.ok {
        return Err(ApiError::Rejected(
            envelope.description.unwrap_or_else(|| "no error description".to_string()),
        ));
    }
    envelope.result.ok_or_else(|| ApiError::Decode("missing result payload".to_string()))
}

fn is_missing_message(description: &str) -> bool {
    description.contains("message to delete not found")
}

fn is_unmodified_edit(description: &str) -> bool {
    description.contains("message is not modified")
}

#[cfg(test)]
mod tests {
    use super::{decode_response, ApiError, ChatKind, SentMessage, Update};

    #[test]
    fn decodes_successful_envelopes() {
        let sent: SentMessage =
            decode_response(r#"{"ok":true,"result":{"message_id":42}}"#).expect("decode");
        assert_eq!(sent.message_id, 42);
    }

    #[test]
    fn rejected_envelopes_carry_the_description() {
        let result: Result<bool, ApiError> = decode_response(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message to delete not found"}"#,
        );
        assert_eq!(
            result,
            Err(ApiError::Rejected("Bad Request: message to delete not found".to_string()))
        );
        assert!(super::is_missing_message("Bad Request: message to delete not found"));
        assert!(super::is_unmodified_edit("Bad Request: message is not modified: ..."));
    }

    #[test]
    fn malformed_bodies_surface_as_decode_errors() {
        let result: Result<bool, ApiError> = decode_response("not json");
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[test]
    fn updates_decode_message_service_fields() {
        let body = r#"{"ok":true,"result":[
            {"update_id":7,"message":{
                "message_id":100,
                "from":{"id":5,"is_bot":false,"username":"ada"},
                "chat":{"id":5,"type":"private"},
                "text":"/start"
            }},
            {"update_id":8,"message":{
                "message_id":101,
                "from":{"id":5,"is_bot":false},
                "chat":{"id":-100200,"type":"supergroup"},
                "new_chat_members":[{"id":6,"is_bot":false,"username":"newbie"}]
            }},
            {"update_id":9}
        ]}"#;

        let updates: Vec<Update> = decode_response(body).expect("decode");
        assert_eq!(updates.len(), 3);

        let first = updates[0].message.as_ref().expect("message");
        assert_eq!(first.chat.kind, ChatKind::Private);
        assert_eq!(first.text.as_deref(), Some("/start"));

        let second = updates[1].message.as_ref().expect("message");
        assert_eq!(second.chat.kind, ChatKind::Supergroup);
        assert_eq!(second.new_chat_members.len(), 1);
        assert_eq!(second.new_chat_members[0].username.as_deref(), Some("newbie"));

        assert!(updates[2].message.is_none());
    }
}
