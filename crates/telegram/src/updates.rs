use std::collections::VecDeque;
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{BotApi, Update};
use crate::events::{classify, EventContext, EventDispatcher, HandlerResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport poll failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport reply failed: {0}")]
    Send(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Blocks until an update arrives; `None` means the stream is closed.
    async fn next_update(&self) -> Result<Option<Update>, TransportError>;
    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError>;
    async fn send_reply(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;
}

/// `getUpdates` long-polling. Updates are confirmed by advancing the
/// offset on the next poll, so anything fetched but not yet acknowledged
/// is re-delivered after a crash (at-least-once).
pub struct LongPollTransport {
    api: Arc<BotApi>,
    poll_timeout_secs: u64,
    state: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    offset: i64,
    buffer: VecDeque<Update>,
}

impl LongPollTransport {
    pub fn new(api: Arc<BotApi>, poll_timeout_secs: u64) -> Self {
        Self { api, poll_timeout_secs, state: Mutex::new(PollState::default()) }
    }
}

#[async_trait]
impl UpdateTransport for LongPollTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let me = self
            .api
            .get_me()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        info!(bot = me.username.as_deref().unwrap_or("unknown"), "telegram transport ready");
        Ok(())
    }

    async fn next_update(&self) -> Result<Option<Update>, TransportError> {
        loop {
            let offset = {
                let mut state = self.state.lock().await;
                if let Some(update) = state.buffer.pop_front() {
                    return Ok(Some(update));
                }
                state.offset
            };

            let batch = self
                .api
                .get_updates(offset, self.poll_timeout_secs)
                .await
                .map_err(|error| TransportError::Receive(error.to_string()))?;

            let mut state = self.state.lock().await;
            state.buffer.extend(batch);
        }
    }

    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.offset = state.offset.max(update_id + 1);
        Ok(())
    }

    async fn send_reply(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.api
            .send_message(chat_id, text)
            .await
            .map(|_| ())
            .map_err(|error| TransportError::Send(error.to_string()))
    }
}

pub struct PollRunner {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl PollRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "update transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "update transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening update transport connection");
        self.transport.connect().await?;
        info!(attempt, "update transport connected");

        loop {
            let Some(update) = self.transport.next_update().await? else {
                info!(attempt, "update stream closed");
                return Ok(());
            };

            let event = classify(&update);
            debug!(
                update_id = update.update_id,
                event_type = ?event.event_type(),
                "received update"
            );

            let context = EventContext { update_id: update.update_id };
            match self.dispatcher.dispatch(&event, &context).await {
                Ok(HandlerResult::Replied { chat_id, text }) => {
                    if let Err(error) = self.transport.send_reply(chat_id, &text).await {
                        warn!(
                            update_id = update.update_id,
                            chat_id,
                            error = %error,
                            "failed to deliver reply"
                        );
                    }
                }
                Ok(HandlerResult::Processed) | Ok(HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        update_id = update.update_id,
                        error = %error,
                        "event dispatch failed; continuing poll loop"
                    );
                }
            }

            if let Err(error) = self.transport.acknowledge(update.update_id).await {
                warn!(update_id = update.update_id, error = %error, "failed to acknowledge update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::api::{ChatKind, ChatRef, IncomingMessage, Update, UserRef};
    use crate::events::{
        CommandEvent, CommandHandler, CommandService, EventContext, EventDispatcher,
        EventHandlerError,
    };

    use super::{PollRunner, ReconnectPolicy, TransportError, UpdateTransport};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        updates: VecDeque<Result<Option<Update>, TransportError>>,
        connect_attempts: usize,
        acknowledged: Vec<i64>,
        replies: Vec<(i64, String)>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            updates: Vec<Result<Option<Update>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    updates: updates.into(),
                    connect_attempts: 0,
                    acknowledged: Vec::new(),
                    replies: Vec::new(),
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledged(&self) -> Vec<i64> {
            self.state.lock().await.acknowledged.clone()
        }

        async fn replies(&self) -> Vec<(i64, String)> {
            self.state.lock().await.replies.clone()
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_update(&self) -> Result<Option<Update>, TransportError> {
            let mut state = self.state.lock().await;
            state.updates.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
            self.state.lock().await.acknowledged.push(update_id);
            Ok(())
        }

        async fn send_reply(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
            self.state.lock().await.replies.push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct StaticReplyService;

    #[async_trait]
    impl CommandService for StaticReplyService {
        async fn handle_command(
            &self,
            _event: &CommandEvent,
            _ctx: &EventContext,
        ) -> Result<Option<String>, EventHandlerError> {
            Ok(Some("hello".to_string()))
        }
    }

    fn command_update(update_id: i64) -> Update {
        Update {
            update_id,
            message: Some(IncomingMessage {
                message_id: update_id * 10,
                from: Some(UserRef { id: 5, is_bot: false, username: Some("ada".into()) }),
                chat: ChatRef { id: 5, kind: ChatKind::Private },
                text: Some("/start".to_string()),
                new_chat_members: Vec::new(),
                left_chat_member: None,
            }),
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(command_update(1))), Ok(None)],
        ));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(CommandHandler::new(StaticReplyService));

        let runner = PollRunner::new(
            transport.clone(),
            dispatcher,
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledged().await, vec![1]);
        assert_eq!(transport.replies().await, vec![(5, "hello".to_string())]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = PollRunner::new(
            transport.clone(),
            EventDispatcher::new(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn unhandled_updates_are_still_acknowledged() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(command_update(4))), Ok(Some(command_update(5))), Ok(None)],
        ));

        let runner = PollRunner::new(
            transport.clone(),
            EventDispatcher::new(),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");
        assert_eq!(transport.acknowledged().await, vec![4, 5]);
        assert!(transport.replies().await.is_empty());
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(1).as_millis(), 200);
        assert_eq!(policy.backoff(2).as_millis(), 400);
        assert_eq!(policy.backoff(5).as_millis(), 1_000);
        assert_eq!(policy.backoff(63).as_millis(), 1_000);
    }
}
