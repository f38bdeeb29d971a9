use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::api::{ChatKind, Update, UserRef};
use crate::parse;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub update_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotEvent {
    Command(CommandEvent),
    Form(FormEvent),
    MembersJoined(MembersJoinedEvent),
    MemberLeft(MemberLeftEvent),
    GroupMessage(GroupMessageEvent),
    Unsupported { reason: &'static str },
}

impl BotEvent {
    pub fn event_type(&self) -> BotEventType {
        match self {
            Self::Command(_) => BotEventType::Command,
            Self::Form(_) => BotEventType::Form,
            Self::MembersJoined(_) => BotEventType::MembersJoined,
            Self::MemberLeft(_) => BotEventType::MemberLeft,
            Self::GroupMessage(_) => BotEventType::GroupMessage,
            Self::Unsupported { .. } => BotEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotEventType {
    Command,
    Form,
    MembersJoined,
    MemberLeft,
    GroupMessage,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEvent {
    pub chat_id: i64,
    pub sender: UserRef,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormEvent {
    pub chat_id: i64,
    pub sender: UserRef,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembersJoinedEvent {
    pub chat_id: i64,
    pub inviter: UserRef,
    pub members: Vec<UserRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberLeftEvent {
    pub chat_id: i64,
    pub member: UserRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMessageEvent {
    pub chat_id: i64,
    pub message_id: i64,
    pub sender: UserRef,
}

/// Sorts one polled update into the event the dispatcher understands.
/// Service messages (joins, leaves) win over text classification.
pub fn classify(update: &Update) -> BotEvent {
    let Some(message) = &update.message else {
        return BotEvent::Unsupported { reason: "no message carrier" };
    };

    if !message.new_chat_members.is_empty() {
        let Some(inviter) = &message.from else {
            return BotEvent::Unsupported { reason: "join without a visible inviter" };
        };
        let members: Vec<UserRef> =
            message.new_chat_members.iter().filter(|member| !member.is_bot).cloned().collect();
        if members.is_empty() {
            return BotEvent::Unsupported { reason: "only bots joined" };
        }
        return BotEvent::MembersJoined(MembersJoinedEvent {
            chat_id: message.chat.id,
            inviter: inviter.clone(),
            members,
        });
    }

    if let Some(member) = &message.left_chat_member {
        if member.is_bot {
            return BotEvent::Unsupported { reason: "a bot left" };
        }
        return BotEvent::MemberLeft(MemberLeftEvent {
            chat_id: message.chat.id,
            member: member.clone(),
        });
    }

    let Some(sender) = &message.from else {
        return BotEvent::Unsupported { reason: "no sender" };
    };

    match message.chat.kind {
        ChatKind::Private => {
            let Some(text) = message.text.as_deref() else {
                return BotEvent::Unsupported { reason: "non-text private message" };
            };
            if text.trim_start().starts_with('/') {
                return BotEvent::Command(CommandEvent {
                    chat_id: message.chat.id,
                    sender: sender.clone(),
                    text: text.to_string(),
                });
            }
            if parse::looks_like_form(text) {
                return BotEvent::Form(FormEvent {
                    chat_id: message.chat.id,
                    sender: sender.clone(),
                    text: text.to_string(),
                });
            }
            BotEvent::Unsupported { reason: "private chatter" }
        }
        ChatKind::Group | ChatKind::Supergroup => BotEvent::GroupMessage(GroupMessageEvent {
            chat_id: message.chat.id,
            message_id: message.message_id,
            sender: sender.clone(),
        }),
        ChatKind::Channel | ChatKind::Unknown => {
            BotEvent::Unsupported { reason: "unmanaged chat kind" }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Post,
    List,
    Delete { job_id: i64 },
    Edit { job_id: i64, form: String },
    Stats,
    UserInfo { identifier: String },
    Grant(GrantCommand),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantCommand {
    Permanent { identifier: String },
    Subscription { identifier: String, days: u32 },
    Credit { identifier: String },
}

pub const DEFAULT_SUBSCRIPTION_DAYS: u32 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command `/{0}`")]
    Unknown(String),
    #[error("`/{command}` needs {expected}")]
    MissingArgument { command: &'static str, expected: &'static str },
    #[error("`{0}` is not a listing id")]
    InvalidJobId(String),
    #[error("`{0}` is not a whole number of days")]
    InvalidDays(String),
    #[error("unknown grant kind `{0}`")]
    UnknownGrantKind(String),
    #[error("`/edit` needs the replacement form below the command line")]
    MissingEditForm,
}

impl CommandParseError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Unknown(_) => "I don't know that command. Send /start for the menu.".to_string(),
            Self::MissingArgument { command, expected } => {
                format!("Send /{command} followed by {expected}.")
            }
            Self::InvalidJobId(raw) => {
                format!("`{raw}` is not a listing id. Use /list to see your listing ids.")
            }
            Self::InvalidDays(raw) => format!("`{raw}` is not a whole number of days."),
            Self::UnknownGrantKind(raw) => {
                format!("`{raw}` is not a grant kind. Use permanent, subscription or credit.")
            }
            Self::MissingEditForm => {
                "Put the replacement form on the lines below /edit <id>.".to_string()
            }
        }
    }
}

/// Parses a `/command` message. Arguments live on the first line; `/edit`
/// additionally takes the replacement form on the lines after it.
pub fn parse_command(text: &str) -> Result<BotCommand, CommandParseError> {
    let text = text.trim();
    let (first_line, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first.trim(), rest.trim()),
        None => (text, ""),
    };

    let mut words = first_line.split_whitespace();
    let command_word = words.next().unwrap_or_default();
    // Group-style `/cmd@botname` arrives with the handle attached.
    let name = command_word
        .strip_prefix('/')
        .unwrap_or(command_word)
        .split('@')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match name.as_str() {
        "start" => Ok(BotCommand::Start),
        "post" => Ok(BotCommand::Post),
        "list" => Ok(BotCommand::List),
        "delete" => {
            let raw = words.next().ok_or(CommandParseError::MissingArgument {
                command: "delete",
                expected: "a listing id",
            })?;
            Ok(BotCommand::Delete { job_id: parse_job_id(raw)? })
        }
        "edit" => {
            let raw = words.next().ok_or(CommandParseError::MissingArgument {
                command: "edit",
                expected: "a listing id",
            })?;
            let job_id = parse_job_id(raw)?;
            if rest.is_empty() {
                return Err(CommandParseError::MissingEditForm);
            }
            Ok(BotCommand::Edit { job_id, form: rest.to_string() })
        }
        "stats" => Ok(BotCommand::Stats),
        "user" => {
            let identifier = words.next().ok_or(CommandParseError::MissingArgument {
                command: "user",
                expected: "a user id or @handle",
            })?;
            Ok(BotCommand::UserInfo { identifier: identifier.to_string() })
        }
        "grant" => {
            let kind = words.next().ok_or(CommandParseError::MissingArgument {
                command: "grant",
                expected: "a grant kind and a user id or @handle",
            })?;
            let identifier = words
                .next()
                .ok_or(CommandParseError::MissingArgument {
                    command: "grant",
                    expected: "a user id or @handle",
                })?
                .to_string();

            match kind.to_ascii_lowercase().as_str() {
                "permanent" => Ok(BotCommand::Grant(GrantCommand::Permanent { identifier })),
                "subscription" => {
                    let days = match words.next() {
                        Some(raw) => raw
                            .parse::<u32>()
                            .map_err(|_| CommandParseError::InvalidDays(raw.to_string()))?,
                        None => DEFAULT_SUBSCRIPTION_DAYS,
                    };
                    Ok(BotCommand::Grant(GrantCommand::Subscription { identifier, days }))
                }
                "credit" => Ok(BotCommand::Grant(GrantCommand::Credit { identifier })),
                other => Err(CommandParseError::UnknownGrantKind(other.to_string())),
            }
        }
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

fn parse_job_id(raw: &str) -> Result<i64, CommandParseError> {
    raw.trim_start_matches('#')
        .parse::<i64>()
        .map_err(|_| CommandParseError::InvalidJobId(raw.to_string()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Replied { chat_id: i64, text: String },
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("command handling failed: {0}")]
    Command(String),
    #[error("form handling failed: {0}")]
    Submission(String),
    #[error("membership handling failed: {0}")]
    Membership(String),
    #[error("group moderation failed: {0}")]
    Moderation(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> BotEventType;
    async fn handle(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<BotEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Replies are plain strings sent back to the originating chat; `None`
/// means the service handled the event silently.
#[async_trait]
pub trait CommandService: Send + Sync {
    async fn handle_command(
        &self,
        event: &CommandEvent,
        ctx: &EventContext,
    ) -> Result<Option<String>, EventHandlerError>;
}

#[async_trait]
pub trait SubmissionService: Send + Sync {
    async fn handle_submission(
        &self,
        event: &FormEvent,
        ctx: &EventContext,
    ) -> Result<Option<String>, EventHandlerError>;
}

#[async_trait]
pub trait MembershipService: Send + Sync {
    async fn members_joined(
        &self,
        event: &MembersJoinedEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;

    async fn member_left(
        &self,
        event: &MemberLeftEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

#[async_trait]
pub trait ModerationService: Send + Sync {
    async fn moderate(
        &self,
        event: &GroupMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

pub struct CommandHandler<S> {
    service: S,
}

impl<S> CommandHandler<S>
where
    S: CommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: CommandService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::Command
    }

    async fn handle(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::Command(event) = event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.service.handle_command(event, ctx).await?;
        Ok(match reply {
            Some(text) => HandlerResult::Replied { chat_id: event.chat_id, text },
            None => HandlerResult::Processed,
        })
    }
}

pub struct FormHandler<S> {
    service: S,
}

impl<S> FormHandler<S>
where
    S: SubmissionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for FormHandler<S>
where
    S: SubmissionService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::Form
    }

    async fn handle(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::Form(event) = event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.service.handle_submission(event, ctx).await?;
        Ok(match reply {
            Some(text) => HandlerResult::Replied { chat_id: event.chat_id, text },
            None => HandlerResult::Processed,
        })
    }
}

/// Join and leave land on two dispatcher slots but share one service,
/// so the handlers take it behind an `Arc`.
pub struct MembersJoinedHandler<S> {
    service: Arc<S>,
}

impl<S> MembersJoinedHandler<S>
where
    S: MembershipService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MembersJoinedHandler<S>
where
    S: MembershipService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::MembersJoined
    }

    async fn handle(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::MembersJoined(event) = event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.members_joined(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct MemberLeftHandler<S> {
    service: Arc<S>,
}

impl<S> MemberLeftHandler<S>
where
    S: MembershipService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MemberLeftHandler<S>
where
    S: MembershipService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::MemberLeft
    }

    async fn handle(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::MemberLeft(event) = event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.member_left(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct GroupMessageHandler<S> {
    service: S,
}

impl<S> GroupMessageHandler<S>
where
    S: ModerationService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for GroupMessageHandler<S>
where
    S: ModerationService + 'static,
{
    fn event_type(&self) -> BotEventType {
        BotEventType::GroupMessage
    }

    async fn handle(
        &self,
        event: &BotEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let BotEvent::GroupMessage(event) = event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.moderate(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}
