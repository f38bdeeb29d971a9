use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use gigboard_core::domain::job::JobId;
use gigboard_core::domain::user::{User, UserId};
use gigboard_core::errors::AdminError;
use gigboard_core::referral::BONUS_THRESHOLD;
use gigboard_telegram::api::BotApi;
use gigboard_telegram::events::{
    parse_command, BotCommand, CommandEvent, CommandHandler, CommandService, EventContext,
    EventDispatcher, EventHandlerError, FormEvent, FormHandler, GrantCommand, GroupMessageEvent,
    GroupMessageHandler, MemberLeftEvent, MemberLeftHandler, MembersJoinedEvent,
    MembersJoinedHandler, MembershipService, ModerationService, SubmissionService,
};
use gigboard_telegram::format;
use gigboard_telegram::parse;

use crate::admin::{AdminService, UsageStats, UserDetail};
use crate::lifecycle::LifecycleService;
use crate::referral::ReferralService;

const ADMIN_ONLY_TEXT: &str = "This command is reserved for administrators.";
const MODERATION_NOTICE_TTL_SECS: u64 = 120;

/// Everything the chat front needs, bundled for dispatcher assembly.
pub struct BotDeps {
    pub lifecycle: Arc<LifecycleService>,
    pub referrals: Arc<ReferralService>,
    pub admin: Arc<AdminService>,
    pub api: Arc<BotApi>,
    pub admin_user_ids: Vec<i64>,
    pub invite_url: Option<String>,
    pub bot_username: String,
}

/// Wires one relay per event slot. Join and leave share the membership
/// relay; everything else gets its own.
pub fn build_dispatcher(deps: BotDeps) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(CommandHandler::new(CommandRelay {
        lifecycle: deps.lifecycle.clone(),
        admin: deps.admin,
        admin_user_ids: deps.admin_user_ids.clone(),
        invite_url: deps.invite_url,
    }));
    dispatcher.register(FormHandler::new(SubmissionRelay { lifecycle: deps.lifecycle }));
    let membership = Arc::new(MembershipRelay { referrals: deps.referrals });
    dispatcher.register(MembersJoinedHandler::new(membership.clone()));
    dispatcher.register(MemberLeftHandler::new(membership));
    dispatcher.register(GroupMessageHandler::new(ModerationRelay {
        api: deps.api,
        admin_user_ids: deps.admin_user_ids,
        bot_username: deps.bot_username,
    }));
    dispatcher
}

struct CommandRelay {
    lifecycle: Arc<LifecycleService>,
    admin: Arc<AdminService>,
    admin_user_ids: Vec<i64>,
    invite_url: Option<String>,
}

impl CommandRelay {
    fn is_admin(&self, user_id: i64) -> bool {
        self.admin_user_ids.contains(&user_id)
    }
}

#[async_trait]
impl CommandService for CommandRelay {
    async fn handle_command(
        &self,
        event: &CommandEvent,
        _ctx: &EventContext,
    ) -> Result<Option<String>, EventHandlerError> {
        let command = match parse_command(&event.text) {
            Ok(command) => command,
            Err(parse_error) => return Ok(Some(parse_error.user_message())),
        };
        let caller = UserId(event.sender.id);

        match command {
            BotCommand::Start => {
                self.lifecycle
                    .ensure_registered(caller, event.sender.username.as_deref())
                    .await
                    .map_err(|error| EventHandlerError::Command(error.to_string()))?;
                Ok(Some(format::menu_text(self.invite_url.as_deref())))
            }
            BotCommand::Post => Ok(Some(format::template_prompt())),
            BotCommand::List => {
                let jobs = self
                    .lifecycle
                    .list(caller)
                    .await
                    .map_err(|error| EventHandlerError::Command(error.to_string()))?;
                if jobs.is_empty() {
                    Ok(Some(format::empty_listing_text()))
                } else {
                    Ok(Some(format::listing_summary(&jobs)))
                }
            }
            BotCommand::Delete { job_id } => {
                Ok(Some(match self.lifecycle.retract(caller, JobId(job_id)).await {
                    Ok(()) => format::retracted_text(),
                    Err(error) => error.user_message(),
                }))
            }
            BotCommand::Edit { job_id, form } => {
                let payload = parse::parse_submission(&form);
                Ok(Some(match self.lifecycle.edit(caller, JobId(job_id), &payload).await {
                    Ok(_) => format::updated_text(),
                    Err(error) => error.user_message(),
                }))
            }
            BotCommand::Stats => {
                if !self.is_admin(event.sender.id) {
                    return Ok(Some(ADMIN_ONLY_TEXT.to_string()));
                }
                match self.admin.stats().await {
                    Ok(stats) => Ok(Some(render_stats(&stats))),
                    Err(error) => admin_error_reply(error),
                }
            }
            BotCommand::UserInfo { identifier } => {
                if !self.is_admin(event.sender.id) {
                    return Ok(Some(ADMIN_ONLY_TEXT.to_string()));
                }
                match self.admin.user_info(&identifier).await {
                    Ok(detail) => Ok(Some(render_user_detail(&detail))),
                    Err(error) => admin_error_reply(error),
                }
            }
            BotCommand::Grant(grant) => {
                if !self.is_admin(event.sender.id) {
                    return Ok(Some(ADMIN_ONLY_TEXT.to_string()));
                }
                let confirmed = match grant {
                    GrantCommand::Permanent { identifier } => {
                        self.admin.grant_permanent(&identifier).await.map(|user| {
                            format!("✅ {} now has a permanent posting grant.", display_user(&user))
                        })
                    }
                    GrantCommand::Subscription { identifier, days } => {
                        self.admin.grant_subscription(&identifier, days).await.map(|user| {
                            format!(
                                "✅ {} can post until {}.",
                                display_user(&user),
                                format_expiry(&user),
                            )
                        })
                    }
                    GrantCommand::Credit { identifier } => {
                        self.admin.grant_credit(&identifier).await.map(|user| {
                            format!(
                                "✅ {} now holds {} post credit(s).",
                                display_user(&user),
                                user.credited_posts,
                            )
                        })
                    }
                };
                match confirmed {
                    Ok(text) => Ok(Some(text)),
                    Err(error) => admin_error_reply(error),
                }
            }
        }
    }
}

struct SubmissionRelay {
    lifecycle: Arc<LifecycleService>,
}

#[async_trait]
impl SubmissionService for SubmissionRelay {
    async fn handle_submission(
        &self,
        event: &FormEvent,
        _ctx: &EventContext,
    ) -> Result<Option<String>, EventHandlerError> {
        let payload = parse::parse_submission(&event.text);
        Ok(Some(match self.lifecycle.submit(UserId(event.sender.id), &payload).await {
            Ok(_) => format::published_text(),
            Err(error) => error.user_message(),
        }))
    }
}

struct MembershipRelay {
    referrals: Arc<ReferralService>,
}

#[async_trait]
impl MembershipService for MembershipRelay {
    async fn members_joined(
        &self,
        event: &MembersJoinedEvent,
        _ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        for member in &event.members {
            self.referrals
                .member_joined(UserId(event.inviter.id), UserId(member.id))
                .await
                .map_err(|error| EventHandlerError::Membership(error.to_string()))?;
        }
        Ok(())
    }

    async fn member_left(
        &self,
        event: &MemberLeftEvent,
        _ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        self.referrals
            .member_left(UserId(event.member.id))
            .await
            .map_err(|error| EventHandlerError::Membership(error.to_string()))?;
        Ok(())
    }
}

/// Keeps the linked group clear of listings: anything a non-administrator
/// posts there is removed and answered with a short redirect notice.
struct ModerationRelay {
    api: Arc<BotApi>,
    admin_user_ids: Vec<i64>,
    bot_username: String,
}

#[async_trait]
impl ModerationService for ModerationRelay {
    async fn moderate(
        &self,
        event: &GroupMessageEvent,
        _ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        if self.admin_user_ids.contains(&event.sender.id) {
            return Ok(());
        }

        self.api
            .delete_message(event.chat_id, event.message_id)
            .await
            .map_err(|error| EventHandlerError::Moderation(error.to_string()))?;
        debug!(chat_id = event.chat_id, message_id = event.message_id, "group message removed");

        // The redirect notice cleans itself up so the group stays readable.
        let notice = self
            .api
            .send_message(event.chat_id, &format::group_moderation_text(&self.bot_username))
            .await
            .map_err(|error| EventHandlerError::Moderation(error.to_string()))?;
        let api = self.api.clone();
        let chat_id = event.chat_id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(MODERATION_NOTICE_TTL_SECS)).await;
            if let Err(error) = api.delete_message(chat_id, notice.message_id).await {
                warn!(chat_id, message_id = notice.message_id, %error, "notice cleanup failed");
            }
        });
        Ok(())
    }
}

fn admin_error_reply(error: AdminError) -> Result<Option<String>, EventHandlerError> {
    match error {
        AdminError::Storage(message) => Err(EventHandlerError::Command(message)),
        AdminError::InvalidIdentifier(raw) => {
            Ok(Some(format!("`{raw}` is not a user id or @handle.")))
        }
        AdminError::UserNotFound(raw) => {
            Ok(Some(format!("No known user matches {raw}. They have to message the bot first.")))
        }
    }
}

fn display_user(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{username}"),
        None => format!("user {}", user.id),
    }
}

fn format_expiry(user: &User) -> String {
    match user.subscription_until {
        Some(until) => until.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "now".to_string(),
    }
}

fn render_stats(stats: &UsageStats) -> String {
    format!(
        "📊 Usage\nusers: {}\nlive listings: {}\nactive subscriptions: {}\npermanent grants: {}",
        stats.total_users, stats.live_jobs, stats.active_subscriptions, stats.permanent_grantees,
    )
}

fn render_user_detail(detail: &UserDetail) -> String {
    let user = &detail.user;
    format!(
        "👤 {}\nid: {}\npermanent grant: {}\nsubscription until: {}\npost credits: {}\n\
         referrals: {} ({}/{} toward the next bonus)\nlive listings: {}",
        display_user(user),
        user.id,
        if user.permanent_grant { "yes" } else { "no" },
        match user.subscription_until {
            Some(until) => until.format("%Y-%m-%d %H:%M UTC").to_string(),
            None => "none".to_string(),
        },
        user.credited_posts,
        user.referral_count,
        detail.referral_progress,
        BONUS_THRESHOLD,
        detail.live_jobs,
    )
}
