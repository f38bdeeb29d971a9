//! Telegram transport - Bot API interface
//!
//! This crate provides the Telegram surface for gigboard:
//! - **Bot API client** (`api`) - `sendMessage`, `editMessageText`, `deleteMessage`, `getUpdates`
//! - **Channel gateway** (`gateway`) - the broadcast capability the lifecycle core consumes
//! - **Events** (`events`) - update classification, command grammar, dispatcher
//! - **Formatting** (`format`) - HTML listing rendering and canned bot texts
//! - **Form parsing** (`parse`) - the labeled one-message submission template
//! - **Update runner** (`updates`) - long-poll loop with reconnect backoff
//!
//! # Architecture
//!
//! ```text
//! getUpdates → PollRunner → classify → EventDispatcher → Handlers → Services
//!                   ↓
//!             sendMessage ← Reply text
//! ```
//!
//! # Key Types
//!
//! - `PollRunner` - long-poll event loop with reconnection logic
//! - `EventDispatcher` - routes classified updates to registered handlers
//! - `ChannelGateway` - publish / edit / delete against the one managed channel
//! - `CommandService` / `SubmissionService` / `MembershipService` / `ModerationService` -
//!   traits the application layer implements

pub mod api;
pub mod events;
pub mod format;
pub mod gateway;
pub mod parse;
pub mod updates;
