//! Slack Integration - Events API ops bot
//!
//! This crate provides the Slack interface for CircuitOps:
//! - **Verification** (`verify`) - `v0` request signing checks with replay window
//! - **Events** (`events`) - webhook payloads and the detached processing chain
//! - **Commands** (`commands`) - mention stripping and intent routing
//! - **Handlers** (`handlers`) - status, content, leads, campaigns, help
//! - **Backend** (`backend`) - HTTP client for the COS and console APIs
//! - **Block Kit** (`blocks`) - reply payload model and builders
//! - **Client** (`client`) - `chat.postMessage` sender
//! - **Notify** (`notify`) - operator cards for demo requests and hot leads
//!
//! # Architecture
//!
//! ```text
//! Events API → verify → EventProcessor → classifier → CommandRouter → handlers → backend
//!                            ↓
//!                     ReplySender ← CommandResult
//! ```
//!
//! # Key Types
//!
//! - `SignatureVerifier` - HMAC-SHA256 signature check
//! - `EventProcessor` - rate limit, normalize, classify, route, reply
//! - `HandlerService` - the production `CommandService`
//! - `MessageBuilder` - Constructs rich Slack messages

pub mod backend;
pub mod blocks;
pub mod client;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod notify;
pub mod verify;

pub use backend::{Backend, HttpBackend};
pub use blocks::{CommandResult, MessageBuilder, OutboundReply};
pub use client::{ReplyError, ReplySender, SlackWebClient};
pub use commands::{normalize_text, CommandRouter, CommandService};
pub use events::{EventProcessor, InboundEvent, ProcessOutcome, ReplyTarget, WebhookPayload};
pub use handlers::{HandlerContext, HandlerService};
pub use notify::{ChannelNotifier, DemoRequest};
pub use verify::{SignatureError, SignatureVerifier};
