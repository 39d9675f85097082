use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blocks::{truncate_chars, CommandResult, MessageBuilder, OutboundReply};
use crate::client::ReplySender;
use crate::handlers::{checked_at, NOT_AVAILABLE};

const LEAD_MESSAGE_PREVIEW_CHARS: usize = 300;
const LEAD_TEXT_PREVIEW_CHARS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub vertical: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Posts operator-facing cards to the configured notification channel.
/// Without a channel every call is a no-op; send failures are only logged.
pub struct ChannelNotifier {
    sender: Arc<dyn ReplySender>,
    channel: Option<String>,
}

impl ChannelNotifier {
    pub fn new(sender: Arc<dyn ReplySender>, channel: Option<String>) -> Self {
        let channel = channel.filter(|channel| !channel.trim().is_empty());
        Self { sender, channel }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    pub async fn demo_request(&self, request: &DemoRequest) {
        let fallback = format!("Demo request from {} ({})", request.name, request.email);
        let message = request.message.as_deref().filter(|message| !message.trim().is_empty());
        let card = MessageBuilder::new(fallback)
            .header("New Demo Request")
            .fields(|fields| {
                fields
                    .field("Name", &request.name)
                    .field("Email", &request.email)
                    .field("Company", or_not_available(request.company.as_deref()))
                    .field("Vertical", or_not_available(request.vertical.as_deref()));
            })
            .when(message.is_some(), |card| {
                card.section(format!("*Message:*\n{}", message.unwrap_or_default()))
            })
            .divider()
            .context(format!("Source: usecircuitos.com/demo | {}", checked_at(Utc::now())))
            .build();

        self.post("demo_request", card).await;
    }

    /// `tier` is `hot` or `qualified`.
    pub async fn hot_lead(&self, tier: &str, last_message: &str, message_count: usize) {
        let qualified = tier == "qualified";
        let (emoji, priority) = if qualified { (":fire:", "QUALIFIED") } else { (":eyes:", "HOT") };

        let card = MessageBuilder::new(format!(
            "{priority} lead on Aria X: \"{}\"",
            truncate_chars(last_message, LEAD_TEXT_PREVIEW_CHARS)
        ))
        .header(format!("{priority} Lead via Aria X"))
        .fields(|fields| {
            fields.field("Tier", format!("{emoji} {tier}")).field("Messages", message_count.to_string());
        })
        .section(format!(
            "*Last message:*\n>{}",
            truncate_chars(last_message, LEAD_MESSAGE_PREVIEW_CHARS)
        ))
        .divider()
        .context(checked_at(Utc::now()))
        .build();

        self.post("hot_lead", card).await;
    }

    pub async fn system_alert(&self, title: &str, details: &str) {
        let card = MessageBuilder::new(format!("Alert: {title}"))
            .header(format!("Alert: {title}"))
            .section(details)
            .context(checked_at(Utc::now()))
            .build();

        self.post("system_alert", card).await;
    }

    async fn post(&self, kind: &'static str, card: CommandResult) {
        let Some(channel) = &self.channel else {
            debug!(kind, "no notification channel configured; skipping");
            return;
        };

        if let Err(error) = self.sender.send(&OutboundReply::new(channel.clone(), card)).await {
            warn!(
                event_name = "egress.slack.notification_failed",
                kind,
                error = %error,
                "slack notification failed"
            );
        }
    }
}

fn or_not_available(value: Option<&str>) -> &str {
    value.filter(|value| !value.trim().is_empty()).unwrap_or(NOT_AVAILABLE)
}
