use std::sync::Arc;
use std::time::Duration;

use circuitops_core::intent::{Intent, IntentClassifier};
use circuitops_core::ratelimit::RateLimiter;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::blocks::{CommandResult, OutboundReply};
use crate::client::{ReplyError, ReplySender};
use crate::commands::{normalize_text, CommandRouter, CommandService};
use crate::notify::ChannelNotifier;

pub const RATE_LIMITED_REPLY: &str = "Rate limited. Wait a moment before sending another command.";
pub const EMPTY_MENTION_REPLY: &str =
    "What would you like to know? Try \"help\" for available commands.";
pub const PROCESSING_FAILED_REPLY: &str =
    "Something went wrong processing that command. Check the API logs.";

/// Top-level body of a request to the events endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookPayload {
    UrlVerification {
        #[serde(default)]
        challenge: Value,
    },
    EventCallback {
        #[serde(default, deserialize_with = "lenient_event")]
        event: Option<InboundEvent>,
    },
    #[serde(other)]
    Other,
}

impl WebhookPayload {
    /// Reads an already decoded body. Shapes this bot does not act on,
    /// including bodies without a `type`, come back as [`Self::Other`].
    pub fn from_value(body: Value) -> Self {
        serde_json::from_value(body).unwrap_or(Self::Other)
    }
}

/// Slack event as far as the bot cares. Fields carrying something other than
/// a string (`channel` is an object on `channel_created`, `user` on
/// `user_change`) are read as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default, deserialize_with = "lenient_type")]
    pub event_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bot_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub thread_ts: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ts: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn lenient_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_event<'de, D>(deserializer: D) -> Result<Option<InboundEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

impl InboundEvent {
    pub fn is_bot_origin(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    fn is_supported_type(&self) -> bool {
        matches!(self.event_type.as_str(), "message" | "app_mention")
    }

    fn channel(&self) -> Option<&str> {
        self.channel.as_deref().filter(|channel| !channel.is_empty())
    }

    fn sender(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }
}

/// Where a reply to an inbound event is posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTarget {
    pub channel: String,
    pub thread_ts: Option<String>,
}

impl ReplyTarget {
    /// Stays in an existing thread, otherwise starts one under the triggering
    /// message. Falls back to a top-level post when the event has neither ts.
    pub fn for_event(event: &InboundEvent) -> Option<Self> {
        let channel = event.channel()?.to_string();
        let ts = event.ts.as_deref().filter(|ts| !ts.is_empty());
        let thread_ts = match event.thread_ts.as_deref().filter(|ts| !ts.is_empty()) {
            Some(thread_ts) if Some(thread_ts) != ts => Some(thread_ts),
            _ => ts,
        };
        Some(Self { channel, thread_ts: thread_ts.map(str::to_string) })
    }

    pub fn reply(&self, result: CommandResult) -> OutboundReply {
        OutboundReply::new(self.channel.clone(), result).in_thread(self.thread_ts.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    UnsupportedType,
    BotOrigin,
    EmptyText,
    MissingChannel,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Ignored(IgnoreReason),
    RateLimited,
    Clarified,
    Replied { intent: Intent, action: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error(transparent)]
    Reply(#[from] ReplyError),
}

/// Runs the classify, route and reply chain for one inbound message.
pub struct EventProcessor {
    classifier: Arc<dyn IntentClassifier>,
    router: CommandRouter<Arc<dyn CommandService>>,
    replies: Arc<dyn ReplySender>,
    limiter: Arc<RateLimiter>,
    alerts: Option<Arc<ChannelNotifier>>,
}

impl EventProcessor {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        commands: Arc<dyn CommandService>,
        replies: Arc<dyn ReplySender>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self { classifier, router: CommandRouter::new(commands), replies, limiter, alerts: None }
    }

    /// Posts a system alert whenever a detached chain panics or overruns.
    pub fn with_alerts(mut self, notifier: Arc<ChannelNotifier>) -> Self {
        self.alerts = Some(notifier);
        self
    }

    pub async fn process(&self, event: &InboundEvent) -> Result<ProcessOutcome, ProcessError> {
        if !event.is_supported_type() {
            return Ok(ProcessOutcome::Ignored(IgnoreReason::UnsupportedType));
        }
        if event.is_bot_origin() {
            return Ok(ProcessOutcome::Ignored(IgnoreReason::BotOrigin));
        }
        let text = event.text.as_deref().unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(ProcessOutcome::Ignored(IgnoreReason::EmptyText));
        }
        let Some(target) = ReplyTarget::for_event(event) else {
            return Ok(ProcessOutcome::Ignored(IgnoreReason::MissingChannel));
        };

        if !self.limiter.check(event.sender()) {
            info!(
                event_name = "ingress.slack.rate_limited",
                user = event.sender(),
                channel = %target.channel,
                "slack sender over rate limit"
            );
            self.replies.send(&target.reply(CommandResult::text(RATE_LIMITED_REPLY))).await?;
            return Ok(ProcessOutcome::RateLimited);
        }

        let cleaned = normalize_text(text);
        if cleaned.is_empty() {
            self.replies.send(&target.reply(CommandResult::text(EMPTY_MENTION_REPLY))).await?;
            return Ok(ProcessOutcome::Clarified);
        }

        let classified = self.classifier.classify(&cleaned).await;
        info!(
            event_name = "ingress.slack.classified",
            intent = %classified.intent,
            action = %classified.action,
            channel = %target.channel,
            "slack message classified"
        );

        let result = self.router.route(&classified).await;
        self.replies.send(&target.reply(result)).await?;
        debug!(
            event_name = "egress.slack.reply_sent",
            channel = %target.channel,
            threaded = target.thread_ts.is_some(),
            "slack reply posted"
        );

        Ok(ProcessOutcome::Replied { intent: classified.intent, action: classified.action })
    }

    /// Runs [`Self::process`] on the executor without blocking the caller. The
    /// chain is aborted after `deadline`; a timeout or panic gets a generic
    /// failure reply under the triggering message.
    pub fn spawn_detached(
        self: &Arc<Self>,
        event: InboundEvent,
        deadline: Duration,
    ) -> JoinHandle<()> {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            let worker = {
                let processor = Arc::clone(&processor);
                let event = event.clone();
                tokio::spawn(async move { processor.process(&event).await })
            };
            let abort = worker.abort_handle();

            match tokio::time::timeout(deadline, worker).await {
                Ok(Ok(Ok(outcome))) => {
                    debug!(event_name = "ingress.slack.processed", ?outcome, "slack event processed");
                }
                Ok(Ok(Err(error))) => {
                    warn!(
                        event_name = "egress.slack.reply_failed",
                        error = %error,
                        "slack reply could not be posted"
                    );
                }
                Ok(Err(join_error)) => {
                    warn!(
                        event_name = "ingress.slack.processing_failed",
                        error = %join_error,
                        "slack event processing panicked"
                    );
                    processor.send_failure_reply(&event).await;
                    processor
                        .raise_alert(
                            "Slack command panicked",
                            format!(
                                "{} in {}: {join_error}",
                                event.event_type,
                                event_location(&event)
                            ),
                        )
                        .await;
                }
                Err(_) => {
                    abort.abort();
                    warn!(
                        event_name = "ingress.slack.processing_failed",
                        deadline_secs = deadline.as_secs(),
                        "slack event processing exceeded deadline"
                    );
                    processor.send_failure_reply(&event).await;
                    processor
                        .raise_alert(
                            "Slack command timed out",
                            format!(
                                "{} in {} exceeded {}s",
                                event.event_type,
                                event_location(&event),
                                deadline.as_secs()
                            ),
                        )
                        .await;
                }
            }
        })
    }

    async fn raise_alert(&self, title: &str, details: String) {
        if let Some(notifier) = &self.alerts {
            notifier.system_alert(title, &details).await;
        }
    }

    async fn send_failure_reply(&self, event: &InboundEvent) {
        let (Some(channel), Some(ts)) = (event.channel(), event.ts.as_deref()) else {
            return;
        };
        let reply = OutboundReply::new(channel, CommandResult::text(PROCESSING_FAILED_REPLY))
            .in_thread(Some(ts.to_string()));
        if let Err(error) = self.replies.send(&reply).await {
            warn!(
                event_name = "egress.slack.reply_failed",
                error = %error,
                "failure notice could not be posted"
            );
        }
    }
}

fn event_location(event: &InboundEvent) -> &str {
    event.channel().unwrap_or("unknown channel")
}
