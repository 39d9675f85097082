use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use circuitops_core::intent::{ClassifiedIntent, Intent, IntentParams};
use regex::Regex;

use crate::blocks::CommandResult;

pub const CLARIFYING_REPLY: &str = "I didn't catch that. Try asking about *status*, *content*, \
*leads*, *campaigns*, or say *help* for the full command list.";

static MENTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[A-Z0-9]+>").expect("mention pattern is a valid regex"));

/// Removes `<@U123ABC>` mention tags and surrounding whitespace. An empty
/// result means the operator only pinged the bot.
pub fn normalize_text(text: &str) -> String {
    MENTION_TAG.replace_all(text, "").trim().to_string()
}

/// One entry point per intent family. Implementations degrade failures into
/// reply text instead of returning errors.
#[async_trait]
pub trait CommandService: Send + Sync {
    async fn status(&self, action: &str, params: &IntentParams) -> CommandResult;

    async fn content(&self, action: &str, params: &IntentParams) -> CommandResult;

    async fn leads(&self, action: &str, params: &IntentParams) -> CommandResult;

    async fn campaigns(&self, action: &str, params: &IntentParams) -> CommandResult;

    async fn help(&self) -> CommandResult;
}

#[async_trait]
impl<T> CommandService for Arc<T>
where
    T: CommandService + ?Sized,
{
    async fn status(&self, action: &str, params: &IntentParams) -> CommandResult {
        (**self).status(action, params).await
    }

    async fn content(&self, action: &str, params: &IntentParams) -> CommandResult {
        (**self).content(action, params).await
    }

    async fn leads(&self, action: &str, params: &IntentParams) -> CommandResult {
        (**self).leads(action, params).await
    }

    async fn campaigns(&self, action: &str, params: &IntentParams) -> CommandResult {
        (**self).campaigns(action, params).await
    }

    async fn help(&self) -> CommandResult {
        (**self).help().await
    }
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: CommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(&self, classified: &ClassifiedIntent) -> CommandResult {
        let ClassifiedIntent { intent, action, params } = classified;
        match intent {
            Intent::Status => self.service.status(action, params).await,
            Intent::Content => self.service.content(action, params).await,
            Intent::Leads => self.service.leads(action, params).await,
            Intent::Campaigns => self.service.campaigns(action, params).await,
            Intent::Help => self.service.help().await,
            Intent::Unknown => CommandResult::text(CLARIFYING_REPLY),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use circuitops_core::intent::{ClassifiedIntent, Intent, IntentParams};

    use super::{normalize_text, CommandRouter, CommandService, CLARIFYING_REPLY};
    use crate::blocks::CommandResult;

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingService {
        fn record(&self, family: &str, action: &str, params: &IntentParams) -> CommandResult {
            let vertical = params.get("vertical").map(String::as_str).unwrap_or("-");
            self.calls.lock().expect("lock").push(format!("{family}:{action}:{vertical}"));
            CommandResult::text(family)
        }
    }

    #[async_trait]
    impl CommandService for RecordingService {
        async fn status(&self, action: &str, params: &IntentParams) -> CommandResult {
            self.record("status", action, params)
        }

        async fn content(&self, action: &str, params: &IntentParams) -> CommandResult {
            self.record("content", action, params)
        }

        async fn leads(&self, action: &str, params: &IntentParams) -> CommandResult {
            self.record("leads", action, params)
        }

        async fn campaigns(&self, action: &str, params: &IntentParams) -> CommandResult {
            self.record("campaigns", action, params)
        }

        async fn help(&self) -> CommandResult {
            self.record("help", "commands", &IntentParams::new())
        }
    }

    #[test]
    fn normalize_strips_mentions_and_whitespace() {
        assert_eq!(normalize_text("<@BOT123> show recent posts"), "show recent posts");
        assert_eq!(normalize_text("  status <@U0ABC9> please "), "status  please");
        assert_eq!(normalize_text("<@U1><@U2>   "), "");
        assert_eq!(normalize_text("<@lowercase> hi"), "<@lowercase> hi");
    }

    #[tokio::test]
    async fn router_calls_service_entrypoints() {
        let router = CommandRouter::new(RecordingService::default());
        let intents = [
            ClassifiedIntent::new(Intent::Status, "health"),
            ClassifiedIntent::new(Intent::Content, "blog_status"),
            ClassifiedIntent::new(Intent::Leads, "pipeline").with_param("vertical", "gym"),
            ClassifiedIntent::new(Intent::Campaigns, "list"),
            ClassifiedIntent::new(Intent::Help, "commands"),
        ];
        for intent in &intents {
            router.route(intent).await;
        }

        let calls = router.service.calls.lock().expect("lock");
        assert_eq!(
            &*calls,
            &[
                "status:health:-",
                "content:blog_status:-",
                "leads:pipeline:gym",
                "campaigns:list:-",
                "help:commands:-",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_intent_never_reaches_a_handler() {
        let router = CommandRouter::new(RecordingService::default());
        let result = router.route(&ClassifiedIntent::fallback()).await;

        assert_eq!(result, CommandResult::text(CLARIFYING_REPLY));
        assert!(router.service.calls.lock().expect("lock").is_empty());
    }
}
