use std::sync::Arc;

use async_trait::async_trait;
use circuitops_core::config::LlmConfig;
use circuitops_core::intent::{ClassifiedIntent, Intent, IntentClassifier, IntentParams};
use serde_json::Value;
use tracing::warn;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient};

pub const ROUTING_INSTRUCTION: &str = r#"You are an intent classifier for CircuitOS operations. Given a Slack message from the operator, return JSON only.

Response format (no markdown, no explanation, raw JSON only):
{"intent":"<intent>","action":"<action>","params":{}}

## Intents and Actions

status:
- overview: KPI dashboard summary
- health: check system/container health
- governance: autonomy governance telemetry
- system: integration health (GHL, n8n, enrichment)

content:
- generate_blog: trigger AI blog generation
- blog_status: list recent blog posts
- social_queue: show social post queue/counts
- approve_post: approve a social post (params: id)
- push_post: push post to GHL (params: id)
- distribute: generate social posts from a blog (params: blog_id)
- linkedin_batch: trigger LinkedIn post batch
- content_perf: content performance metrics

leads:
- score: score a prospect (params: name, company, email, market)
- rescore: rescore existing contact (params: contact_id)
- pipeline: pipeline funnel metrics
- scoring_dist: scoring distribution
- engagement: engagement metrics
- enrichment: enrich a prospect (params: name, company)
- monthly: monthly performance report

campaigns:
- list: list Instantly campaigns
- analytics: campaign metrics (params: campaign_id)

help:
- commands: show available commands

unknown:
- fallback: could not classify

## Rules
- Extract IDs, names, emails from the message into params
- If the user asks "what can you do" or similar, intent=help action=commands
- Default vertical is "{default_vertical}" unless specified
- If ambiguous, choose the most likely intent"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseFailure {
    NoJsonObject,
    InvalidJson(String),
    MissingKey(&'static str),
    WrongType(&'static str),
}

/// Extracts the outermost `{...}` span from a model reply and reads the three
/// routing keys out of it. Tolerates markdown fences and leading prose.
pub fn parse_classification(raw: &str) -> Result<ClassifiedIntent, ParseFailure> {
    let start = raw.find('{').ok_or(ParseFailure::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(ParseFailure::NoJsonObject)?;
    if end < start {
        return Err(ParseFailure::NoJsonObject);
    }

    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|error| ParseFailure::InvalidJson(error.to_string()))?;
    let object = value.as_object().ok_or(ParseFailure::WrongType("root"))?;

    let intent = object
        .get("intent")
        .ok_or(ParseFailure::MissingKey("intent"))?
        .as_str()
        .ok_or(ParseFailure::WrongType("intent"))?;
    let action = object
        .get("action")
        .ok_or(ParseFailure::MissingKey("action"))?
        .as_str()
        .ok_or(ParseFailure::WrongType("action"))?;
    let params = object
        .get("params")
        .ok_or(ParseFailure::MissingKey("params"))?
        .as_object()
        .ok_or(ParseFailure::WrongType("params"))?;

    let mut flattened = IntentParams::new();
    for (key, value) in params {
        let rendered = match value {
            Value::Null => continue,
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        flattened.insert(key.clone(), rendered);
    }

    let action = action.trim();
    Ok(ClassifiedIntent {
        intent: Intent::parse(intent),
        action: if action.is_empty() { "fallback".to_string() } else { action.to_string() },
        params: flattened,
    })
}

/// Routes operator text through the hosted model. Never fails: every error
/// path collapses to [`ClassifiedIntent::fallback`].
pub struct LlmIntentClassifier {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    instruction: String,
}

impl LlmIntentClassifier {
    pub fn new(client: Arc<dyn LlmClient>, config: &LlmConfig, default_vertical: &str) -> Self {
        Self {
            client,
            model: config.classifier_model.clone(),
            max_tokens: config.classifier_max_tokens,
            instruction: ROUTING_INSTRUCTION.replace("{default_vertical}", default_vertical),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str) -> ClassifiedIntent {
        if !self.client.is_configured() {
            return ClassifiedIntent::fallback();
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: self.instruction.clone(),
            messages: vec![ChatMessage::user(text)],
        };

        let raw = match self.client.complete(request).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "egress.llm.classification_failed",
                    error = %error,
                    "intent classification request failed"
                );
                return ClassifiedIntent::fallback();
            }
        };

        match parse_classification(&raw) {
            Ok(classified) => classified,
            Err(failure) => {
                warn!(
                    event_name = "egress.llm.classification_unparseable",
                    failure = ?failure,
                    "intent classification reply was not usable"
                );
                ClassifiedIntent::fallback()
            }
        }
    }
}
