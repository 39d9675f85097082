use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type IntentParams = BTreeMap<String, String>;

/// Closed set of command families an operator message can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Status,
    Content,
    Leads,
    Campaigns,
    Help,
    Unknown,
}

impl Intent {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "status" => Self::Status,
            "content" => Self::Content,
            "leads" => Self::Leads,
            "campaigns" => Self::Campaigns,
            "help" => Self::Help,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Content => "content",
            Self::Leads => "leads",
            Self::Campaigns => "campaigns",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub action: String,
    pub params: IntentParams,
}

impl ClassifiedIntent {
    pub fn new(intent: Intent, action: impl Into<String>) -> Self {
        Self { intent, action: action.into(), params: IntentParams::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The tuple every classification failure degrades to.
    pub fn fallback() -> Self {
        Self::new(Intent::Unknown, "fallback")
    }

    pub fn is_fallback(&self) -> bool {
        self.intent == Intent::Unknown && self.action == "fallback" && self.params.is_empty()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str).filter(|value| !value.trim().is_empty())
    }
}

/// Turns free text into a routed intent. Implementations never fail: any
/// upstream problem is reported as [`ClassifiedIntent::fallback`].
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> ClassifiedIntent;
}
