//! Language-model facing pieces of CircuitOps.
//!
//! - `llm`: the hosted model client behind the [`llm::LlmClient`] seam
//! - `classifier`: turns operator chat text into a routed intent
//! - `guardrails`: sanitization and prompt-injection screening for the public widget
//! - `concierge`: the website chat widget backend
//!
//! The model only ever translates text. Routing, rate limits, and backend calls
//! stay deterministic and live elsewhere.

pub mod classifier;
pub mod concierge;
pub mod guardrails;
pub mod llm;

pub use classifier::LlmIntentClassifier;
pub use concierge::{ChatReply, ChatTurn, ConciergeError, ConciergeService, LeadAlert, LeadTier};
pub use llm::{AnthropicClient, LlmClient, LlmError};
