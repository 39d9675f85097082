use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::llm::{ChatMessage, Role};

pub const MAX_MESSAGE_CHARS: usize = 1000;
pub const MAX_HISTORY_TURNS: usize = 20;

const INJECTION_PATTERNS: &[&str] = &[
    r"(?i)ignore (all |any )?(previous|prior|above|system|original) (instructions|prompts|rules|directives)",
    r"(?i)disregard (all |any )?(previous|prior|above|system|original)",
    r"(?i)you are now",
    r"(?i)new instructions:",
    r"(?i)system prompt:",
    r"(?i)\boverride\b.*\b(system|prompt|instructions)\b",
    r"(?i)\brole\s*:\s*(system|developer|admin)\b",
    r"(?i)pretend (you are|to be|you're)",
    r"(?i)forget (everything|all|your) (you |that )?(know|learned|were told)",
    r"(?i)reveal (your|the) (system|initial|original) (prompt|instructions|message)",
    r"(?i)what (is|are) your (system |initial |original )?(prompt|instructions|rules)",
    r"(?i)output (your|the) (system|original) (prompt|message|instructions)",
    r"(?i)repeat (your|the) (system|initial) (prompt|message)",
    r"(?i)translate (your|the) (system|initial) (prompt|instructions) (to|into)",
    r"\bDAN\b",
    r"(?i)\bjailbreak\b",
    r"(?i)developer mode",
    r"(?i)sudo mode",
    r"(?i)god mode",
    r"(?i)bypass (safety|content|filter|restriction)",
];

/// Visitors describing themselves ("act as a potential buyer") are not role overrides.
const ROLE_PLAY_ALLOWED: &[&str] = &["potential", "interested", "prospective"];

static INJECTION_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    INJECTION_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("injection pattern is a valid regex"))
        .collect()
});

static ROLE_PLAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)act as (?:an? )?([a-z]*)").expect("role-play pattern is a valid regex")
});

/// Trims, caps at [`MAX_MESSAGE_CHARS`], and removes control and zero-width
/// characters. Tab, newline and carriage return survive.
pub fn sanitize_message(text: &str) -> String {
    text.trim()
        .chars()
        .take(MAX_MESSAGE_CHARS)
        .filter(|ch| !is_stripped_control(*ch) && !is_invisible(*ch))
        .collect()
}

fn is_stripped_control(ch: char) -> bool {
    matches!(ch, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200B}'..='\u{200F}' | '\u{2028}'..='\u{202F}' | '\u{FEFF}')
}

/// A history turn as submitted by the browser widget; the role is untrusted.
#[derive(Clone, Debug, Deserialize)]
pub struct RawTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Reads `history` the way the widget may send it: anything other than an
/// array is empty, and turns whose role or content is not a string are dropped.
pub fn lenient_history<'de, D>(deserializer: D) -> Result<Vec<RawTurn>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items.into_iter().filter_map(|item| serde_json::from_value(item).ok()).collect())
}

pub fn sanitize_history(history: &[RawTurn]) -> Vec<ChatMessage> {
    let kept: Vec<ChatMessage> = history
        .iter()
        .filter_map(|turn| {
            let role = match turn.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => return None,
            };
            Some(ChatMessage { role, content: sanitize_message(&turn.content) })
        })
        .collect();

    let skip = kept.len().saturating_sub(MAX_HISTORY_TURNS);
    kept.into_iter().skip(skip).collect()
}

pub fn detect_injection(text: &str) -> bool {
    if INJECTION_REGEXES.iter().any(|pattern| pattern.is_match(text)) {
        return true;
    }

    ROLE_PLAY.captures_iter(text).any(|captures| {
        let next_word = captures.get(1).map(|word| word.as_str().to_ascii_lowercase());
        match next_word {
            Some(word) => !ROLE_PLAY_ALLOWED.iter().any(|allowed| word.starts_with(allowed)),
            None => true,
        }
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deflect { reason_code: &'static str, user_message: String },
}

#[derive(Clone, Debug, Default)]
pub struct ChatGuardrails;

impl ChatGuardrails {
    pub fn new() -> Self {
        Self
    }

    /// Checks the current message first, then any user turn replayed in history.
    pub fn evaluate(&self, message: &str, history: &[ChatMessage]) -> GuardrailDecision {
        if detect_injection(message) {
            return GuardrailDecision::Deflect {
                reason_code: "message_injection",
                user_message: "I'm Aria X, the CircuitOS concierge. I can help with questions about the platform, pricing, or booking a demo. What can I help with?".to_string(),
            };
        }

        let history_injection = history
            .iter()
            .any(|turn| turn.role == Role::User && detect_injection(&turn.content));
        if history_injection {
            return GuardrailDecision::Deflect {
                reason_code: "history_injection",
                user_message: "I'm Aria X, the CircuitOS concierge. Let's start fresh. What would you like to know about CircuitOS?".to_string(),
            };
        }

        GuardrailDecision::Allow
    }
}
