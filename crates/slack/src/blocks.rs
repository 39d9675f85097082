use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw JSON dumps are cut to this many characters before fencing.
pub const MAX_JSON_DUMP_CHARS: usize = 2800;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
    Mrkdwn {
        text: String,
    },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into(), emoji: Some(true) }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text, .. } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: TextObject,
    },
    Section {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<TextObject>,
    },
    Divider,
    Context {
        elements: Vec<TextObject>,
    },
}

/// What a command handler hands back: fallback text plus optional Block Kit layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl CommandResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), blocks: Vec::new() }
    }
}

/// Body of a `chat.postMessage` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub channel: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl OutboundReply {
    pub fn new(channel: impl Into<String>, result: CommandResult) -> Self {
        let blocks = (!result.blocks.is_empty()).then_some(result.blocks);
        Self { channel: channel.into(), text: result.text, blocks, thread_ts: None }
    }

    pub fn in_thread(mut self, thread_ts: Option<String>) -> Self {
        self.thread_ts = thread_ts;
        self
    }

    pub fn into_result(self) -> CommandResult {
        CommandResult { text: self.text, blocks: self.blocks.unwrap_or_default() }
    }
}

pub struct MessageBuilder {
    text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { text: TextObject::plain(text) });
        self
    }

    pub fn section(mut self, mrkdwn: impl Into<String>) -> Self {
        self.blocks
            .push(Block::Section { text: Some(TextObject::mrkdwn(mrkdwn)), fields: Vec::new() });
        self
    }

    pub fn fields<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut FieldsBuilder),
    {
        let mut builder = FieldsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { text: None, fields: builder.build() });
        self
    }

    pub fn json_dump(self, value: &Value) -> Self {
        self.section(fenced_json(value))
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn context(mut self, mrkdwn: impl Into<String>) -> Self {
        self.blocks.push(Block::Context { elements: vec![TextObject::mrkdwn(mrkdwn)] });
        self
    }

    /// Applies `build` only when `condition` holds; keeps optional sections inline.
    pub fn when<F>(self, condition: bool, build: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition {
            build(self)
        } else {
            self
        }
    }

    pub fn build(self) -> CommandResult {
        CommandResult { text: self.text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct FieldsBuilder {
    fields: Vec<TextObject>,
}

impl FieldsBuilder {
    /// Adds a `*Label:*\nvalue` field.
    pub fn field(&mut self, label: &str, value: impl AsRef<str>) -> &mut Self {
        self.fields.push(TextObject::mrkdwn(format!("*{label}:*\n{}", value.as_ref())));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.fields
    }
}

/// Pretty-prints `value`, truncates it and wraps it in a code fence.
pub fn fenced_json(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```{}```", truncate_chars(&pretty, MAX_JSON_DUMP_CHARS))
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        fenced_json, truncate_chars, Block, CommandResult, MessageBuilder, OutboundReply,
        TextObject, MAX_JSON_DUMP_CHARS,
    };

    #[test]
    fn builder_serializes_to_block_kit_shapes() {
        let result = MessageBuilder::new("Dashboard overview for gym")
            .header("Dashboard: gym")
            .fields(|fields| {
                fields.field("Scored", "12").field("Avg Score", "0.42");
            })
            .divider()
            .context("Checked at noon")
            .build();

        let value = serde_json::to_value(&result.blocks).expect("serialize blocks");
        assert_eq!(
            value,
            json!([
                {"type": "header", "text": {"type": "plain_text", "text": "Dashboard: gym", "emoji": true}},
                {"type": "section", "fields": [
                    {"type": "mrkdwn", "text": "*Scored:*\n12"},
                    {"type": "mrkdwn", "text": "*Avg Score:*\n0.42"}
                ]},
                {"type": "divider"},
                {"type": "context", "elements": [{"type": "mrkdwn", "text": "Checked at noon"}]}
            ])
        );
    }

    #[test]
    fn reply_payload_preserves_text_and_block_order() {
        let result = MessageBuilder::new("Recent blog posts (2)")
            .header("Recent Blog Posts")
            .section("- *One* (draft)\n- *Two* (published)")
            .divider()
            .build();

        let reply = OutboundReply::new("C123", result.clone()).in_thread(Some("171.000".into()));
        let wire = serde_json::to_string(&reply).expect("serialize reply");
        let parsed: OutboundReply = serde_json::from_str(&wire).expect("parse reply");

        assert_eq!(parsed.thread_ts.as_deref(), Some("171.000"));
        assert_eq!(parsed.into_result(), result);
    }

    #[test]
    fn text_only_reply_omits_blocks_and_thread() {
        let reply = OutboundReply::new("C1", CommandResult::text("Rate limited."));
        let value = serde_json::to_value(&reply).expect("serialize reply");
        assert_eq!(value, json!({"channel": "C1", "text": "Rate limited."}));
    }

    #[test]
    fn fenced_json_is_capped() {
        let big = json!({"payload": "x".repeat(MAX_JSON_DUMP_CHARS * 2)});
        let fenced = fenced_json(&big);
        assert!(fenced.starts_with("```{"));
        assert!(fenced.ends_with("```"));
        assert_eq!(fenced.chars().count(), MAX_JSON_DUMP_CHARS + 6);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn section_text_accessor() {
        let Block::Section { text: Some(text), .. } =
            MessageBuilder::new("t").section("body").build().blocks.remove(0)
        else {
            panic!("expected a text section");
        };
        assert_eq!(text, TextObject::mrkdwn("body"));
        assert_eq!(text.text(), "body");
    }
}
