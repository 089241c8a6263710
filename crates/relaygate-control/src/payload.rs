//! Request payload rules and prompt construction per task kind.

use relaygate_store::TaskKind;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ControlError, Result};

/// Longest text field accepted in a payload, in characters.
pub const MAX_INPUT_CHARS: usize = 20_000;

/// The payload field carrying the text the provider works on.
#[must_use]
pub const fn input_field(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::ContentGeneration => "prompt",
        TaskKind::SentimentAnalysis => "text",
        TaskKind::Optimization => "content",
    }
}

/// Check a payload's shape for a task kind.
///
/// # Errors
///
/// Returns `ControlError::Validation` describing the first problem found.
pub fn validate(kind: TaskKind, payload: &Value) -> Result<()> {
    let object = payload
        .as_object()
        .ok_or_else(|| ControlError::Validation("payload must be a JSON object".to_string()))?;

    let field = input_field(kind);
    let text = object
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ControlError::Validation(format!(
            "{kind} requires a non-empty `{field}` string"
        )));
    }
    if text.chars().count() > MAX_INPUT_CHARS {
        return Err(ControlError::Validation(format!(
            "`{field}` is longer than {MAX_INPUT_CHARS} characters"
        )));
    }

    for optional in ["platform", "tone", "goal"] {
        if object.get(optional).is_some_and(|v| !v.is_string()) {
            return Err(ControlError::Validation(format!(
                "`{optional}` must be a string"
            )));
        }
    }

    match object.get("max_tokens") {
        None => Ok(()),
        Some(v) if v.as_u64().is_some_and(|n| n > 0) => Ok(()),
        Some(_) => Err(ControlError::Validation(
            "`max_tokens` must be a positive integer".to_string(),
        )),
    }
}

/// The completion size a payload asks for, if any.
#[must_use]
pub fn requested_max_tokens(payload: &Value) -> Option<u64> {
    payload.get("max_tokens").and_then(Value::as_u64)
}

/// One chat message sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `system` or `user`.
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

fn string_or<'a>(payload: &'a Value, field: &str, fallback: &'a str) -> &'a str {
    payload.get(field).and_then(Value::as_str).unwrap_or(fallback)
}

/// Build the provider conversation for a validated payload.
#[must_use]
pub fn messages(kind: TaskKind, payload: &Value) -> Vec<ChatMessage> {
    let platform = string_or(payload, "platform", "social media");
    let system = match kind {
        TaskKind::ContentGeneration => format!(
            "You write posts for {platform}. Use a {} tone. Reply with the post text only.",
            string_or(payload, "tone", "professional")
        ),
        TaskKind::SentimentAnalysis => "Classify the sentiment of the user's text. Reply with \
             JSON only: {\"sentiment\": \"positive\" | \"neutral\" | \"negative\", \
             \"score\": number from -1 to 1}."
            .to_string(),
        TaskKind::Optimization => format!(
            "You improve {platform} posts. Goal: {}. Reply with concrete suggestions.",
            string_or(payload, "goal", "engagement")
        ),
    };

    vec![
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: string_or(payload, input_field(kind), "").to_string(),
        },
    ]
}
