//! Heuristic token estimation.
//!
//! The pruning pass needs token counts for tool results that the provider
//! never reported usage for. A chars/4 heuristic with a word floor is close
//! enough for threshold decisions; exact counts only ever come back from the
//! provider itself.

use super::types::{ContentPart, Message};

/// Estimate the token count of a piece of text.
///
/// Uses `ceil(chars / 4)`, floored at the word count — prose averages about
/// four characters per token, while heavily punctuated content (JSON, code)
/// tokenizes closer to one token per word.
///
/// # Example
/// ```
/// use clawcore::history::tokens::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert!(estimate_tokens("hello world") >= 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let by_chars = text.chars().count().div_ceil(4);
    let by_words = text.split_whitespace().count();
    by_chars.max(by_words)
}

/// Estimate the token count of a single content part.
///
/// Tool parts include their JSON input; image data is counted at a flat
/// per-image cost since base64 length has no relation to token cost.
pub fn estimate_part_tokens(part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } | ContentPart::Reasoning { text } => estimate_tokens(text),
        ContentPart::Image { .. } => 1_500,
        ContentPart::File { path, data } => estimate_tokens(path) + estimate_tokens(data),
        ContentPart::ToolUse { name, input, .. } => {
            estimate_tokens(name) + estimate_tokens(&input.to_string())
        }
        ContentPart::ToolResult { content, .. } => estimate_tokens(content),
        ContentPart::Opaque { data, .. } => estimate_tokens(&data.to_string()),
    }
}

/// Estimate the token count of a whole message, including a small per-message
/// framing overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    4 + message.content.iter().map(estimate_part_tokens).sum::<usize>()
}
