//! Conversion between history messages and the provider-neutral prompt format.
//!
//! The conversion is structural and lossless for every supported content
//! part. An unrecognized part is a hard error — silently dropping content
//! would corrupt the conversation the model sees.

use crate::error::{CoreError, Result};
use crate::providers::{PromptMessage, PromptPart};

use super::types::{ContentPart, Message};

/// Convert one content part to prompt format.
///
/// # Errors
/// - `CoreError::UnsupportedContent` for [`ContentPart::Opaque`] parts.
pub fn part_to_prompt(part: &ContentPart) -> Result<PromptPart> {
    match part {
        ContentPart::Text { text } => Ok(PromptPart::Text { text: text.clone() }),
        ContentPart::Reasoning { text } => Ok(PromptPart::Reasoning { text: text.clone() }),
        ContentPart::Image { media_type, data } => Ok(PromptPart::Image {
            media_type: media_type.clone(),
            data: data.clone(),
        }),
        ContentPart::File { path, data } => Ok(PromptPart::File {
            path: path.clone(),
            data: data.clone(),
        }),
        ContentPart::ToolUse { id, name, input } => Ok(PromptPart::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        }),
        ContentPart::ToolResult {
            tool_use_id,
            tool_name,
            input,
            content,
            is_error,
            pruned: _,
        } => Ok(PromptPart::ToolResult {
            tool_use_id: tool_use_id.clone(),
            tool_name: tool_name.clone(),
            input: input.clone(),
            content: content.clone(),
            is_error: *is_error,
        }),
        ContentPart::Opaque { kind, .. } => Err(CoreError::UnsupportedContent(kind.clone())),
    }
}

/// Convert a prompt part back into a history content part.
///
/// Inverse of [`part_to_prompt`] for all supported part types. Tool results
/// come back unpruned; the prune marker is compression bookkeeping, not
/// prompt content.
pub fn part_from_prompt(part: &PromptPart) -> ContentPart {
    match part {
        PromptPart::Text { text } => ContentPart::Text { text: text.clone() },
        PromptPart::Reasoning { text } => ContentPart::Reasoning { text: text.clone() },
        PromptPart::Image { media_type, data } => ContentPart::Image {
            media_type: media_type.clone(),
            data: data.clone(),
        },
        PromptPart::File { path, data } => ContentPart::File {
            path: path.clone(),
            data: data.clone(),
        },
        PromptPart::ToolUse { id, name, input } => ContentPart::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        PromptPart::ToolResult {
            tool_use_id,
            tool_name,
            input,
            content,
            is_error,
        } => ContentPart::ToolResult {
            tool_use_id: tool_use_id.clone(),
            tool_name: tool_name.clone(),
            input: input.clone(),
            content: content.clone(),
            is_error: *is_error,
            pruned: None,
        },
    }
}

/// Convert an active path of history messages into provider prompt messages.
///
/// Each message maps one-to-one; part order is preserved.
///
/// # Errors
/// - `CoreError::UnsupportedContent` if any message carries an
///   [`ContentPart::Opaque`] part.
pub fn to_provider_messages(path: &[&Message]) -> Result<Vec<PromptMessage>> {
    let mut out = Vec::with_capacity(path.len());
    for message in path {
        let mut content = Vec::with_capacity(message.content.len());
        for part in &message.content {
            content.push(part_to_prompt(part)?);
        }
        out.push(PromptMessage {
            role: message.role,
            content,
        });
    }
    Ok(out)
}
