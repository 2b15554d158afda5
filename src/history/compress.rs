//! Two-stage context compression: prune stale tool results, then compact
//! the whole history into a model-generated summary.
//!
//! Overflow is detected from provider-reported usage, not estimates: the
//! most recent assistant turn's `prompt + cache_read` tokens are compared
//! against the trigger fraction of the context window. Pruning replaces old
//! tool-result payloads with a timestamped placeholder while preserving
//! structure; compaction rewrites history entirely and is a last resort.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::CompressionConfig;
use crate::error::{CoreError, Result};

use super::log::HistoryLog;
use super::tokens::estimate_tokens;
use super::types::{ContentPart, Message, Role};

/// System prompt for the compaction summarizer.
///
/// Requests the dense structured summary the next loop run will stand on.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are summarizing an agent coding session so it can \
continue in a fresh context. Produce a dense, structured summary with these sections:\n\
1. Overview: what the session is about and the overall goal.\n\
2. Key facts: decisions made, constraints discovered, important values.\n\
3. File system state: files created, modified, or deleted, with paths.\n\
4. Recent actions: the last few tool invocations and their outcomes.\n\
5. Current plan: what remains to be done, in order.\n\
Be specific and complete; the summary replaces the entire conversation.";

/// The injected summarization capability.
///
/// Compaction needs a model completion over the current history. Routing
/// that through a trait instead of the loop type keeps the compression
/// engine free of a circular dependency on its own caller; the production
/// implementation is a tool-free agent loop.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the given conversation for context replacement.
    async fn summarize(&self, history: &[Message], model: &str) -> Result<String>;
}

/// Statistics from one pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Number of tool results whose content was replaced
    pub pruned_count: usize,
    /// Estimated tokens reclaimed
    pub pruned_tokens: usize,
}

/// What a compression pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionOutcome {
    /// No overflow detected; nothing changed
    NoAction,
    /// Pruning alone brought usage back under the threshold
    Pruned(PruneStats),
    /// History was replaced with a summary (after pruning)
    Compacted {
        /// Stats of the pruning stage that ran first
        pruned: PruneStats,
    },
}

/// Check whether the history has outgrown its context budget.
///
/// Returns `false` whenever `context_window` is 0 (unknown model limit) or
/// automatic compaction is disabled, regardless of token counts. Otherwise
/// true iff `used > context_window * trigger_ratio`, where `used` is the
/// prompt + cache-read count of the most recent assistant turn.
///
/// # Example
/// ```
/// use clawcore::config::CompressionConfig;
/// use clawcore::history::{compress::is_overflow, HistoryLog};
///
/// let log = HistoryLog::new();
/// let cfg = CompressionConfig::default();
/// assert!(!is_overflow(&log, &cfg, 0)); // unknown window never overflows
/// ```
pub fn is_overflow(log: &HistoryLog, cfg: &CompressionConfig, context_window: u32) -> bool {
    if context_window == 0 || !cfg.auto_compact {
        return false;
    }
    let used = match log.last_assistant_usage() {
        Some(usage) => usage.used_tokens() as f64,
        None => return false,
    };
    used > f64::from(context_window) * cfg.trigger_ratio
}

/// Placeholder written over a pruned tool result.
fn prune_placeholder(timestamp: chrono::DateTime<Utc>) -> String {
    format!(
        "[Tool result pruned from context at {}]",
        timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )
}

/// Prune stale tool results on the active path.
///
/// Scans newest-to-oldest, counting turns (assistant messages). Tool
/// results within the most recent `protected_turns` turns are skipped.
/// Past that window a running token estimate accumulates; once it exceeds
/// `protect_tokens`, every older qualifying result is marked pruned —
/// except results from tools on the `protected_tools` allow-list. The scan
/// halts at the first already-pruned result, which makes repeated pruning
/// idempotent.
///
/// The whole action commits only if the reclaimed estimate exceeds
/// `min_prune_tokens`; otherwise it is a no-op and the log is untouched.
pub fn prune(log: &mut HistoryLog, cfg: &CompressionConfig) -> PruneStats {
    // Phase 1: immutable scan collecting candidate (message, part) slots.
    let indices = log.active_indices_newest_first();
    let mut turns_seen = 0usize;
    let mut running = 0usize;
    let mut past_protect = false;
    let mut candidates: Vec<(usize, usize, usize)> = Vec::new();

    'scan: for &mi in &indices {
        let msg = &log.messages()[mi];
        if msg.role == Role::Assistant {
            turns_seen += 1;
            continue;
        }
        if msg.role != Role::Tool {
            continue;
        }
        // A tool batch seen before `protected_turns` assistant messages
        // belongs to the protected recent window.
        if turns_seen < cfg.protected_turns {
            continue;
        }
        for (pi, part) in msg.content.iter().enumerate() {
            if let ContentPart::ToolResult {
                tool_name,
                content,
                pruned,
                ..
            } = part
            {
                if pruned.is_some() {
                    // Everything older was handled by an earlier pass.
                    break 'scan;
                }
                let tokens = estimate_tokens(content);
                if past_protect {
                    if !cfg.protected_tools.iter().any(|t| t == tool_name) {
                        candidates.push((mi, pi, tokens));
                    }
                } else {
                    running += tokens;
                    if running > cfg.protect_tokens {
                        past_protect = true;
                    }
                }
            }
        }
    }

    let pruned_tokens: usize = candidates.iter().map(|&(_, _, t)| t).sum();
    if pruned_tokens <= cfg.min_prune_tokens {
        debug!(
            candidates = candidates.len(),
            tokens = pruned_tokens,
            min = cfg.min_prune_tokens,
            "Prune pass below minimum threshold, skipping"
        );
        return PruneStats::default();
    }

    // Phase 2: apply placeholders.
    let now = Utc::now();
    let placeholder = prune_placeholder(now);
    let arena = log.arena_mut();
    for &(mi, pi, _) in &candidates {
        if let ContentPart::ToolResult {
            content, pruned, ..
        } = &mut arena[mi].content[pi]
        {
            *content = placeholder.clone();
            *pruned = Some(now);
        }
    }

    let stats = PruneStats {
        pruned_count: candidates.len(),
        pruned_tokens,
    };
    info!(
        pruned_count = stats.pruned_count,
        pruned_tokens = stats.pruned_tokens,
        "Pruned stale tool results"
    );
    stats
}

/// Run the two-stage compression pipeline if the history is overflowing.
///
/// Stage one prunes stale tool results. If the estimated usage after
/// pruning still exceeds the trigger threshold, stage two asks the
/// injected [`Summarizer`] for a structured summary and replaces the
/// entire history with one synthetic user message containing it.
///
/// # Errors
/// - `CoreError::Compression` when the summarizer fails or returns an
///   empty summary. History is never silently truncated instead.
pub async fn compress_if_needed(
    log: &mut HistoryLog,
    cfg: &CompressionConfig,
    context_window: u32,
    model: &str,
    summarizer: Option<&dyn Summarizer>,
) -> Result<CompressionOutcome> {
    if !is_overflow(log, cfg, context_window) {
        return Ok(CompressionOutcome::NoAction);
    }

    let used = log
        .last_assistant_usage()
        .map(|u| u.used_tokens() as usize)
        .unwrap_or(0);
    info!(
        used_tokens = used,
        context_window = context_window,
        trigger_ratio = cfg.trigger_ratio,
        "Context overflow detected, compressing"
    );

    let stats = prune(log, cfg);

    // Re-check with the reclaimed estimate subtracted: reported usage is a
    // snapshot from before pruning.
    let threshold = f64::from(context_window) * cfg.trigger_ratio;
    let used_after = used.saturating_sub(stats.pruned_tokens);
    if (used_after as f64) <= threshold {
        return Ok(CompressionOutcome::Pruned(stats));
    }

    let Some(summarizer) = summarizer else {
        warn!("Still overflowing after pruning but no summarizer is configured");
        return Ok(CompressionOutcome::Pruned(stats));
    };

    let history: Vec<Message> = log
        .active_messages()?
        .into_iter()
        .cloned()
        .collect();
    let summary = summarizer
        .summarize(&history, model)
        .await
        .map_err(|e| CoreError::Compression(format!("summarizer failed: {}", e)))?;
    if summary.trim().is_empty() {
        return Err(CoreError::Compression(
            "summarizer returned an empty summary".into(),
        ));
    }

    let replacement = Message::user(&format!("[Conversation summary]\n\n{}", summary));
    log.reset_to(replacement)?;
    info!(summary_chars = summary.len(), "Compacted history into summary");

    Ok(CompressionOutcome::Compacted { pruned: stats })
}
