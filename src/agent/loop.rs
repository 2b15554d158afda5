//! Agent loop implementation
//!
//! This module provides the core agent loop: build a prompt from history,
//! stream a completion, gate and execute tool calls, commit results, and
//! repeat until the model stops calling tools, an unrecoverable error
//! occurs, or a limit or cancellation fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, CompressionConfig};
use crate::error::{CoreError, ProviderError, Result};
use crate::history::{
    compress_if_needed, to_provider_messages, ContentPart, HistoryLog, Message, MessageId, Role,
    Summarizer, TokenUsage,
};
use crate::history::compress::SUMMARY_SYSTEM_PROMPT;
use crate::providers::{
    compute_backoff_ms, CompletionRequest, ModelProvider, StopReason, StreamEvent,
    ToolCallRequest, ToolChoice,
};
use crate::tools::{ToolRegistry, ToolResult};

use super::approval::{ApprovalHandler, ApproveAll, ToolTransform};
use super::cancel::CancelToken;
use super::prompt::{expand_file_references, PromptBuilder};

/// Placeholder recorded for tool calls skipped after a denial in the batch.
pub const SKIPPED_RESULT: &str = "Skipped: an earlier tool call in this batch was denied";

/// Why a loop run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A tool call was denied without a reason
    ToolDenied,
    /// The model-turn limit was exceeded
    MaxTurnsExceeded,
    /// The provider failed with a non-retryable error or retries ran out
    ApiError,
    /// The cancellation token was observed
    Canceled,
}

/// A failed loop run.
///
/// Carries enough state to resume or report: the failure detail, the
/// offending tool use for denials, and usage/turn counters up to the
/// failure. The partial history stays in the caller's [`HistoryLog`].
#[derive(Debug)]
pub struct LoopFailure {
    /// The failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
    /// The denied tool call, for `ToolDenied` failures
    pub denied_tool: Option<ToolCallRequest>,
    /// Structured provider detail, for `ApiError` failures
    pub provider_error: Option<ProviderError>,
    /// Completed model turns before the failure
    pub turns: u32,
    /// Executed tool calls before the failure
    pub tool_calls: u32,
    /// Accumulated usage before the failure
    pub usage: TokenUsage,
}

impl std::fmt::Display for LoopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for LoopFailure {}

/// A successful loop run.
#[derive(Debug)]
pub struct LoopOutcome {
    /// The final assistant text
    pub text: String,
    /// Completed model turns
    pub turns: u32,
    /// Executed tool calls
    pub tool_calls: u32,
    /// Accumulated usage across all turns
    pub usage: TokenUsage,
    /// Wall-clock duration of the run
    pub duration: Duration,
    /// Total stream retries across all turns
    pub retries_attempted: u32,
}

/// Result of a loop run.
pub type LoopResult = std::result::Result<LoopOutcome, LoopFailure>;

/// Live callbacks invoked while a turn streams.
#[derive(Default)]
pub struct LoopHooks {
    /// Called for each assistant text fragment
    pub on_text_delta: Option<Box<dyn Fn(&str) + Send + Sync>>,
    /// Called for each reasoning fragment
    pub on_reasoning_delta: Option<Box<dyn Fn(&str) + Send + Sync>>,
    /// Called before a tool call enters the approval gate
    pub on_tool_start: Option<Box<dyn Fn(&ToolCallRequest) + Send + Sync>>,
    /// Called with each tool's result
    pub on_tool_result: Option<Box<dyn Fn(&str, &ToolResult) + Send + Sync>>,
}

impl std::fmt::Debug for LoopHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHooks")
            .field("on_text_delta", &self.on_text_delta.is_some())
            .field("on_reasoning_delta", &self.on_reasoning_delta.is_some())
            .field("on_tool_start", &self.on_tool_start.is_some())
            .field("on_tool_result", &self.on_tool_result.is_some())
            .finish()
    }
}

/// One consumed completion stream.
#[derive(Debug, Default)]
struct StreamResult {
    text: String,
    reasoning: String,
    tool_calls: Vec<ToolCallRequest>,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
    /// Retries spent before this stream succeeded
    retries_attempted: u32,
}

/// Why one stream attempt failed.
enum StreamError {
    Canceled,
    Provider(ProviderError),
}

/// The agent execution loop.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use clawcore::agent::{AgentLoop, CancelToken};
/// use clawcore::tools::{EchoTool, ToolRegistry};
///
/// let mut tools = ToolRegistry::new();
/// tools.register(Box::new(EchoTool));
///
/// let agent = AgentLoop::new(provider, Arc::new(tools));
/// let (log, result) = agent.run_prompt("echo hello", CancelToken::new()).await;
/// println!("{}", result.unwrap().text);
/// ```
pub struct AgentLoop {
    /// The streaming provider
    provider: Arc<dyn ModelProvider>,
    /// The tool registry
    tools: Arc<ToolRegistry>,
    /// Approval gate for tool calls
    approval: Arc<dyn ApprovalHandler>,
    /// Optional pre-approval call transform
    transform: Option<ToolTransform>,
    /// Summarization capability for compaction
    summarizer: Option<Arc<dyn Summarizer>>,
    /// System prompt assembly
    prompt: PromptBuilder,
    /// Live streaming callbacks
    hooks: LoopHooks,
    /// Loop settings
    agent_config: AgentConfig,
    /// Compression thresholds, immutable per run
    compression: CompressionConfig,
    /// When false, completions run with no tools (nested summarization)
    tools_enabled: bool,
}

impl AgentLoop {
    /// Create a new agent loop with default configuration and an
    /// approve-everything gate.
    pub fn new(provider: Arc<dyn ModelProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            approval: Arc::new(ApproveAll),
            transform: None,
            summarizer: None,
            prompt: PromptBuilder::new(),
            hooks: LoopHooks::default(),
            agent_config: AgentConfig::default(),
            compression: CompressionConfig::default(),
            tools_enabled: true,
        }
    }

    /// Set the approval handler.
    pub fn with_approval(mut self, approval: Arc<dyn ApprovalHandler>) -> Self {
        self.approval = approval;
        self
    }

    /// Set the pre-approval tool call transform.
    pub fn with_transform(mut self, transform: ToolTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Set the summarization capability used by compaction.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Set the prompt builder.
    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set the streaming hooks.
    pub fn with_hooks(mut self, hooks: LoopHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the agent configuration.
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.agent_config = config;
        self
    }

    /// Set the compression configuration.
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Disable tools for this loop. Completions are requested with
    /// `ToolChoice::None` and no definitions.
    pub fn with_tools_disabled(mut self) -> Self {
        self.tools_enabled = false;
        self
    }

    /// Seed a fresh history with a user prompt and run to completion.
    ///
    /// Returns the history alongside the result so callers keep the full
    /// (possibly partial) conversation either way.
    pub async fn run_prompt(&self, prompt: &str, cancel: CancelToken) -> (HistoryLog, LoopResult) {
        let mut log = HistoryLog::new();
        if let Err(e) = log.add_message(Message::user(prompt)) {
            let failure = LoopFailure {
                kind: FailureKind::ApiError,
                message: format!("failed to seed history: {}", e),
                denied_tool: None,
                provider_error: None,
                turns: 0,
                tool_calls: 0,
                usage: TokenUsage::default(),
            };
            return (log, Err(failure));
        }
        let result = self.run(&mut log, cancel).await;
        (log, result)
    }

    /// Run the loop over an existing history until completion or failure.
    ///
    /// The history is the caller's: on failure it holds the partial
    /// conversation up to the failing turn.
    pub async fn run(&self, log: &mut HistoryLog, cancel: CancelToken) -> LoopResult {
        let started = Instant::now();
        let model = self.agent_config.model.clone();
        let mut turns: u32 = 0;
        let mut tool_call_count: u32 = 0;
        let mut usage_total = TokenUsage::default();
        let mut retries_total: u32 = 0;
        // The turn-limit budget. Incremented per model turn; a completed
        // tool batch refunds its turn, so the limit bounds model turns that
        // conclude the conversation, not tool-invocation depth.
        let mut turn_budget: u32 = 0;

        // One-shot file reference expansion on the latest user message,
        // computed before the first turn and substituted at prompt build.
        let expansion = self.expand_latest_user_message(log);

        let fail = |kind: FailureKind,
                    message: String,
                    denied_tool: Option<ToolCallRequest>,
                    provider_error: Option<ProviderError>,
                    turns: u32,
                    tool_calls: u32,
                    usage: TokenUsage| {
            LoopFailure {
                kind,
                message,
                denied_tool,
                provider_error,
                turns,
                tool_calls,
                usage,
            }
        };

        loop {
            // 1. Turn-limit check
            if turn_budget >= self.agent_config.max_turns {
                return Err(fail(
                    FailureKind::MaxTurnsExceeded,
                    format!("exceeded {} model turns", self.agent_config.max_turns),
                    None,
                    None,
                    turns,
                    tool_call_count,
                    usage_total,
                ));
            }
            if cancel.is_canceled() {
                return Err(fail(
                    FailureKind::Canceled,
                    "canceled before turn start".into(),
                    None,
                    None,
                    turns,
                    tool_call_count,
                    usage_total,
                ));
            }

            // 2. Context check before building the prompt
            let window = self.effective_context_window(&model);
            if let Err(e) = compress_if_needed(
                log,
                &self.compression,
                window,
                &model,
                self.summarizer.as_deref(),
            )
            .await
            {
                return Err(fail(
                    FailureKind::ApiError,
                    format!("compression failed: {}", e),
                    None,
                    None,
                    turns,
                    tool_call_count,
                    usage_total,
                ));
            }

            // 3. Prompt assembly
            let request = match self.build_request(log, &model, &expansion, &cancel) {
                Ok(r) => r,
                Err(e) => {
                    return Err(fail(
                        FailureKind::ApiError,
                        format!("prompt assembly failed: {}", e),
                        None,
                        None,
                        turns,
                        tool_call_count,
                        usage_total,
                    ));
                }
            };

            // 4-5. Stream the completion with retry
            let stream_result = match self.stream_with_retry(&request, &cancel).await {
                Ok(r) => r,
                Err(StreamError::Canceled) => {
                    return Err(fail(
                        FailureKind::Canceled,
                        "canceled while streaming".into(),
                        None,
                        None,
                        turns,
                        tool_call_count,
                        usage_total,
                    ));
                }
                Err(StreamError::Provider(pe)) => {
                    return Err(fail(
                        FailureKind::ApiError,
                        pe.to_string(),
                        None,
                        Some(pe),
                        turns,
                        tool_call_count,
                        usage_total,
                    ));
                }
            };
            retries_total += stream_result.retries_attempted;

            // 6. Commit the assistant turn
            let mut parts: Vec<ContentPart> = Vec::new();
            if !stream_result.reasoning.is_empty() {
                parts.push(ContentPart::reasoning(stream_result.reasoning.clone()));
            }
            if !stream_result.text.is_empty() {
                parts.push(ContentPart::text(stream_result.text.clone()));
            }
            for call in &stream_result.tool_calls {
                parts.push(ContentPart::tool_use(
                    call.id.clone(),
                    call.name.clone(),
                    call.input.clone(),
                ));
            }
            let assistant = Message::assistant(parts)
                .with_model(&model)
                .with_usage(stream_result.usage);
            if let Err(e) = log.add_message(assistant) {
                return Err(fail(
                    FailureKind::ApiError,
                    format!("failed to commit assistant turn: {}", e),
                    None,
                    None,
                    turns,
                    tool_call_count,
                    usage_total,
                ));
            }
            usage_total.accumulate(&stream_result.usage);
            turns += 1;
            turn_budget += 1;
            debug!(
                turn = turns,
                tool_calls = stream_result.tool_calls.len(),
                stop_reason = ?stream_result.stop_reason,
                "Committed assistant turn"
            );

            // 7. No tool calls: the conversation is done
            if stream_result.tool_calls.is_empty() {
                info!(
                    turns = turns,
                    tool_calls = tool_call_count,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Loop completed"
                );
                return Ok(LoopOutcome {
                    text: stream_result.text,
                    turns,
                    tool_calls: tool_call_count,
                    usage: usage_total,
                    duration: started.elapsed(),
                    retries_attempted: retries_total,
                });
            }

            // 8. Approval-gate and execute the batch in emission order
            let mut results: Vec<ContentPart> = Vec::new();
            let mut denial: Option<(ToolCallRequest, Option<String>)> = None;
            let mut calls = stream_result.tool_calls.into_iter();

            while let Some(call) = calls.next() {
                let call = match &self.transform {
                    Some(transform) => transform(call),
                    None => call,
                };
                if let Some(hook) = &self.hooks.on_tool_start {
                    hook(&call);
                }

                let category = self
                    .tools
                    .get(&call.name)
                    .map(|t| t.category())
                    .unwrap_or(crate::tools::ToolCategory::Shell);
                let decision = self.approval.on_tool_approval(&call, category).await;

                if !decision.approved {
                    let reason = decision.deny_reason;
                    let denial_text = match &reason {
                        Some(r) => format!("Denied: {}", r),
                        None => "Denied".to_string(),
                    };
                    info!(tool = %call.name, with_reason = reason.is_some(), "Tool call denied");
                    results.push(ContentPart::tool_error(
                        call.id.clone(),
                        call.name.clone(),
                        call.input.clone(),
                        denial_text,
                    ));
                    // Remaining calls in the batch are recorded as skipped.
                    for rest in calls.by_ref() {
                        results.push(ContentPart::tool_error(
                            rest.id,
                            rest.name,
                            rest.input,
                            SKIPPED_RESULT,
                        ));
                    }
                    denial = Some((call, reason));
                    break;
                }

                let input = decision.params.unwrap_or_else(|| call.input.clone());
                let result = match self.tools.invoke(&call.name, input.clone(), &call.id).await {
                    Ok(r) => r,
                    Err(e) => ToolResult::error(format!("Tool execution error: {}", e)),
                };
                if let Some(hook) = &self.hooks.on_tool_result {
                    hook(&call.name, &result);
                }
                tool_call_count += 1;
                results.push(ContentPart::ToolResult {
                    tool_use_id: call.id,
                    tool_name: call.name,
                    input,
                    content: result.content,
                    is_error: result.is_error,
                    pruned: None,
                });
            }

            // 9. Commit the whole batch as one ordered tool-role message
            if let Err(e) = log.add_message(Message::tool_results(results)) {
                return Err(fail(
                    FailureKind::ApiError,
                    format!("failed to commit tool results: {}", e),
                    None,
                    None,
                    turns,
                    tool_call_count,
                    usage_total,
                ));
            }
            // Tool-only rounds refund their turn: the limit bounds model
            // turns, not tool-invocation depth.
            if stream_result.text.is_empty() {
                turn_budget -= 1;
            }

            if let Some((denied, reason)) = denial {
                match reason {
                    None => {
                        return Err(fail(
                            FailureKind::ToolDenied,
                            format!("tool call '{}' denied", denied.name),
                            Some(denied),
                            None,
                            turns,
                            tool_call_count,
                            usage_total,
                        ));
                    }
                    Some(_) => {
                        // Recoverable: the model sees the reason next turn.
                        continue;
                    }
                }
            }
        }
    }

    /// Context window: explicit configuration wins, else ask the provider.
    fn effective_context_window(&self, model: &str) -> u32 {
        if self.agent_config.context_window > 0 {
            self.agent_config.context_window
        } else {
            self.provider.context_window(model)
        }
    }

    /// Compute the one-shot expansion for the latest user message, if its
    /// text changes under expansion.
    fn expand_latest_user_message(
        &self,
        log: &HistoryLog,
    ) -> Option<(MessageId, Vec<ContentPart>)> {
        let path = log.active_messages().ok()?;
        let latest_user = path.iter().rev().find(|m| m.role == Role::User)?;

        let mut changed = false;
        let parts: Vec<ContentPart> = latest_user
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => {
                    let expanded = expand_file_references(text);
                    if expanded != *text {
                        changed = true;
                    }
                    ContentPart::text(expanded)
                }
                other => other.clone(),
            })
            .collect();

        if changed {
            debug!(message_id = %latest_user.id, "Expanded file references in user message");
            Some((latest_user.id.clone(), parts))
        } else {
            None
        }
    }

    /// Assemble the completion request for the current history state.
    fn build_request(
        &self,
        log: &HistoryLog,
        model: &str,
        expansion: &Option<(MessageId, Vec<ContentPart>)>,
        cancel: &CancelToken,
    ) -> Result<CompletionRequest> {
        let path = log.active_messages()?;
        let owned: Vec<Message> = path
            .into_iter()
            .map(|m| match expansion {
                Some((id, parts)) if *id == m.id => {
                    let mut substituted = m.clone();
                    substituted.content = parts.clone();
                    substituted
                }
                _ => m.clone(),
            })
            .collect();
        let refs: Vec<&Message> = owned.iter().collect();
        let messages = to_provider_messages(&refs)?;

        let (tools, tool_choice) = if self.tools_enabled {
            (self.tools.definitions(), ToolChoice::Auto)
        } else {
            (Vec::new(), ToolChoice::None)
        };

        Ok(CompletionRequest {
            model: model.to_string(),
            system: self.prompt.system_text(),
            messages,
            tools,
            tool_choice,
            max_tokens: self.agent_config.max_tokens,
            response_format: None,
            thinking: None,
            cancel: cancel.clone(),
        })
    }

    /// Stream one completion, retrying transient failures with exponential
    /// backoff. Cancellation during a backoff wait aborts immediately
    /// instead of spending another attempt.
    async fn stream_with_retry(
        &self,
        request: &CompletionRequest,
        cancel: &CancelToken,
    ) -> std::result::Result<StreamResult, StreamError> {
        let max_attempts = self.agent_config.max_attempts.max(1);
        let mut last_error = ProviderError::Unknown("no attempts made".into());

        for attempt in 0..max_attempts {
            if cancel.is_canceled() {
                return Err(StreamError::Canceled);
            }

            let error = match self.stream_once(request.clone(), cancel).await {
                Ok(result) => {
                    // A stream with neither text nor tool calls is itself a
                    // transient failure.
                    if result.text.is_empty() && result.tool_calls.is_empty() {
                        ProviderError::EmptyResponse
                    } else {
                        let mut result = result;
                        result.retries_attempted = attempt;
                        return Ok(result);
                    }
                }
                Err(StreamError::Canceled) => return Err(StreamError::Canceled),
                Err(StreamError::Provider(pe)) => pe,
            };

            if !error.is_retryable() {
                return Err(StreamError::Provider(error));
            }
            if attempt + 1 >= max_attempts {
                warn!(attempts = max_attempts, error = %error, "Stream retries exhausted");
                return Err(StreamError::Provider(error));
            }

            let delay = compute_backoff_ms(
                attempt,
                self.agent_config.backoff_base_ms,
                self.agent_config.backoff_max_ms,
            );
            warn!(
                attempt = attempt + 1,
                max_attempts = max_attempts,
                delay_ms = delay,
                error = %error,
                "Retrying stream after transient error"
            );
            last_error = error;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = cancel.cancelled() => return Err(StreamError::Canceled),
            }
        }

        Err(StreamError::Provider(last_error))
    }

    /// Open and fully consume one completion stream, firing per-delta hooks
    /// live without buffering beyond the turn.
    async fn stream_once(
        &self,
        request: CompletionRequest,
        cancel: &CancelToken,
    ) -> std::result::Result<StreamResult, StreamError> {
        let mut stream = self.provider.stream(request).await.map_err(|e| match e {
            CoreError::Provider(pe) => StreamError::Provider(pe),
            other => StreamError::Provider(ProviderError::Unknown(other.to_string())),
        })?;

        let mut result = StreamResult::default();

        while let Some(event) = stream.next().await {
            if cancel.is_canceled() {
                return Err(StreamError::Canceled);
            }
            match event {
                StreamEvent::TextDelta(text) => {
                    if let Some(hook) = &self.hooks.on_text_delta {
                        hook(&text);
                    }
                    result.text.push_str(&text);
                }
                StreamEvent::ReasoningDelta(text) => {
                    if let Some(hook) = &self.hooks.on_reasoning_delta {
                        hook(&text);
                    }
                    result.reasoning.push_str(&text);
                }
                StreamEvent::ToolCall(call) => {
                    result.tool_calls.push(call);
                }
                StreamEvent::Finish { usage, stop_reason } => {
                    result.usage = usage;
                    result.stop_reason = Some(stop_reason);
                }
                StreamEvent::Error(pe) => {
                    return Err(StreamError::Provider(pe));
                }
            }
        }

        Ok(result)
    }
}

/// The nested summarization capability: a tool-free loop invocation over a
/// transcript copy, producing the structured summary compaction needs.
#[async_trait]
impl Summarizer for AgentLoop {
    async fn summarize(&self, history: &[Message], model: &str) -> Result<String> {
        let mut nested = HistoryLog::new();
        for message in history {
            nested.add_message(message.clone())?;
        }
        nested.add_message(Message::user(
            "Summarize the conversation above following the required structure.",
        ))?;

        let mut agent_config = self.agent_config.clone();
        agent_config.model = model.to_string();
        // The summary may spend the output budget the loop reserves.
        agent_config.max_tokens = self.compression.reserved_output_tokens;
        let sub = AgentLoop {
            provider: Arc::clone(&self.provider),
            tools: Arc::clone(&self.tools),
            approval: Arc::new(ApproveAll),
            transform: None,
            // No summarizer: the nested run must not recurse into compaction.
            summarizer: None,
            prompt: PromptBuilder::new().with_system_prompt(SUMMARY_SYSTEM_PROMPT),
            hooks: LoopHooks::default(),
            agent_config,
            compression: CompressionConfig {
                auto_compact: false,
                ..self.compression.clone()
            },
            tools_enabled: false,
        };

        let outcome = sub
            .run(&mut nested, CancelToken::new())
            .await
            .map_err(|f| CoreError::Compression(format!("summary run failed: {}", f)))?;
        Ok(outcome.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::approval::ApprovalDecision;
    use crate::tools::{EchoTool, ToolCategory};
    use futures::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// A scripted provider: each call pops the next canned response.
    struct ScriptedProvider {
        script: Mutex<Vec<Vec<StreamEvent>>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn text_turn(text: &str) -> Vec<StreamEvent> {
            vec![
                StreamEvent::TextDelta(text.to_string()),
                StreamEvent::Finish {
                    usage: TokenUsage::new(10, 5, 0),
                    stop_reason: StopReason::EndTurn,
                },
            ]
        }

        fn tool_turn(calls: Vec<ToolCallRequest>) -> Vec<StreamEvent> {
            let mut events: Vec<StreamEvent> =
                calls.into_iter().map(StreamEvent::ToolCall).collect();
            events.push(StreamEvent::Finish {
                usage: TokenUsage::new(10, 5, 0),
                stop_reason: StopReason::ToolUse,
            });
            events
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        fn context_window(&self, _model: &str) -> u32 {
            200_000
        }

        async fn stream(&self, _request: CompletionRequest) -> Result<crate::providers::EventStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(CoreError::Provider(ProviderError::ServerError(
                    "script exhausted".into(),
                )));
            }
            let events = script.remove(0);
            Ok(Box::pin(stream::iter(events)))
        }
    }

    fn agent_with(script: Vec<Vec<StreamEvent>>) -> AgentLoop {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoTool));
        AgentLoop::new(
            Arc::new(ScriptedProvider::new(script)),
            Arc::new(tools),
        )
    }

    #[tokio::test]
    async fn test_simple_text_turn() {
        let agent = agent_with(vec![ScriptedProvider::text_turn("All done.")]);
        let (log, result) = agent.run_prompt("hello", CancelToken::new()).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.text, "All done.");
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(outcome.retries_attempted, 0);
        // user + assistant
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_round_then_finish() {
        let agent = agent_with(vec![
            ScriptedProvider::tool_turn(vec![ToolCallRequest::new(
                "call_1",
                "echo",
                json!({"message": "ping"}),
            )]),
            ScriptedProvider::text_turn("Echoed."),
        ]);
        let (log, result) = agent.run_prompt("go", CancelToken::new()).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.text, "Echoed.");
        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.tool_calls, 1);
        // user + assistant(tool_use) + tool results + assistant
        assert_eq!(log.len(), 4);

        let tool_msg = &log.messages()[2];
        assert_eq!(tool_msg.role, Role::Tool);
        match &tool_msg.content[0] {
            ContentPart::ToolResult { content, is_error, .. } => {
                assert_eq!(content, "ping");
                assert!(!is_error);
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_twice_then_success() {
        let agent = agent_with(vec![
            vec![StreamEvent::Error(ProviderError::Overloaded("busy".into()))],
            vec![StreamEvent::Error(ProviderError::ServerError("500".into()))],
            ScriptedProvider::text_turn("Recovered."),
        ])
        .with_config(AgentConfig {
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            ..Default::default()
        });

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.text, "Recovered.");
        assert_eq!(outcome.retries_attempted, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails() {
        let agent = agent_with(vec![vec![StreamEvent::Error(ProviderError::Auth(
            "bad key".into(),
        ))]]);
        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
        assert!(matches!(
            failure.provider_error,
            Some(ProviderError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails() {
        let agent = agent_with(vec![
            vec![StreamEvent::Error(ProviderError::ServerError("a".into()))],
            vec![StreamEvent::Error(ProviderError::ServerError("b".into()))],
            vec![StreamEvent::Error(ProviderError::ServerError("c".into()))],
        ])
        .with_config(AgentConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            ..Default::default()
        });

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ApiError);
    }

    #[tokio::test]
    async fn test_empty_stream_is_retryable() {
        let agent = agent_with(vec![
            // Finish with no content at all
            vec![StreamEvent::Finish {
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            }],
            ScriptedProvider::text_turn("Second try."),
        ])
        .with_config(AgentConfig {
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            ..Default::default()
        });

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.text, "Second try.");
        assert_eq!(outcome.retries_attempted, 1);
    }

    #[tokio::test]
    async fn test_canceled_before_start() {
        let agent = agent_with(vec![ScriptedProvider::text_turn("never")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let (_log, result) = agent.run_prompt("go", cancel).await;
        assert_eq!(result.unwrap_err().kind, FailureKind::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_returns_canceled() {
        // First attempt fails retryable with a long backoff; cancel fires
        // during the wait. The loop must return Canceled, not retry.
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![StreamEvent::Error(ProviderError::Overloaded("busy".into()))],
            ScriptedProvider::text_turn("should not be reached"),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoTool));
        let agent = AgentLoop::new(provider.clone(), Arc::new(tools)).with_config(AgentConfig {
            backoff_base_ms: 60_000,
            backoff_max_ms: 60_000,
            ..Default::default()
        });

        let cancel = CancelToken::new();
        let canceler = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceler.cancel();
        });

        let (_log, result) = agent.run_prompt("go", cancel).await;
        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Canceled);
        // Only the first attempt ran; no retry after cancellation.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    /// A turn that narrates while calling tools: counts against the limit.
    fn narrated_tool_turn(call_id: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta("Working on it.".into()),
            StreamEvent::ToolCall(ToolCallRequest::new(
                call_id,
                "echo",
                json!({"message": "x"}),
            )),
            StreamEvent::Finish {
                usage: TokenUsage::new(10, 5, 0),
                stop_reason: StopReason::ToolUse,
            },
        ]
    }

    #[tokio::test]
    async fn test_max_turns_exceeded() {
        // Each scripted turn carries text alongside its tool call, so every
        // one consumes the budget. With max_turns = 2 the third check fails.
        let agent = agent_with(vec![
            narrated_tool_turn("call_1"),
            narrated_tool_turn("call_2"),
            narrated_tool_turn("call_3"),
        ])
        .with_config(AgentConfig {
            max_turns: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            ..Default::default()
        });

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::MaxTurnsExceeded);
        assert_eq!(failure.turns, 2);
        assert_eq!(failure.tool_calls, 2);
    }

    #[tokio::test]
    async fn test_tool_rounds_do_not_exhaust_turn_budget() {
        // max_turns = 1 but the conversation needs a tool round first.
        // Tool rounds refund the budget, so this must still complete.
        let agent = agent_with(vec![
            ScriptedProvider::tool_turn(vec![ToolCallRequest::new(
                "call_1",
                "echo",
                json!({"message": "a"}),
            )]),
            ScriptedProvider::tool_turn(vec![ToolCallRequest::new(
                "call_2",
                "echo",
                json!({"message": "b"}),
            )]),
            ScriptedProvider::text_turn("done"),
        ])
        .with_config(AgentConfig {
            max_turns: 1,
            ..Default::default()
        });

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.text, "done");
        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.tool_calls, 2);
    }

    struct DenyAll {
        reason: Option<String>,
    }

    #[async_trait]
    impl ApprovalHandler for DenyAll {
        async fn on_tool_approval(
            &self,
            _tool_use: &ToolCallRequest,
            _category: ToolCategory,
        ) -> ApprovalDecision {
            match &self.reason {
                Some(r) => ApprovalDecision::deny_with_reason(r.clone()),
                None => ApprovalDecision::deny(),
            }
        }
    }

    #[tokio::test]
    async fn test_reasonless_denial_fails_loop_with_placeholders() {
        let agent = agent_with(vec![ScriptedProvider::tool_turn(vec![
            ToolCallRequest::new("call_1", "echo", json!({"message": "a"})),
            ToolCallRequest::new("call_2", "echo", json!({"message": "b"})),
            ToolCallRequest::new("call_3", "echo", json!({"message": "c"})),
        ])])
        .with_approval(Arc::new(DenyAll { reason: None }));

        let (log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ToolDenied);
        assert_eq!(failure.denied_tool.as_ref().unwrap().id, "call_1");

        // Exactly three tool-result entries: one denial + two skipped.
        let tool_msg = log
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .expect("batch committed");
        assert_eq!(tool_msg.content.len(), 3);
        let contents: Vec<String> = tool_msg
            .content
            .iter()
            .map(|p| match p {
                ContentPart::ToolResult { content, .. } => content.clone(),
                other => panic!("unexpected part {:?}", other),
            })
            .collect();
        assert_eq!(contents[0], "Denied");
        assert_eq!(contents[1], SKIPPED_RESULT);
        assert_eq!(contents[2], SKIPPED_RESULT);
    }

    #[tokio::test]
    async fn test_denial_with_reason_continues_loop() {
        let agent = agent_with(vec![
            ScriptedProvider::tool_turn(vec![
                ToolCallRequest::new("call_1", "echo", json!({"message": "a"})),
                ToolCallRequest::new("call_2", "echo", json!({"message": "b"})),
            ]),
            ScriptedProvider::text_turn("Understood, stopping."),
        ])
        .with_approval(Arc::new(DenyAll {
            reason: Some("not allowed here".into()),
        }));

        let (log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.text, "Understood, stopping.");

        // The denial carries the reason; the second call was skipped.
        let tool_msg = log
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(tool_msg.content.len(), 2);
        match &tool_msg.content[0] {
            ContentPart::ToolResult { content, is_error, .. } => {
                assert!(content.contains("not allowed here"));
                assert!(is_error);
            }
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approval_param_override() {
        struct Rewriter;

        #[async_trait]
        impl ApprovalHandler for Rewriter {
            async fn on_tool_approval(
                &self,
                _tool_use: &ToolCallRequest,
                _category: ToolCategory,
            ) -> ApprovalDecision {
                ApprovalDecision::approve_with_params(
                    json!({"message": "rewritten"}),
                )
            }
        }

        let agent = agent_with(vec![
            ScriptedProvider::tool_turn(vec![ToolCallRequest::new(
                "call_1",
                "echo",
                json!({"message": "original"}),
            )]),
            ScriptedProvider::text_turn("ok"),
        ])
        .with_approval(Arc::new(Rewriter));

        let (log, result) = agent.run_prompt("go", CancelToken::new()).await;
        result.unwrap();

        let tool_msg = log
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        match &tool_msg.content[0] {
            ContentPart::ToolResult { content, input, .. } => {
                assert_eq!(content, "rewritten");
                assert_eq!(input["message"], "rewritten");
            }
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transform_runs_before_approval() {
        struct Recording {
            seen: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl ApprovalHandler for Recording {
            async fn on_tool_approval(
                &self,
                tool_use: &ToolCallRequest,
                _category: ToolCategory,
            ) -> ApprovalDecision {
                self.seen
                    .lock()
                    .unwrap()
                    .push(tool_use.input["message"].as_str().unwrap().to_string());
                ApprovalDecision::approve()
            }
        }

        let recorder = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let agent = agent_with(vec![
            ScriptedProvider::tool_turn(vec![ToolCallRequest::new(
                "call_1",
                "echo",
                json!({"message": "raw"}),
            )]),
            ScriptedProvider::text_turn("ok"),
        ])
        .with_approval(recorder.clone())
        .with_transform(Box::new(|mut call| {
            call.input = json!({"message": "transformed"});
            call
        }));

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        result.unwrap();
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["transformed"]);
    }

    #[tokio::test]
    async fn test_text_delta_hooks_fire_live() {
        let collected = Arc::new(Mutex::new(String::new()));
        let sink = collected.clone();
        let hooks = LoopHooks {
            on_text_delta: Some(Box::new(move |delta| {
                sink.lock().unwrap().push_str(delta);
            })),
            ..Default::default()
        };

        let agent = agent_with(vec![vec![
            StreamEvent::TextDelta("Hel".into()),
            StreamEvent::TextDelta("lo".into()),
            StreamEvent::Finish {
                usage: TokenUsage::new(5, 2, 0),
                stop_reason: StopReason::EndTurn,
            },
        ]])
        .with_hooks(hooks);

        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        assert_eq!(result.unwrap().text, "Hello");
        assert_eq!(collected.lock().unwrap().as_str(), "Hello");
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_turns() {
        let agent = agent_with(vec![
            ScriptedProvider::tool_turn(vec![ToolCallRequest::new(
                "call_1",
                "echo",
                json!({"message": "x"}),
            )]),
            ScriptedProvider::text_turn("done"),
        ]);
        let (_log, result) = agent.run_prompt("go", CancelToken::new()).await;
        let outcome = result.unwrap();
        // Two turns at 10 prompt + 5 completion each
        assert_eq!(outcome.usage.prompt_tokens, 20);
        assert_eq!(outcome.usage.completion_tokens, 10);
    }

    #[tokio::test]
    async fn test_reasoning_committed_to_history() {
        let agent = agent_with(vec![vec![
            StreamEvent::ReasoningDelta("pondering...".into()),
            StreamEvent::TextDelta("answer".into()),
            StreamEvent::Finish {
                usage: TokenUsage::new(5, 2, 0),
                stop_reason: StopReason::EndTurn,
            },
        ]]);
        let (log, result) = agent.run_prompt("go", CancelToken::new()).await;
        result.unwrap();

        let assistant = log
            .messages()
            .iter()
            .find(|m| m.role == Role::Assistant)
            .unwrap();
        assert!(matches!(
            assistant.content[0],
            ContentPart::Reasoning { .. }
        ));
        assert_eq!(assistant.model.as_deref(), Some("claw-3-sonnet"));
    }
}
