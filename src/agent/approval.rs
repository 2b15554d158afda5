//! Tool approval gating.
//!
//! Every tool call the model emits passes through an approval callback
//! before execution. The callback is caller-supplied — an interactive front
//! end typically backs it with a `toolApproval` bus request — and may
//! approve with overridden parameters or deny with an optional reason. A
//! reason makes the denial recoverable: the model sees it and can adjust.

use async_trait::async_trait;
use serde_json::Value;

use crate::providers::ToolCallRequest;
use crate::tools::ToolCategory;

/// The verdict of an approval callback for one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    /// Whether the call may execute
    pub approved: bool,
    /// Optional replacement parameters for the call
    pub params: Option<Value>,
    /// Optional reason for a denial. A denial with a reason stops only the
    /// current batch; without one it fails the whole loop.
    pub deny_reason: Option<String>,
}

impl ApprovalDecision {
    /// Approve the call as-is.
    pub fn approve() -> Self {
        Self {
            approved: true,
            params: None,
            deny_reason: None,
        }
    }

    /// Approve the call with overridden parameters.
    pub fn approve_with_params(params: Value) -> Self {
        Self {
            approved: true,
            params: Some(params),
            deny_reason: None,
        }
    }

    /// Deny the call without a reason. Terminal for the loop.
    pub fn deny() -> Self {
        Self {
            approved: false,
            params: None,
            deny_reason: None,
        }
    }

    /// Deny the call with feedback the model can react to next turn.
    pub fn deny_with_reason(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            params: None,
            deny_reason: Some(reason.into()),
        }
    }
}

/// Callback deciding whether a tool call may execute.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Decide on one tool call. Receives the (possibly transformed) call
    /// and the tool's category.
    async fn on_tool_approval(
        &self,
        tool_use: &ToolCallRequest,
        category: ToolCategory,
    ) -> ApprovalDecision;
}

/// Approval handler that approves everything. The default for headless
/// runs and nested summarization loops, where no tools execute anyway.
pub struct ApproveAll;

#[async_trait]
impl ApprovalHandler for ApproveAll {
    async fn on_tool_approval(
        &self,
        _tool_use: &ToolCallRequest,
        _category: ToolCategory,
    ) -> ApprovalDecision {
        ApprovalDecision::approve()
    }
}

/// Transform hook applied to a tool call before approval.
///
/// Lets embedders rewrite calls (path normalization, parameter injection)
/// so approvers and executors both see the final form.
pub type ToolTransform = Box<dyn Fn(ToolCallRequest) -> ToolCallRequest + Send + Sync>;
