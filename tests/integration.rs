//! Integration tests for ClawCore
//!
//! These tests verify that the components work together correctly: bus
//! request/response and event flow, history persistence through the sink,
//! provider conversion over real logs, and bus-backed tool approval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use clawcore::agent::{ApprovalDecision, ApprovalHandler};
use clawcore::bus::{Envelope, MessageBus, PipeTransport, Transport};
use clawcore::error::Result;
use clawcore::history::{
    to_provider_messages, ContentPart, HistoryLog, HistorySink, Message, Role,
};
use clawcore::providers::{PromptPart, ToolCallRequest};
use clawcore::tools::ToolCategory;

// ============================================================================
// Message Bus Integration Tests
// ============================================================================

#[tokio::test]
async fn test_bus_request_flow() {
    let (front, core) = MessageBus::over_pipe();
    front.start();
    core.start();

    core.register_handler("session.send", |params: Value| {
        Box::pin(async move {
            let text = params["text"].as_str().unwrap_or("").to_uppercase();
            Ok(json!({"reply": text}))
        })
    });

    let reply: Value = front
        .request("session.send", json!({"text": "hello"}), None)
        .await
        .unwrap();
    assert_eq!(reply["reply"], "HELLO");
}

#[tokio::test]
async fn test_bus_duplex_requests() {
    // Both sides can serve requests at once.
    let (a, b) = MessageBus::over_pipe();
    a.start();
    b.start();

    a.register_handler("side.a", |_| Box::pin(async { Ok(json!("from a")) }));
    b.register_handler("side.b", |_| Box::pin(async { Ok(json!("from b")) }));

    let from_b: Value = a.request("side.b", json!({}), None).await.unwrap();
    let from_a: Value = b.request("side.a", json!({}), None).await.unwrap();
    assert_eq!(from_b, json!("from b"));
    assert_eq!(from_a, json!("from a"));
}

#[tokio::test]
async fn test_bus_request_before_peer_attaches() {
    // A request sent while the transport is unpaired is buffered and
    // delivered once the peer attaches; the caller just sees a slow reply.
    let ours = Arc::new(PipeTransport::unpaired());
    let theirs = Arc::new(PipeTransport::unpaired());

    let front = MessageBus::new(ours.clone() as Arc<dyn Transport>);
    front.start();

    // Issue the request before pairing; the envelope parks in the buffer.
    let pending = {
        let front = front.clone();
        tokio::spawn(async move {
            front
                .request::<_, Value>("early.method", json!({"n": 1}), None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Now the peer shows up and the buffered request flushes to it.
    let core = MessageBus::new(theirs.clone() as Arc<dyn Transport>);
    core.start();
    core.register_handler("early.method", |params: Value| {
        Box::pin(async move { Ok(json!({"got": params["n"]})) })
    });
    PipeTransport::pair(&ours, &theirs).unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("buffered request must resolve after pairing")
        .unwrap()
        .unwrap();
    assert_eq!(reply["got"], 1);
}

#[tokio::test]
async fn test_transport_buffering_preserves_envelope_order() {
    let ours = PipeTransport::unpaired();
    for i in 0..10 {
        ours.send(Envelope::event(i, "seq", json!({ "i": i })))
            .await
            .unwrap();
    }

    let theirs = PipeTransport::unpaired();
    PipeTransport::pair(&ours, &theirs).unwrap();

    for i in 0..10 {
        assert_eq!(theirs.recv().await.unwrap().id(), i);
    }
}

#[tokio::test]
async fn test_bus_event_flow_between_sides() {
    let (front, core) = MessageBus::over_pipe();
    front.start();
    core.start();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        front.on_event("turn.delta", move |data| {
            seen.lock()
                .unwrap()
                .push(data["text"].as_str().unwrap_or("").to_string());
        });
    }

    core.emit_event("turn.delta", json!({"text": "one"})).await.unwrap();
    core.emit_event("turn.delta", json!({"text": "two"})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(seen.lock().unwrap().as_slice(), ["one", "two"]);
}

// ============================================================================
// Bus-backed Approval Integration
// ============================================================================

/// An approval handler that forwards decisions over the bus, the way an
/// interactive front end gates tool calls.
struct BusApproval {
    bus: MessageBus,
}

#[async_trait]
impl ApprovalHandler for BusApproval {
    async fn on_tool_approval(
        &self,
        tool_use: &ToolCallRequest,
        category: ToolCategory,
    ) -> ApprovalDecision {
        let response: Value = match self
            .bus
            .request(
                "tool.approval",
                json!({
                    "tool_use": tool_use,
                    "category": category.to_string(),
                }),
                Some(Duration::from_secs(5)),
            )
            .await
        {
            Ok(v) => v,
            // An unreachable approver means no approval.
            Err(_) => return ApprovalDecision::deny(),
        };

        if response["approved"].as_bool().unwrap_or(false) {
            ApprovalDecision::approve()
        } else {
            match response["deny_reason"].as_str() {
                Some(reason) => ApprovalDecision::deny_with_reason(reason),
                None => ApprovalDecision::deny(),
            }
        }
    }
}

#[tokio::test]
async fn test_bus_backed_approval_roundtrip() {
    let (core_side, front_side) = MessageBus::over_pipe();
    core_side.start();
    front_side.start();

    // The front end approves shell tools and denies everything else with
    // a reason.
    front_side.register_handler("tool.approval", |params: Value| {
        Box::pin(async move {
            let approved = params["category"] == "shell";
            Ok(json!({
                "approved": approved,
                "deny_reason": if approved { Value::Null } else { json!("category blocked") },
            }))
        })
    });

    let approval = BusApproval { bus: core_side };
    let call = ToolCallRequest::new("call_1", "echo", json!({"message": "hi"}));

    let decision = approval.on_tool_approval(&call, ToolCategory::Shell).await;
    assert!(decision.approved);

    let decision = approval
        .on_tool_approval(&call, ToolCategory::FilesystemWrite)
        .await;
    assert!(!decision.approved);
    assert_eq!(decision.deny_reason.as_deref(), Some("category blocked"));
}

// ============================================================================
// History + Persistence Integration
// ============================================================================

/// Append-only sink counting one record per message.
struct CountingSink {
    records: AtomicU64,
}

impl HistorySink for CountingSink {
    fn on_message(&self, _session_id: &str, _message: &Message) -> Result<()> {
        self.records.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_sink_observes_full_conversation() {
    let sink = Arc::new(CountingSink {
        records: AtomicU64::new(0),
    });
    let mut log = HistoryLog::with_session_id("sess-42")
        .with_sink(Arc::clone(&sink) as Arc<dyn HistorySink>);

    log.add_message(Message::system("sys")).unwrap();
    log.add_message(Message::user("hi")).unwrap();
    log.add_message(Message::assistant(vec![
        ContentPart::text("checking"),
        ContentPart::tool_use("call_1", "echo", json!({"message": "x"})),
    ]))
    .unwrap();
    log.add_message(Message::tool_results(vec![ContentPart::tool_result(
        "call_1",
        "echo",
        json!({"message": "x"}),
        "x",
    )]))
    .unwrap();

    assert_eq!(sink.records.load(Ordering::SeqCst), 4);
}

#[test]
fn test_forked_history_converts_only_active_branch() {
    let mut log = HistoryLog::new();
    let root = log.add_message(Message::system("sys")).unwrap();
    log.add_message(Message::user("first try")).unwrap();
    log.add_message(Message::assistant(vec![ContentPart::text("answer A")]))
        .unwrap();

    // Fork back to the root with a different question.
    let mut retry = Message::user("second try");
    retry.parent = Some(root);
    log.add_message(retry).unwrap();

    let path = log.active_messages().unwrap();
    let prompt = to_provider_messages(&path).unwrap();
    assert_eq!(prompt.len(), 2);
    assert_eq!(prompt[0].role, Role::System);
    match &prompt[1].content[0] {
        PromptPart::Text { text } => assert_eq!(text, "second try"),
        other => panic!("unexpected part {:?}", other),
    }
    // The abandoned branch is still in the log for replay.
    assert_eq!(log.len(), 4);
}

#[test]
fn test_conversion_rejects_unknown_parts_end_to_end() {
    let mut log = HistoryLog::new();
    log.add_message(Message::user("ok")).unwrap();
    log.add_message(Message::assistant(vec![ContentPart::Opaque {
        kind: "from_the_future".into(),
        data: json!({"v": 2}),
    }]))
    .unwrap();

    let path = log.active_messages().unwrap();
    let err = to_provider_messages(&path).unwrap_err();
    assert!(err.to_string().contains("from_the_future"));
}
