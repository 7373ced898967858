//! Protocol dispatcher
//!
//! Drives one session from connection accept to close:
//! `Created → Connected → Dispatching → Completed | Failed → Closed`.
//!
//! Connection close can arrive in any state. The dispatcher races processing against the
//! transport's close signal; when close wins, the session goes straight to `Closed`. Tool
//! handlers run on their own task, so a cancelled session detaches the handler instead of
//! aborting it, and the handler's eventual result is dropped without being written.

use std::{sync::Arc, time::Duration, time::Instant};

use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::registry::{PreparedCall, ToolRegistry};
use crate::logging::{EventLevel, EventSink};
use crate::mcp::{
    error::{McpError, GENERIC_HANDLER_FAILURE},
    message::{MessageKind, ProtocolMessage},
    rpc::Reply,
    server::{redact_audit_params, ServerIdentity, SessionServer},
    session::{Session, SessionId, SessionState},
    transport::SessionTransport,
};

const CONTEXT: &str = "Dispatcher";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Completed,
    Failed,
    /// The connection closed before the session finished.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub disposition: Disposition,
    pub states: Vec<SessionState>,
}

/// Result of routing one message.
enum Routed {
    Reply(Result<Value, McpError>),
    Acknowledge,
    /// Unrecoverable; the error is sent best-effort and the session fails.
    Fatal(McpError),
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    identity: Arc<ServerIdentity>,
    events: Arc<dyn EventSink>,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, events: Arc<dyn EventSink>) -> Self {
        Self {
            registry,
            identity: Arc::new(ServerIdentity::default()),
            events,
            call_timeout: None,
        }
    }

    pub fn with_identity(mut self, identity: ServerIdentity) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub async fn run_session(&self, transport: Arc<SessionTransport>) -> SessionOutcome {
        let started_at = Instant::now();
        let mut session = Session::new();
        let session_id = session.id();

        self.events.log(
            EventLevel::Info,
            CONTEXT,
            "session opened",
            Some(&json!({
                "session_id": session_id.to_string(),
                "created_at": session.created_at().to_rfc3339(),
            })),
        );

        if let Err(err) = session.connect(Arc::clone(&transport), Arc::clone(&self.registry)) {
            self.log_invalid_transition(&session, &err.to_string());
        }
        let server = SessionServer::new(Arc::clone(&self.identity), Arc::clone(&self.registry));

        let disposition = tokio::select! {
            biased;
            disposition = self.dispatch(&mut session, &server, &transport) => disposition,
            () = transport.closed() => Disposition::Cancelled,
        };

        if disposition == Disposition::Cancelled {
            self.events.log(
                EventLevel::Warn,
                CONTEXT,
                "connection closed before the session completed",
                Some(&json!({
                    "session_id": session_id.to_string(),
                    "state": session.state().as_str(),
                })),
            );
        }

        session.close();
        self.events.log(
            EventLevel::Info,
            CONTEXT,
            "session closed",
            Some(&json!({
                "session_id": session_id.to_string(),
                "disposition": disposition,
                "duration_ms": started_at.elapsed().as_millis() as u64,
            })),
        );

        SessionOutcome {
            session_id,
            disposition,
            states: session.history().to_vec(),
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        server: &SessionServer,
        transport: &SessionTransport,
    ) -> Disposition {
        loop {
            let message = match transport.receive() {
                Ok(Some(message)) => message,
                Ok(None) => {
                    self.advance(session, SessionState::Completed);
                    return Disposition::Completed;
                }
                Err(McpError::TransportClosed) => return Disposition::Cancelled,
                Err(error) => {
                    self.advance(session, SessionState::Failed);
                    self.events.log(
                        EventLevel::Warn,
                        CONTEXT,
                        "malformed message",
                        Some(&json!({
                            "session_id": session.id().to_string(),
                            "reason": error.to_string(),
                        })),
                    );
                    // Best effort; the client may already be gone.
                    let _ = transport.send(Reply::error(None, error));
                    return Disposition::Failed;
                }
            };

            self.advance(session, SessionState::Dispatching);
            let ProtocolMessage { id, kind } = message;
            let method = kind.method().to_string();
            let audit_params = redact_audit_params(Some(&kind.audit_params()));

            let routed = self.route(server, kind).await;
            let outcome = match &routed {
                Routed::Reply(Ok(_)) | Routed::Acknowledge => "success",
                Routed::Reply(Err(_)) | Routed::Fatal(_) => "failure",
            };
            self.events.log(
                EventLevel::Info,
                CONTEXT,
                "mcp action audited",
                Some(&json!({
                    "session_id": session.id().to_string(),
                    "method": method,
                    "params": audit_params,
                    "outcome": outcome,
                })),
            );

            let delivered = match routed {
                Routed::Reply(Ok(result)) => transport.send(Reply::result(id, result)),
                Routed::Reply(Err(error)) => transport.send(Reply::error(id, error)),
                Routed::Acknowledge => transport.acknowledge(),
                Routed::Fatal(error) => {
                    self.advance(session, SessionState::Failed);
                    let _ = transport.send(Reply::error(id, error));
                    return Disposition::Failed;
                }
            };

            if delivered.is_err() {
                return Disposition::Cancelled;
            }

            if transport.is_single_shot() {
                self.advance(session, SessionState::Completed);
                return Disposition::Completed;
            }
        }
    }

    async fn route(&self, server: &SessionServer, kind: MessageKind) -> Routed {
        match kind {
            MessageKind::Initialize { params } => Routed::Reply(server.initialize(&params)),
            MessageKind::Ping => Routed::Reply(Ok(json!({}))),
            MessageKind::ListTools => Routed::Reply(Ok(server.list_tools())),
            MessageKind::CallTool { name, arguments } => {
                match server.prepare_call(&name, arguments) {
                    Ok(call) => self.execute(call).await,
                    Err(error) => Routed::Reply(Err(error)),
                }
            }
            MessageKind::Notification { .. } => Routed::Acknowledge,
            MessageKind::NotificationWithId { method } => {
                Routed::Reply(Err(McpError::InvalidRequest {
                    reason: format!("notification {method} must not carry an id"),
                }))
            }
            MessageKind::Unsupported { method } => {
                Routed::Reply(Err(McpError::MethodNotFound { method }))
            }
            MessageKind::Response { .. } | MessageKind::ErrorResponse { .. } => {
                Routed::Reply(Err(McpError::InvalidRequest {
                    reason: "this server has no outstanding requests to answer".to_string(),
                }))
            }
        }
    }

    async fn execute(&self, call: PreparedCall) -> Routed {
        let tool = call.tool_name().to_string();
        let task = tokio::spawn(call.run());

        let joined = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.events.log(
                        EventLevel::Error,
                        CONTEXT,
                        "tool call timed out",
                        Some(&json!({ "tool": tool, "timeout_ms": limit.as_millis() as u64 })),
                    );
                    return Routed::Fatal(McpError::handler(Some(&tool), "tool call timed out"));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(result)) => Routed::Reply(serde_json::to_value(result).map_err(|err| {
                McpError::handler(Some(&tool), format!("tool result encoding: {err}"))
            })),
            Ok(Err(error)) => Routed::Reply(Err(error.into())),
            Err(join_error) => {
                self.events.log(
                    EventLevel::Error,
                    CONTEXT,
                    "tool handler terminated unexpectedly",
                    Some(&json!({ "tool": tool, "cause": join_error.to_string() })),
                );
                Routed::Fatal(McpError::handler(Some(&tool), GENERIC_HANDLER_FAILURE))
            }
        }
    }

    fn advance(&self, session: &mut Session, next: SessionState) {
        if let Err(err) = session.advance(next) {
            self.log_invalid_transition(session, &err.to_string());
        }
    }

    fn log_invalid_transition(&self, session: &Session, detail: &str) {
        self.events.log(
            EventLevel::Error,
            CONTEXT,
            "invalid session transition",
            Some(&json!({
                "session_id": session.id().to_string(),
                "detail": detail,
            })),
        );
    }
}
