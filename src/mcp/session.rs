//! Session lifecycle
//!
//! A session is created per inbound connection, bound to its own transport, and
//! discarded wholesale when it closes. Nothing in it outlives the connection.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::registry::ToolRegistry;
use crate::mcp::transport::SessionTransport;

/// Ephemeral identifier used for logging only; never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Connected,
    Dispatching,
    Completed,
    Failed,
    Closed,
}

/// Coarse view of [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Created, Connected) => true,
            (Connected | Dispatching, Dispatching | Completed | Failed) => true,
            _ => false,
        }
    }

    pub fn phase(self) -> SessionPhase {
        match self {
            Self::Created | Self::Connected | Self::Dispatching => SessionPhase::Open,
            Self::Completed | Self::Failed => SessionPhase::Closing,
            Self::Closed => SessionPhase::Closed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid session transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    state: SessionState,
    history: Vec<SessionState>,
    transport: Option<Arc<SessionTransport>>,
    registry: Option<Arc<ToolRegistry>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            state: SessionState::Created,
            history: vec![SessionState::Created],
            transport: None,
            registry: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Every state this session has been in, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn transport(&self) -> Option<&Arc<SessionTransport>> {
        self.transport.as_ref()
    }

    pub fn registry(&self) -> Option<&Arc<ToolRegistry>> {
        self.registry.as_ref()
    }

    /// Binds the transport and attaches the registry by reference.
    pub fn connect(
        &mut self,
        transport: Arc<SessionTransport>,
        registry: Arc<ToolRegistry>,
    ) -> Result<(), InvalidTransition> {
        self.advance(SessionState::Connected)?;
        self.transport = Some(transport);
        self.registry = Some(registry);
        Ok(())
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Releases the transport and registry reference and moves to `Closed`.
    ///
    /// Returns `true` only the first time; later calls are no-ops.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }

        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.registry = None;
        self.state = SessionState::Closed;
        self.history.push(SessionState::Closed);
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
