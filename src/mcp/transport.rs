//! Per-session transport over one HTTP exchange
//!
//! A `SessionTransport` owns the inbound body of a single request and the channel that
//! carries the reply back to the HTTP handler. It is single-shot: one message in, at most
//! one reply out. Closing is idempotent and may race with `receive`/`send`; the closed
//! flag and the reply channel share one mutex that is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use serde_json::Value;
use tokio::sync::{oneshot, watch};

use crate::mcp::{
    error::McpError,
    message::{decode, ProtocolMessage},
    rpc::Reply,
};

/// The raw inbound side of one HTTP request.
#[derive(Debug, Clone)]
pub struct Exchange {
    content_type: Option<String>,
    body: Bytes,
}

impl Exchange {
    pub fn new(content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::new(Some("application/json".to_string()), body)
    }
}

/// What the HTTP handler writes back.
#[derive(Debug)]
pub enum Outbound {
    Message(Value),
    /// A notification was accepted; no body is written.
    Accepted,
}

#[derive(Debug)]
pub struct ReplyHandle {
    receiver: oneshot::Receiver<Outbound>,
}

impl ReplyHandle {
    /// Resolves with the session's reply, or `None` once the transport closed without one.
    pub async fn recv(self) -> Option<Outbound> {
        self.receiver.await.ok()
    }
}

#[derive(Debug)]
struct TransportInner {
    closed: bool,
    inbound: Option<Exchange>,
    reply: Option<oneshot::Sender<Outbound>>,
}

#[derive(Debug)]
pub struct SessionTransport {
    inner: Mutex<TransportInner>,
    closed: watch::Sender<bool>,
}

impl SessionTransport {
    pub fn open(exchange: Exchange) -> (Arc<Self>, ReplyHandle) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (closed, _) = watch::channel(false);

        let transport = Self {
            inner: Mutex::new(TransportInner {
                closed: false,
                inbound: Some(exchange),
                reply: Some(reply_tx),
            }),
            closed,
        };

        (Arc::new(transport), ReplyHandle { receiver: reply_rx })
    }

    fn lock(&self) -> MutexGuard<'_, TransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// HTTP exchanges carry exactly one message.
    pub fn is_single_shot(&self) -> bool {
        true
    }

    /// Decodes the next inbound message; `Ok(None)` once the stream is exhausted.
    pub fn receive(&self) -> Result<Option<ProtocolMessage>, McpError> {
        let exchange = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(McpError::TransportClosed);
            }
            inner.inbound.take()
        };

        match exchange {
            Some(exchange) => decode(exchange.content_type.as_deref(), &exchange.body).map(Some),
            None => Ok(None),
        }
    }

    pub fn send(&self, reply: Reply) -> Result<(), McpError> {
        self.deliver(Outbound::Message(reply.encode()))
    }

    /// Completes a notification without a body.
    pub fn acknowledge(&self) -> Result<(), McpError> {
        self.deliver(Outbound::Accepted)
    }

    fn deliver(&self, outbound: Outbound) -> Result<(), McpError> {
        let sender = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(McpError::TransportClosed);
            }
            inner.reply.take()
        };

        // Either the single reply was already sent or the HTTP side went away.
        sender
            .ok_or(McpError::TransportClosed)?
            .send(outbound)
            .map_err(|_| McpError::TransportClosed)
    }

    /// Releases the transport. Returns `true` only for the call that performed the release.
    pub fn close(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            inner.inbound = None;
            inner.reply = None;
        }

        self.closed.send_replace(true);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Resolves once the transport has been closed, immediately if it already is.
    pub async fn closed(&self) {
        let mut receiver = self.closed.subscribe();
        let _ = receiver.wait_for(|closed| *closed).await;
    }

    /// Guard that closes the transport when dropped, standing in for connection close.
    pub fn close_on_drop(self: &Arc<Self>) -> CloseOnDrop {
        CloseOnDrop(Arc::clone(self))
    }
}

#[derive(Debug)]
pub struct CloseOnDrop(Arc<SessionTransport>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::mcp::message::MessageKind;

    fn open(body: &'static str) -> (Arc<SessionTransport>, ReplyHandle) {
        SessionTransport::open(Exchange::json(body))
    }

    #[test]
    fn receives_one_message_then_ends() {
        let (transport, _reply) = open(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);

        let message = transport.receive().expect("decodes").expect("one message");
        assert!(matches!(message.kind, MessageKind::Ping));
        assert!(transport.receive().expect("stream ended").is_none());
    }

    #[test]
    fn malformed_bodies_surface_as_parse_errors() {
        let (transport, _reply) = open("{not json");
        let error = transport.receive().expect_err("garbage body");
        assert_eq!(error.code(), "parse_error");
    }

    #[test]
    fn close_is_idempotent() {
        let (transport, _reply) = open("{}");

        assert!(transport.close());
        assert!(!transport.close());
        assert!(transport.is_closed());
    }

    #[test]
    fn operations_after_close_observe_transport_closed() {
        let (transport, _reply) = open(r#"{"method":"ping"}"#);
        transport.close();

        assert!(matches!(
            transport.receive(),
            Err(McpError::TransportClosed)
        ));
        assert!(matches!(
            transport.send(Reply::result(None, json!({}))),
            Err(McpError::TransportClosed)
        ));
        assert!(matches!(
            transport.acknowledge(),
            Err(McpError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn only_one_reply_is_delivered() {
        let (transport, reply) = open(r#"{"method":"ping"}"#);

        transport
            .send(Reply::result(None, json!({ "n": 1 })))
            .expect("first reply");
        assert!(matches!(
            transport.send(Reply::result(None, json!({ "n": 2 }))),
            Err(McpError::TransportClosed)
        ));

        let Some(Outbound::Message(body)) = reply.recv().await else {
            panic!("expected a message");
        };
        assert_eq!(body["result"]["n"], 1);
    }

    #[tokio::test]
    async fn closing_without_reply_releases_the_waiting_handle() {
        let (transport, reply) = open(r#"{"method":"ping"}"#);
        transport.close();
        assert!(reply.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_resolves_for_waiters_and_late_subscribers() {
        let (transport, _reply) = open("{}");

        let waiter = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.closed().await })
        };
        transport.close();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter wakes up")
            .expect("waiter task");
        tokio::time::timeout(Duration::from_secs(1), transport.closed())
            .await
            .expect("already closed");
    }

    #[tokio::test]
    async fn concurrent_close_and_send_never_deliver_twice() {
        for _ in 0..32 {
            let (transport, reply) = open(r#"{"method":"ping"}"#);

            let closer = {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move { transport.close() })
            };
            let sender = {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move { transport.send(Reply::result(None, json!({}))) })
            };

            let closed_here = closer.await.expect("closer task");
            let sent = sender.await.expect("sender task");
            assert!(closed_here);
            assert!(!transport.close());

            match reply.recv().await {
                Some(_) => assert!(sent.is_ok()),
                None => assert!(sent.is_err()),
            }
        }
    }

    #[test]
    fn dropping_the_guard_closes_the_transport() {
        let (transport, _reply) = open("{}");
        {
            let _guard = transport.close_on_drop();
        }
        assert!(transport.is_closed());
    }
}
