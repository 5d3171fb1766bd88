//! Per-request reply token.
//!
//! A [`RequestContext`] is the only legal way to answer a request. It is
//! consumed by the reply, and an abandoned context answers for itself on
//! drop so in-flight accounting never leaks. Contexts may travel to worker
//! tasks; the reply is marshalled back to the owning session over its
//! event channel.

use std::sync::Arc;

use bytes::Bytes;
use log::warn;
use tokio::sync::mpsc;

use crate::protocol::McOp;
use crate::reply::McReply;
use crate::session::event::SessionEvent;

/// Shared sender half of a session's event channel.
///
/// Wrapped in an [`Arc`] so the session registry can hold weak references
/// without pinning the session.
pub(crate) struct SinkInner {
    pub(crate) tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Cloneable handle used to inject events into a session.
#[derive(Clone)]
pub(crate) struct ReplySink(pub(crate) Arc<SinkInner>);

impl ReplySink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self(Arc::new(SinkInner { tx }))
    }

    /// Deliver an event; silently a no-op once the session is gone.
    pub(crate) fn send(&self, event: SessionEvent) {
        let _ = self.0.tx.send(event);
    }
}

/// Identity a reply needs to find its place on the wire.
#[derive(Debug)]
pub(crate) struct ReplyParts {
    pub(crate) reqid: u64,
    pub(crate) op: McOp,
    pub(crate) noreply: bool,
    pub(crate) key: Option<Bytes>,
    /// Reserved slot of the owning multi-op parent, for sub-requests.
    pub(crate) parent: Option<u64>,
}

/// Token through which exactly one reply is submitted for a request.
pub struct RequestContext {
    sink: ReplySink,
    parts: Option<ReplyParts>,
}

impl RequestContext {
    pub(crate) fn new(
        sink: ReplySink,
        reqid: u64,
        op: McOp,
        noreply: bool,
        key: Option<Bytes>,
        parent: Option<u64>,
    ) -> Self {
        Self {
            sink,
            parts: Some(ReplyParts {
                reqid,
                op,
                noreply,
                key,
                parent,
            }),
        }
    }

    /// The operation this context answers for.
    #[must_use]
    pub fn operation(&self) -> McOp {
        self.parts.as_ref().map_or(McOp::Unknown, |p| p.op)
    }

    /// `true` when the reply will be suppressed on the wire.
    #[must_use]
    pub fn noreply(&self) -> bool {
        self.parts.as_ref().is_some_and(|p| p.noreply)
    }

    /// Snapshot of the request key (ASCII protocol only); outlives the
    /// request the handler may already have consumed.
    #[must_use]
    pub fn key(&self) -> Option<&Bytes> {
        self.parts.as_ref().and_then(|p| p.key.as_ref())
    }

    /// Submit the reply, consuming the context.
    ///
    /// Must be invoked from any task; delivery is marshalled onto the
    /// session's own loop. After the session has closed this is a silent
    /// no-op.
    pub fn reply(mut self, reply: McReply) {
        if let Some(parts) = self.parts.take() {
            self.sink.send(SessionEvent::Reply { parts, reply });
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        // A context dropped without replying would strand its wire slot
        // and leak an in-flight transaction; answer for it.
        if let Some(parts) = self.parts.take() {
            warn!(
                "request context dropped without a reply: reqid={}, op={}",
                parts.reqid,
                parts.op.as_str()
            );
            self.sink.send(SessionEvent::Reply {
                parts,
                reply: McReply::server_error("unanswered request"),
            });
        }
    }
}
