//! Lifecycle hooks, the request handler seam, and the debug tap.
//!
//! [`SessionHooks`] is a container of optional callbacks invoked by the
//! session at lifecycle edges. All callbacks run on the session's own
//! task.

use bytes::Bytes;

use crate::context::RequestContext;
use crate::protocol::McOp;
use crate::registry::SessionId;
use crate::reply::McReply;
use crate::request::McRequest;

/// Type alias for hooks observing a session by id.
type SessionHook = Box<dyn FnMut(SessionId) + Send + 'static>;

/// Type alias for the peer-requested shutdown hook.
type ShutdownHook = Box<dyn FnMut() + Send + 'static>;

/// Callbacks invoked by the session at lifecycle edges.
#[derive(Default)]
pub struct SessionHooks {
    /// Invoked whenever the send queue fully drains while streaming. May
    /// fire many times.
    pub on_write_quiescence: Option<SessionHook>,
    /// Invoked exactly once, on the first transition into `Closing`.
    pub on_close_start: Option<SessionHook>,
    /// Invoked exactly once, on the transition into `Closed`, just before
    /// the session destroys itself.
    pub on_close_finish: Option<SessionHook>,
    /// Invoked when the peer requests a process-level shutdown.
    pub on_shutdown: Option<ShutdownHook>,
}

impl SessionHooks {
    /// Run the `on_write_quiescence` hook if registered.
    pub(crate) fn write_quiescence(&mut self, id: SessionId) {
        if let Some(hook) = &mut self.on_write_quiescence {
            hook(id);
        }
    }

    /// Run the `on_close_start` hook if registered.
    pub(crate) fn close_start(&mut self, id: SessionId) {
        if let Some(hook) = &mut self.on_close_start {
            hook(id);
        }
    }

    /// Run the `on_close_finish` hook if registered.
    pub(crate) fn close_finish(&mut self, id: SessionId) {
        if let Some(hook) = &mut self.on_close_finish {
            hook(id);
        }
    }

    /// Run the `on_shutdown` hook if registered.
    pub(crate) fn shutdown(&mut self) {
        if let Some(hook) = &mut self.on_shutdown {
            hook();
        }
    }
}

/// Application-supplied request dispatch.
///
/// Invoked on the session task. Handlers are free to move the context into
/// a spawned task and reply from there; the context marshals the reply
/// back to the session.
pub trait RequestHandler: Send + 'static {
    /// A routable request is ready.
    fn on_request(&mut self, ctx: RequestContext, request: McRequest, op: McOp);

    /// A typed request is ready (out-of-order protocols only).
    ///
    /// The default implementation rejects the request.
    fn on_typed_request(&mut self, type_id: u32, body: Bytes, ctx: RequestContext) {
        let _ = (type_id, body);
        ctx.reply(McReply::server_error("typed requests not supported"));
    }
}

/// Byte-level mirror of a session's traffic, for debugging.
pub trait DebugTap: Send {
    /// Bytes arrived from the peer.
    fn received(&mut self, bytes: &[u8]);

    /// Bytes handed to the transport.
    fn sent(&mut self, bytes: &[u8]);
}
