//! Internal event types for the session's select loop.

use crate::context::ReplyParts;
use crate::reply::McReply;

/// Events injected into a session through its event channel.
///
/// Replies submitted by handlers (from any task) and owner-side close
/// requests arrive this way; everything else the loop observes is
/// transport readiness.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// A reply for an outstanding request.
    Reply { parts: ReplyParts, reply: McReply },
    /// An owner asked for a graceful close.
    Close,
}
