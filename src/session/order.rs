//! Reply ordering: head-of-line draining for in-order protocols and
//! multi-op merging.

use tokio::io::{AsyncRead, AsyncWrite};

use super::McServerSession;
use crate::context::ReplyParts;
use crate::hooks::RequestHandler;
use crate::multi_op::MultiOpParent;
use crate::parser::RequestParser;
use crate::protocol::McOp;
use crate::reply::McReply;
use crate::write_queue::WriteBuffer;

impl<T, P, H> McServerSession<T, P, H>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    P: RequestParser,
    H: RequestHandler,
{
    /// A reply arrived through a request context.
    pub(super) fn on_reply(&mut self, parts: ReplyParts, reply: McReply) {
        if let Some(parent_id) = parts.parent {
            self.merge_sub_reply(parent_id, &parts, &reply);
            return;
        }

        let mut segments = Vec::new();
        if !parts.noreply {
            self.encoder
                .encode(parts.op, parts.key.as_deref(), &reply, &mut segments);
        }
        self.reply_buffer(WriteBuffer::new(parts.reqid, parts.noreply, segments));
    }

    /// Order `buffer` onto the wire.
    ///
    /// Out-of-order protocols write straight through. In-order protocols
    /// write only the head-of-line reply, then drain whatever contiguous
    /// run the new head unblocks; everything else parks in
    /// `blocked_replies`.
    pub(super) fn reply_buffer(&mut self, buffer: WriteBuffer) {
        if self.parser.out_of_order() {
            self.queue_write(buffer);
            return;
        }

        if buffer.reqid() == self.head_reqid {
            self.queue_write(buffer);
            self.head_reqid += 1;
            while let Some(next) = self.blocked_replies.remove(&self.head_reqid) {
                self.queue_write(next);
                self.head_reqid += 1;
            }
        } else {
            debug_assert!(
                buffer.reqid() > self.head_reqid && buffer.reqid() < self.tail_reqid,
                "blocked reply id out of window"
            );
            self.blocked_replies.insert(buffer.reqid(), buffer);
        }
    }

    /// Fold a sub-reply into its parent and release the sub's wire slot.
    fn merge_sub_reply(&mut self, parent_id: u64, parts: &ReplyParts, reply: &McReply) {
        let error = reply.result().is_error().then(|| reply.clone());
        let mut segments = Vec::new();
        if error.is_none() {
            self.encoder
                .encode(parts.op, parts.key.as_deref(), reply, &mut segments);
        }
        if let Some(multi_op) = self.multi_ops.get_mut(&parent_id) {
            multi_op.sub_reply(parts.reqid, segments, error);
        }

        // The placeholder keeps head-of-line draining moving; it never
        // touches the wire.
        self.reply_buffer(WriteBuffer::sub_placeholder(parts.reqid));
        self.maybe_complete_multi_op(parent_id);
    }

    /// Submit the aggregated reply once the parent has seen its end marker
    /// and every sub-reply.
    pub(super) fn maybe_complete_multi_op(&mut self, parent_id: u64) {
        let complete = self
            .multi_ops
            .get(&parent_id)
            .is_some_and(MultiOpParent::is_complete);
        if !complete {
            return;
        }
        let Some(multi_op) = self.multi_ops.remove(&parent_id) else {
            return;
        };

        let error_segments = multi_op.error().map(|error| {
            let mut segments = Vec::new();
            self.encoder.encode(McOp::Get, None, error, &mut segments);
            segments
        });
        let terminator = self.encoder.multi_op_terminator();
        self.reply_buffer(multi_op.into_reply(error_segments, terminator));
    }
}
