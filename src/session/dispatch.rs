//! Event dispatching: channel events, parser events, request emission,
//! and the operations the session answers itself.

use bytes::Bytes;
use log::warn;
use tokio::io::{AsyncRead, AsyncWrite};

use super::McServerSession;
use super::event::SessionEvent;
use super::state::SessionState;
use crate::context::RequestContext;
use crate::error::ParseError;
use crate::hooks::RequestHandler;
use crate::parser::{ParserEvent, RequestParser};
use crate::protocol::{McOp, McResult, Protocol, is_multi_get};
use crate::reply::McReply;
use crate::request::McRequest;

impl<T, P, H> McServerSession<T, P, H>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    P: RequestParser,
    H: RequestHandler,
{
    /// Dispatch one channel event.
    pub(super) fn dispatch_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Reply { parts, reply } => self.on_reply(parts, reply),
            SessionEvent::Close => self.close(),
        }
    }

    /// Dispatch up to `requests_per_read` parsed events, leaving the rest
    /// for later turns so one read burst cannot monopolise the loop.
    pub(super) fn dispatch_parsed_batch(&mut self) {
        for _ in 0..self.config.requests_per_read {
            let Some(event) = self.parsed_backlog.pop_front() else {
                break;
            };
            self.dispatch_parser_event(event);
        }
    }

    fn dispatch_parser_event(&mut self, event: ParserEvent) {
        match event {
            ParserEvent::Request {
                request,
                op,
                reqid,
                result,
                noreply,
            } => self.request_ready(request, op, reqid, result, noreply),
            ParserEvent::TypedRequest {
                type_id,
                body,
                reqid,
            } => self.typed_request_ready(type_id, body, reqid),
            ParserEvent::MultiOpEnd => self.multi_op_end(),
        }
    }

    /// A fully parsed request is ready for emission.
    fn request_ready(
        &mut self,
        request: McRequest,
        op: McOp,
        parser_reqid: u64,
        result: McResult,
        noreply: bool,
    ) {
        if self.state != SessionState::Streaming {
            return;
        }

        let mut reqid = parser_reqid;
        if !self.parser.out_of_order() {
            if is_multi_get(self.parser.protocol(), op) && self.current_multiop.is_none() {
                // The parent's wire slot is reserved ahead of its
                // sub-requests.
                let parent_id = self.alloc_reqid();
                self.multi_ops
                    .insert(parent_id, crate::multi_op::MultiOpParent::new(parent_id));
                self.current_multiop = Some(parent_id);
                self.transaction_started(false);
            }
            reqid = self.alloc_reqid();
        }

        let parent = self.current_multiop;
        if let Some(parent_id) = parent {
            if let Some(multi_op) = self.multi_ops.get_mut(&parent_id) {
                multi_op.sub_started();
            }
        }
        self.transaction_started(parent.is_some());

        // Handlers may need the key after the request has been moved on.
        let key = (self.parser.protocol() == Protocol::Ascii).then(|| request.key().clone());
        let ctx = RequestContext::new(self.sink.clone(), reqid, op, noreply, key, parent);
        crate::metrics::inc_requests();

        if result == McResult::BadKey {
            ctx.reply(McReply::new(McResult::BadKey));
        } else if op == McOp::Version && self.config.default_version_handler {
            ctx.reply(McReply::version(&self.config.version_string));
        } else if op == McOp::Quit {
            // The reply only completes the transaction; `noreply` keeps it
            // off the wire.
            ctx.reply(McReply::new(McResult::Ok));
            self.close();
        } else if op == McOp::Shutdown {
            ctx.reply(McReply::new(McResult::Ok));
            self.hooks.shutdown();
        } else {
            self.handler.on_request(ctx, request, op);
        }
    }

    /// A typed request is ready (out-of-order parsers only).
    fn typed_request_ready(&mut self, type_id: u32, body: Bytes, reqid: u64) {
        if self.state != SessionState::Streaming {
            return;
        }
        debug_assert!(self.parser.out_of_order());

        self.transaction_started(false);
        let ctx = RequestContext::new(self.sink.clone(), reqid, McOp::Unknown, false, None, None);
        crate::metrics::inc_requests();
        self.handler.on_typed_request(type_id, body, ctx);
    }

    /// The parser saw the end marker of the current multi-key GET.
    fn multi_op_end(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }
        self.process_multi_op_end();
    }

    pub(super) fn process_multi_op_end(&mut self) {
        if let Some(parent_id) = self.current_multiop.take() {
            if let Some(multi_op) = self.multi_ops.get_mut(&parent_id) {
                multi_op.record_end();
            }
            self.maybe_complete_multi_op(parent_id);
        }
    }

    /// The parser rejected the stream: answer once, then close.
    pub(super) fn apply_parse_error(&mut self, err: ParseError) {
        warn!(
            "parse error: id={:?}, result={:?}, reason={}",
            self.id, err.result, err.reason
        );
        crate::metrics::inc_parse_errors();
        if self.state != SessionState::Streaming {
            return;
        }

        let reqid = self.alloc_reqid();
        self.transaction_started(false);
        let ctx = RequestContext::new(self.sink.clone(), reqid, McOp::Unknown, false, None, None);
        ctx.reply(McReply::from_parse_error(&err));
        self.close();
    }
}
