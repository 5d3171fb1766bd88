//! The parser seam.
//!
//! The session owns the inbound byte buffer and feeds it to a
//! [`RequestParser`], which consumes as much as it can and appends
//! [`ParserEvent`]s. The parser decides the protocol and whether request
//! ids are client-assigned (out-of-order replies allowed) or
//! session-assigned (replies leave in arrival order).

mod ascii;

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

pub use ascii::AsciiParser;

use crate::error::ParseError;
use crate::protocol::{McOp, McResult, Protocol};
use crate::request::McRequest;

/// A unit of parser output.
#[derive(Debug)]
pub enum ParserEvent {
    /// A fully parsed request.
    Request {
        request: McRequest,
        op: McOp,
        /// Parser-assigned id; honoured only when the parser is
        /// out-of-order, ignored (and reassigned) otherwise.
        reqid: u64,
        /// Pre-routing verdict; [`McResult::BadKey`] short-circuits the
        /// handler.
        result: McResult,
        /// Suppress wire output for this request's reply.
        noreply: bool,
    },
    /// A typed request (out-of-order parsers only).
    TypedRequest {
        type_id: u32,
        body: Bytes,
        reqid: u64,
    },
    /// End marker closing the current ASCII multi-key GET.
    MultiOpEnd,
}

/// Incremental request parser driven by the session's read loop.
pub trait RequestParser: Send {
    /// The wire protocol this parser speaks.
    fn protocol(&self) -> Protocol;

    /// `true` when requests carry their own ids and replies need not
    /// preserve arrival order.
    fn out_of_order(&self) -> bool;

    /// Consume as much of `buf` as possible, appending parsed events.
    ///
    /// Partial input is not an error: the parser leaves the incomplete
    /// tail in `buf` and returns. A [`ParseError`] poisons the stream; the
    /// session answers it and closes.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the input cannot belong to the
    /// protocol.
    fn consume(
        &mut self,
        buf: &mut BytesMut,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError>;
}
