//! Helpers for exercising sessions in tests: a scripted parser, a
//! handler that forwards contexts to the test, a recording debug tap, and
//! counting lifecycle hooks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::context::RequestContext;
use crate::error::ParseError;
use crate::hooks::{DebugTap, RequestHandler, SessionHooks};
use crate::parser::{ParserEvent, RequestParser};
use crate::protocol::{McOp, Protocol};
use crate::request::McRequest;

/// A parser driven by a pre-written script instead of real bytes.
///
/// Each newline received releases the next script entry; everything read
/// is discarded. This lets tests trigger precise parser behaviour with
/// one `write(b"\n")` per step.
pub struct ScriptedParser {
    protocol: Protocol,
    out_of_order: bool,
    script: VecDeque<Result<Vec<ParserEvent>, ParseError>>,
}

impl ScriptedParser {
    /// An in-order ASCII-contract parser with the given script.
    #[must_use]
    pub fn in_order(script: Vec<Result<Vec<ParserEvent>, ParseError>>) -> Self {
        Self {
            protocol: Protocol::Ascii,
            out_of_order: false,
            script: script.into(),
        }
    }

    /// An out-of-order typed-contract parser with the given script.
    #[must_use]
    pub fn unordered(script: Vec<Result<Vec<ParserEvent>, ParseError>>) -> Self {
        Self {
            protocol: Protocol::Typed,
            out_of_order: true,
            script: script.into(),
        }
    }
}

impl RequestParser for ScriptedParser {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn out_of_order(&self) -> bool {
        self.out_of_order
    }

    fn consume(
        &mut self,
        buf: &mut BytesMut,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let steps = buf.iter().filter(|&&b| b == b'\n').count();
        buf.clear();
        for _ in 0..steps {
            match self.script.pop_front() {
                Some(Ok(batch)) => events.extend(batch),
                Some(Err(err)) => return Err(err),
                None => {}
            }
        }
        Ok(())
    }
}

/// Convenience constructor for a scripted in-order GET request event.
#[must_use]
pub fn request_event(op: McOp, key: &'static [u8]) -> ParserEvent {
    ParserEvent::Request {
        request: McRequest::new(Bytes::from_static(key)),
        op,
        reqid: 0,
        result: crate::protocol::McResult::Ok,
        noreply: false,
    }
}

/// What a [`ForwardingHandler`] saw.
pub enum HandlerEvent {
    /// A routable request and its context.
    Request {
        ctx: RequestContext,
        request: McRequest,
        op: McOp,
    },
    /// A typed request and its context.
    Typed {
        ctx: RequestContext,
        type_id: u32,
        body: Bytes,
    },
}

/// Handler that ships every request out to the test, which replies
/// through the contexts in whatever order it wants.
pub struct ForwardingHandler {
    tx: mpsc::UnboundedSender<HandlerEvent>,
}

/// Build a forwarding handler and the receiver the test drains.
#[must_use]
pub fn forwarding_handler() -> (ForwardingHandler, mpsc::UnboundedReceiver<HandlerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ForwardingHandler { tx }, rx)
}

impl RequestHandler for ForwardingHandler {
    fn on_request(&mut self, ctx: RequestContext, request: McRequest, op: McOp) {
        let _ = self.tx.send(HandlerEvent::Request { ctx, request, op });
    }

    fn on_typed_request(&mut self, type_id: u32, body: Bytes, ctx: RequestContext) {
        let _ = self.tx.send(HandlerEvent::Typed { ctx, type_id, body });
    }
}

/// Debug tap accumulating both directions of traffic.
#[derive(Clone, Default)]
pub struct RecordingTap {
    received: Arc<Mutex<Vec<u8>>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl RecordingTap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the tap saw arrive from the peer.
    #[must_use]
    pub fn received(&self) -> Vec<u8> {
        self.received.lock().expect("tap lock poisoned").clone()
    }

    /// Everything the tap saw leave for the peer.
    #[must_use]
    pub fn sent(&self) -> Vec<u8> {
        self.sent.lock().expect("tap lock poisoned").clone()
    }
}

impl DebugTap for RecordingTap {
    fn received(&mut self, bytes: &[u8]) {
        self.received
            .lock()
            .expect("tap lock poisoned")
            .extend_from_slice(bytes);
    }

    fn sent(&mut self, bytes: &[u8]) {
        self.sent
            .lock()
            .expect("tap lock poisoned")
            .extend_from_slice(bytes);
    }
}

/// Shared counters observing lifecycle hook firings.
#[derive(Clone, Default)]
pub struct HookCounters {
    pub write_quiescence: Arc<AtomicUsize>,
    pub close_start: Arc<AtomicUsize>,
    pub close_finish: Arc<AtomicUsize>,
    pub shutdown: Arc<AtomicUsize>,
}

impl HookCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A hooks container wired to these counters.
    #[must_use]
    pub fn hooks(&self) -> SessionHooks {
        let quiescence = self.write_quiescence.clone();
        let start = self.close_start.clone();
        let finish = self.close_finish.clone();
        let shutdown = self.shutdown.clone();
        SessionHooks {
            on_write_quiescence: Some(Box::new(move |_| {
                quiescence.fetch_add(1, Ordering::SeqCst);
            })),
            on_close_start: Some(Box::new(move |_| {
                start.fetch_add(1, Ordering::SeqCst);
            })),
            on_close_finish: Some(Box::new(move |_| {
                finish.fetch_add(1, Ordering::SeqCst);
            })),
            on_shutdown: Some(Box::new(move || {
                shutdown.fetch_add(1, Ordering::SeqCst);
            })),
        }
    }

    #[must_use]
    pub fn close_starts(&self) -> usize {
        self.close_start.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_finishes(&self) -> usize {
        self.close_finish.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.shutdown.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn write_quiescences(&self) -> usize {
        self.write_quiescence.load(Ordering::SeqCst)
    }
}
