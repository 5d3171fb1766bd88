//! Shared fixtures for session integration tests.
#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::time::Duration;

use mcshuttle::session::test_support::{HandlerEvent, HookCounters};
use mcshuttle::{
    McOp, McRequest, McServerSession, RequestContext, RequestParser, SessionConfig, SessionHandle,
    TransportInfo,
};
use tokio::io::{AsyncReadExt, DuplexStream, duplex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Generous upper bound for every awaited step.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);
/// Window in which an event is asserted *not* to happen.
pub const QUIET_TIMEOUT: Duration = Duration::from_millis(100);

/// A session running over an in-memory duplex, with the client half, the
/// handler's event stream, and the lifecycle counters exposed.
pub struct SessionFixture {
    pub client: DuplexStream,
    pub events: mpsc::UnboundedReceiver<HandlerEvent>,
    pub counters: HookCounters,
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
}

/// Spawn a session over `parser` with the given config.
pub fn spawn_session<P>(parser: P, config: SessionConfig) -> SessionFixture
where
    P: RequestParser + 'static,
{
    let (client, server) = duplex(16 * 1024);
    let (handler, events) = mcshuttle::session::test_support::forwarding_handler();
    let counters = HookCounters::new();
    let session = McServerSession::new(
        server,
        TransportInfo::default(),
        parser,
        handler,
        counters.hooks(),
        config,
    )
    .expect("session construction failed");
    let handle = session.handle();
    let task = tokio::spawn(session.run());
    SessionFixture {
        client,
        events,
        counters,
        handle,
        task,
    }
}

/// Await the next routable request the handler saw.
pub async fn next_request(
    events: &mut mpsc::UnboundedReceiver<HandlerEvent>,
) -> (RequestContext, McRequest, McOp) {
    match timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a request")
        .expect("handler stream ended")
    {
        HandlerEvent::Request { ctx, request, op } => (ctx, request, op),
        HandlerEvent::Typed { .. } => panic!("expected a routable request, got a typed one"),
    }
}

/// Await the next typed request the handler saw.
pub async fn next_typed(
    events: &mut mpsc::UnboundedReceiver<HandlerEvent>,
) -> (RequestContext, u32, bytes::Bytes) {
    match timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a typed request")
        .expect("handler stream ended")
    {
        HandlerEvent::Typed { ctx, type_id, body } => (ctx, type_id, body),
        HandlerEvent::Request { .. } => panic!("expected a typed request, got a routable one"),
    }
}

/// Assert the handler sees nothing within the quiet window.
pub async fn expect_no_request(events: &mut mpsc::UnboundedReceiver<HandlerEvent>) {
    assert!(
        timeout(QUIET_TIMEOUT, events.recv()).await.is_err(),
        "handler received a request it should not have"
    );
}

/// Read and assert exactly `expected` from the wire.
pub async fn expect_wire(client: &mut DuplexStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    timeout(STEP_TIMEOUT, client.read_exact(&mut buf))
        .await
        .expect("timed out reading the wire")
        .expect("wire closed early");
    assert_eq!(
        buf,
        expected,
        "wire mismatch: got {:?}, want {:?}",
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

/// Assert the wire stays silent within the quiet window.
pub async fn expect_wire_silent(client: &mut DuplexStream) {
    let mut buf = [0u8; 1];
    assert!(
        timeout(QUIET_TIMEOUT, client.read(&mut buf)).await.is_err(),
        "unexpected bytes on the wire"
    );
}

/// Read until EOF, asserting the remainder matches `expected`.
pub async fn expect_wire_then_eof(client: &mut DuplexStream, expected: &[u8]) {
    let mut buf = Vec::new();
    timeout(STEP_TIMEOUT, client.read_to_end(&mut buf))
        .await
        .expect("timed out waiting for EOF")
        .expect("read failed");
    assert_eq!(
        buf,
        expected,
        "wire mismatch: got {:?}, want {:?}",
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

/// Await session termination.
pub async fn expect_finished(task: JoinHandle<()>) {
    timeout(STEP_TIMEOUT, task)
        .await
        .expect("session did not finish")
        .expect("session task panicked");
}
