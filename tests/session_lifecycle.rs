//! Lifecycle: session-answered ops, close semantics, and hook ordering.

mod common;

use bytes::Bytes;
use common::{
    expect_finished, expect_no_request, expect_wire, expect_wire_then_eof, next_request,
    spawn_session,
};
use mcshuttle::{AsciiParser, McReply, McResult, SessionConfig};
use rstest::rstest;
use tokio::io::AsyncWriteExt;

#[rstest]
#[tokio::test]
async fn version_is_answered_by_the_session() {
    let config = SessionConfig {
        version_string: "mcshuttle test".to_owned(),
        ..SessionConfig::default()
    };
    let mut fixture = spawn_session(AsciiParser::new(), config);

    fixture.client.write_all(b"version\r\n").await.unwrap();
    expect_wire(&mut fixture.client, b"VERSION mcshuttle test\r\n").await;
    expect_no_request(&mut fixture.events).await;
}

#[rstest]
#[tokio::test]
async fn version_reaches_the_handler_when_default_handling_is_off() {
    let config = SessionConfig {
        default_version_handler: false,
        ..SessionConfig::default()
    };
    let mut fixture = spawn_session(AsciiParser::new(), config);

    fixture.client.write_all(b"version\r\n").await.unwrap();
    let (ctx, _, op) = next_request(&mut fixture.events).await;
    assert_eq!(op, mcshuttle::McOp::Version);
    ctx.reply(McReply::version("handler speaking"));
    expect_wire(&mut fixture.client, b"VERSION handler speaking\r\n").await;
}

#[rstest]
#[tokio::test]
async fn quit_drains_in_flight_replies_and_closes() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    // One request in flight, then quit: the pending reply must still make
    // it out, and quit's own OK must not.
    fixture.client.write_all(b"get k\r\nquit\r\n").await.unwrap();
    let (ctx, ..) = next_request(&mut fixture.events).await;
    ctx.reply(McReply::new(McResult::Ok).with_value(Bytes::from_static(b"vv")));

    expect_wire_then_eof(&mut fixture.client, b"VALUE k 0 2\r\nvv\r\nEND\r\n").await;
    expect_finished(fixture.task).await;
    assert_eq!(fixture.counters.close_starts(), 1);
    assert_eq!(fixture.counters.close_finishes(), 1);
}

#[rstest]
#[tokio::test]
async fn shutdown_replies_ok_and_fires_the_hook() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    fixture.client.write_all(b"shutdown\r\n").await.unwrap();
    expect_wire(&mut fixture.client, b"OK\r\n").await;
    assert_eq!(fixture.counters.shutdowns(), 1);

    // The session keeps streaming after a shutdown request.
    fixture.client.write_all(b"version\r\n").await.unwrap();
    expect_wire(&mut fixture.client, b"VERSION mcshuttle 0.1.0\r\n").await;
}

#[rstest]
#[tokio::test]
async fn bad_key_is_answered_without_the_handler() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    let mut line = b"delete ".to_vec();
    line.extend_from_slice(&[b'x'; 251]);
    line.extend_from_slice(b"\r\n");
    fixture.client.write_all(&line).await.unwrap();

    expect_wire(&mut fixture.client, b"CLIENT_ERROR bad key\r\n").await;
    expect_no_request(&mut fixture.events).await;
}

#[rstest]
#[tokio::test]
async fn parse_error_answers_once_then_closes() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    fixture.client.write_all(b"frobnicate\r\n").await.unwrap();
    expect_wire_then_eof(
        &mut fixture.client,
        b"CLIENT_ERROR unknown command 'frobnicate'\r\n",
    )
    .await;
    expect_finished(fixture.task).await;
    assert_eq!(fixture.counters.close_finishes(), 1);
}

#[rstest]
#[tokio::test]
async fn requests_before_a_parse_error_still_get_serviced() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    fixture
        .client
        .write_all(b"get a\r\nfrobnicate\r\n")
        .await
        .unwrap();
    let (ctx, ..) = next_request(&mut fixture.events).await;
    ctx.reply(McReply::new(McResult::Ok).with_value(Bytes::from_static(b"AA")));

    expect_wire_then_eof(
        &mut fixture.client,
        b"VALUE a 0 2\r\nAA\r\nEND\r\nCLIENT_ERROR unknown command 'frobnicate'\r\n",
    )
    .await;
    expect_finished(fixture.task).await;
}

#[rstest]
#[tokio::test]
async fn eof_closes_with_hooks_firing_once() {
    let fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    drop(fixture.client);
    expect_finished(fixture.task).await;
    assert_eq!(fixture.counters.close_starts(), 1);
    assert_eq!(fixture.counters.close_finishes(), 1);
}

#[rstest]
#[tokio::test]
async fn owner_close_is_idempotent() {
    let fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    fixture.handle.close();
    fixture.handle.close();
    fixture.handle.close();

    expect_finished(fixture.task).await;
    assert_eq!(fixture.counters.close_starts(), 1);
    assert_eq!(fixture.counters.close_finishes(), 1);
}

#[rstest]
#[tokio::test]
async fn dropped_context_answers_with_a_server_error() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());

    fixture.client.write_all(b"delete k\r\n").await.unwrap();
    let (ctx, ..) = next_request(&mut fixture.events).await;
    drop(ctx);

    expect_wire(&mut fixture.client, b"SERVER_ERROR unanswered request\r\n").await;
}

#[rstest]
#[tokio::test]
async fn registry_tracks_session_liveness() {
    let registry = mcshuttle::SessionRegistry::new();
    let (client, server) = tokio::io::duplex(4096);
    let session = mcshuttle::McServerSession::new(
        server,
        mcshuttle::TransportInfo::default(),
        AsciiParser::new(),
        {
            struct Nop;
            impl mcshuttle::RequestHandler for Nop {
                fn on_request(
                    &mut self,
                    ctx: mcshuttle::RequestContext,
                    _request: mcshuttle::McRequest,
                    _op: mcshuttle::McOp,
                ) {
                    ctx.reply(McReply::new(McResult::NotFound));
                }
            }
            Nop
        },
        mcshuttle::SessionHooks::default(),
        SessionConfig::default(),
    )
    .unwrap();

    let id = session.id();
    let handle = session.handle();
    registry.insert(id, &handle);
    let task = tokio::spawn(session.run());

    registry
        .get(&id)
        .expect("live session missing from registry")
        .close();
    drop(handle);
    drop(client);
    expect_finished(task).await;
}
