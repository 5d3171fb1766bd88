//! Multi-key GET aggregation end to end, over the crate's ASCII parser.

mod common;

use bytes::Bytes;
use common::{expect_finished, expect_wire, next_request, spawn_session};
use mcshuttle::session::test_support::{ScriptedParser, request_event};
use mcshuttle::{AsciiParser, McOp, McReply, McResult, SessionConfig};
use rstest::rstest;
use tokio::io::AsyncWriteExt;

#[rstest]
#[tokio::test]
async fn multiget_aggregates_into_one_reply_at_the_parent_slot() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());
    fixture.client.write_all(b"get a b c\r\n").await.unwrap();

    let (ctx_a, req_a, op) = next_request(&mut fixture.events).await;
    assert_eq!(op, McOp::Get);
    assert_eq!(req_a.key().as_ref(), b"a");
    let (ctx_b, ..) = next_request(&mut fixture.events).await;
    let (ctx_c, ..) = next_request(&mut fixture.events).await;

    // Sub-replies arrive out of order; `c` misses entirely.
    ctx_b.reply(McReply::new(McResult::Ok).with_value(Bytes::from_static(b"BB")));
    ctx_c.reply(McReply::new(McResult::NotFound));
    ctx_a.reply(
        McReply::new(McResult::Ok)
            .with_value(Bytes::from_static(b"AA"))
            .with_flags(5),
    );

    expect_wire(
        &mut fixture.client,
        b"VALUE a 5 2\r\nAA\r\nVALUE b 0 2\r\nBB\r\nEND\r\n",
    )
    .await;
}

#[rstest]
#[tokio::test]
async fn single_get_miss_yields_bare_terminator() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());
    fixture.client.write_all(b"get lonely\r\n").await.unwrap();

    let (ctx, ..) = next_request(&mut fixture.events).await;
    ctx.reply(McReply::new(McResult::NotFound));

    expect_wire(&mut fixture.client, b"END\r\n").await;
}

#[rstest]
#[tokio::test]
async fn sub_error_preempts_the_merged_values() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());
    fixture.client.write_all(b"get a b\r\n").await.unwrap();

    let (ctx_a, ..) = next_request(&mut fixture.events).await;
    let (ctx_b, ..) = next_request(&mut fixture.events).await;

    ctx_a.reply(McReply::new(McResult::Ok).with_value(Bytes::from_static(b"AA")));
    ctx_b.reply(McReply::server_error("route down"));

    expect_wire(&mut fixture.client, b"SERVER_ERROR route down\r\n").await;
}

#[rstest]
#[tokio::test]
async fn multiget_shares_the_ordered_stream_with_other_requests() {
    let mut fixture = spawn_session(AsciiParser::new(), SessionConfig::default());
    fixture
        .client
        .write_all(b"get a\r\ndelete k\r\n")
        .await
        .unwrap();

    let (ctx_a, _, op_a) = next_request(&mut fixture.events).await;
    assert_eq!(op_a, McOp::Get);
    let (ctx_delete, _, op_delete) = next_request(&mut fixture.events).await;
    assert_eq!(op_delete, McOp::Delete);

    // The later delete answers first but must wait behind the whole
    // multiget on the wire.
    ctx_delete.reply(McReply::new(McResult::Deleted));
    ctx_a.reply(McReply::new(McResult::Ok).with_value(Bytes::from_static(b"AA")));

    expect_wire(
        &mut fixture.client,
        b"VALUE a 0 2\r\nAA\r\nEND\r\nDELETED\r\n",
    )
    .await;
}

#[rstest]
#[tokio::test]
async fn close_mid_multiop_simulates_the_end_marker() {
    // The scripted step opens a multiget sub-request but never delivers
    // the end marker; EOF must simulate it so the session can drain.
    let parser = ScriptedParser::in_order(vec![Ok(vec![request_event(McOp::Get, b"a")])]);
    let mut fixture = spawn_session(parser, SessionConfig::default());
    fixture.client.write_all(b"\n").await.unwrap();

    let (ctx, ..) = next_request(&mut fixture.events).await;

    // EOF: the session starts closing with the multiop still open.
    drop(fixture.client);
    ctx.reply(McReply::new(McResult::Ok).with_value(Bytes::from_static(b"AA")));

    expect_finished(fixture.task).await;
    assert_eq!(fixture.counters.close_starts(), 1);
    assert_eq!(fixture.counters.close_finishes(), 1);
}
