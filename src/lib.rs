//! Per-connection server session for a memcached-protocol proxy.
//!
//! `mcshuttle` owns one accepted client socket, parses its byte stream
//! into requests, dispatches them to a handler, and serializes replies
//! back while preserving protocol-level ordering, honouring in-flight
//! limits, and tearing down cleanly on close. It is a pure protocol
//! shuttle: no caching, no routing, no storage.
//!
//! Dataflow: transport bytes → [`parser::RequestParser`] →
//! [`session::McServerSession`] → [`hooks::RequestHandler`] →
//! [`context::RequestContext::reply`] → write queue → transport.
//!
//! ```no_run
//! use mcshuttle::{
//!     AsciiParser, McServerSession, RequestContext, RequestHandler, SessionConfig,
//!     SessionHooks, TransportInfo,
//! };
//! use mcshuttle::{McOp, McReply, McRequest, McResult};
//!
//! struct NotFound;
//!
//! impl RequestHandler for NotFound {
//!     fn on_request(&mut self, ctx: RequestContext, _request: McRequest, _op: McOp) {
//!         ctx.reply(McReply::new(McResult::NotFound));
//!     }
//! }
//!
//! # async fn accept(stream: tokio::net::TcpStream, peer: std::net::SocketAddr) {
//! let session = McServerSession::new(
//!     stream,
//!     TransportInfo::plain(peer),
//!     AsciiParser::new(),
//!     NotFound,
//!     SessionHooks::default(),
//!     SessionConfig::default(),
//! )
//! .expect("session construction");
//! tokio::spawn(session.run());
//! # }
//! ```

pub mod codec;
pub mod config;
mod context;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod multi_op;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod reply;
pub mod request;
pub mod session;
pub mod tls;
pub mod write_queue;

pub use codec::{AsciiReplyEncoder, ReplyEncoder, TypedReplyEncoder};
pub use config::SessionConfig;
pub use context::RequestContext;
pub use error::{ParseError, SessionError};
pub use hooks::{DebugTap, RequestHandler, SessionHooks};
pub use parser::{AsciiParser, ParserEvent, RequestParser};
pub use protocol::{McOp, McResult, Protocol};
pub use registry::{SessionHandle, SessionId, SessionRegistry};
pub use reply::McReply;
pub use request::McRequest;
pub use session::{McServerSession, TransportInfo, active_session_count};
