//! Error types for session construction and stream parsing.

use thiserror::Error;

use crate::protocol::{McResult, Protocol};

/// Errors surfaced while constructing a session.
///
/// Runtime failures (transport errors, EOF, parse rejections) are not
/// errors to the owner: they fold into the close state machine and are
/// observable only through the `on_close_finish` hook.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The configuration cannot produce a working session.
    #[error("session startup failed: {0}")]
    StartupFailed(String),

    /// No reply encoder is available for the negotiated protocol.
    #[error("no reply encoder for protocol {0:?}")]
    ProtocolMisconfigured(Protocol),
}

/// A parser rejection.
///
/// Carries the result code and reason the session echoes back to the
/// client in its final synthesized reply before closing.
#[derive(Clone, Debug, Error)]
#[error("parse error ({result:?}): {reason}")]
pub struct ParseError {
    /// Result code for the synthesized reply.
    pub result: McResult,
    /// Human-readable reason echoed to the client.
    pub reason: String,
}

impl ParseError {
    /// A `CLIENT_ERROR` rejection.
    #[must_use]
    pub fn client_error(reason: impl Into<String>) -> Self {
        Self {
            result: McResult::ClientError,
            reason: reason.into(),
        }
    }
}
