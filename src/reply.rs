//! Reply record submitted through a request context.

use bytes::Bytes;

use crate::error::ParseError;
use crate::protocol::McResult;

/// A reply produced by the handler (or synthesized by the session).
#[derive(Clone, Debug)]
pub struct McReply {
    result: McResult,
    value: Option<Bytes>,
    flags: u32,
    cas: Option<u64>,
    message: Option<String>,
}

impl McReply {
    /// Create a bare reply carrying only a result code.
    #[must_use]
    pub fn new(result: McResult) -> Self {
        Self {
            result,
            value: None,
            flags: 0,
            cas: None,
            message: None,
        }
    }

    /// Attach a value payload (GET hits, `version`, arithmetic results).
    #[must_use]
    pub fn with_value(mut self, value: Bytes) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach item flags.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Attach a compare-and-swap token (`gets` hits).
    #[must_use]
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }

    /// A `SERVER_ERROR` reply with a human-readable message.
    #[must_use]
    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(McResult::ServerError)
        }
    }

    /// A `CLIENT_ERROR` reply with a human-readable message.
    #[must_use]
    pub fn client_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(McResult::ClientError)
        }
    }

    /// The reply the session synthesizes when the parser rejects input.
    #[must_use]
    pub fn from_parse_error(err: &ParseError) -> Self {
        Self {
            message: Some(err.reason.clone()),
            ..Self::new(err.result)
        }
    }

    /// The reply the session synthesizes for `version`.
    #[must_use]
    pub fn version(version_string: &str) -> Self {
        Self::new(McResult::Ok).with_value(Bytes::copy_from_slice(version_string.as_bytes()))
    }

    #[must_use]
    pub fn result(&self) -> McResult {
        self.result
    }

    #[must_use]
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    #[must_use]
    pub fn cas(&self) -> Option<u64> {
        self.cas
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
