//! Wire-protocol vocabulary shared by the parser, the encoders, and the
//! session: operations, reply results, and the protocol variants the
//! session can shuttle.

/// Wire protocol negotiated for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// The memcached text protocol. Replies must leave the session in
    /// request-arrival order.
    Ascii,
    /// A typed, length-prefixed protocol. Requests carry their own ids and
    /// replies may be emitted out of arrival order.
    Typed,
}

/// Operations the session recognises.
///
/// The set covers the text-protocol commands a proxy session routes plus
/// [`McOp::Unknown`] for typed requests and synthesized error replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum McOp {
    Get,
    Gets,
    LeaseGet,
    Metaget,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
    Delete,
    Incr,
    Decr,
    Touch,
    FlushAll,
    Stats,
    Version,
    Quit,
    Shutdown,
    Unknown,
}

impl McOp {
    /// Command keyword as it appears on the wire, for logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            McOp::Get => "get",
            McOp::Gets => "gets",
            McOp::LeaseGet => "lease-get",
            McOp::Metaget => "metaget",
            McOp::Set => "set",
            McOp::Add => "add",
            McOp::Replace => "replace",
            McOp::Append => "append",
            McOp::Prepend => "prepend",
            McOp::Cas => "cas",
            McOp::Delete => "delete",
            McOp::Incr => "incr",
            McOp::Decr => "decr",
            McOp::Touch => "touch",
            McOp::FlushAll => "flush_all",
            McOp::Stats => "stats",
            McOp::Version => "version",
            McOp::Quit => "quit",
            McOp::Shutdown => "shutdown",
            McOp::Unknown => "unknown",
        }
    }
}

/// Result code carried by a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum McResult {
    Ok,
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    /// The request key failed validation before routing.
    BadKey,
    /// The client sent something the proxy cannot act on.
    ClientError,
    /// The proxy failed internally while servicing the request.
    ServerError,
}

impl McResult {
    /// Returns `true` for results that describe a failure rather than a
    /// routable outcome.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            McResult::BadKey | McResult::ClientError | McResult::ServerError
        )
    }
}

/// Returns `true` when the operation is one leg of an ASCII multi-key GET.
///
/// Only the text protocol batches GETs; typed requests are always
/// standalone.
#[must_use]
pub fn is_multi_get(protocol: Protocol, op: McOp) -> bool {
    if protocol != Protocol::Ascii {
        return false;
    }
    matches!(op, McOp::Get | McOp::Gets | McOp::LeaseGet | McOp::Metaget)
}
