//! Reply encoders.
//!
//! The session never touches wire syntax itself: a [`ReplyEncoder`] turns a
//! reply into the byte segments a vectored write will pick up. Segments are
//! [`Bytes`] so value payloads pass through without copying.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::{McOp, McResult, Protocol};
use crate::reply::McReply;

/// Protocol-specific reply encoding.
pub trait ReplyEncoder: Send {
    /// Encode `reply` for `op` into wire segments appended to `out`.
    ///
    /// A reply may encode to zero segments (an ASCII GET miss produces no
    /// output; its absence is the reply).
    fn encode(&self, op: McOp, key: Option<&[u8]>, reply: &McReply, out: &mut Vec<Bytes>);

    /// The synthetic terminator closing an aggregated multi-key GET reply.
    fn multi_op_terminator(&self) -> Bytes;
}

/// Select the crate-provided encoder for `protocol`.
pub(crate) fn encoder_for(protocol: Protocol) -> Box<dyn ReplyEncoder> {
    match protocol {
        Protocol::Ascii => Box::new(AsciiReplyEncoder),
        Protocol::Typed => Box::new(TypedReplyEncoder),
    }
}

/// Encoder for the memcached text protocol.
pub struct AsciiReplyEncoder;

impl AsciiReplyEncoder {
    fn error_line(reply: &McReply) -> Bytes {
        let (prefix, default_msg) = match reply.result() {
            McResult::ServerError => ("SERVER_ERROR", "internal error"),
            McResult::BadKey => ("CLIENT_ERROR", "bad key"),
            _ => ("CLIENT_ERROR", "bad request"),
        };
        let msg = reply.message().unwrap_or(default_msg);
        Bytes::from(format!("{prefix} {msg}\r\n"))
    }

    fn value_header(key: &[u8], reply: &McReply, len: usize) -> Bytes {
        let mut header = BytesMut::with_capacity(key.len() + 32);
        header.put_slice(b"VALUE ");
        header.put_slice(key);
        match reply.cas() {
            Some(cas) => {
                header.put_slice(format!(" {} {len} {cas}\r\n", reply.flags()).as_bytes());
            }
            None => header.put_slice(format!(" {} {len}\r\n", reply.flags()).as_bytes()),
        }
        header.freeze()
    }
}

impl ReplyEncoder for AsciiReplyEncoder {
    fn encode(&self, op: McOp, key: Option<&[u8]>, reply: &McReply, out: &mut Vec<Bytes>) {
        if reply.result().is_error() {
            out.push(Self::error_line(reply));
            return;
        }

        match op {
            McOp::Get | McOp::Gets | McOp::LeaseGet | McOp::Metaget => {
                // A miss encodes to nothing; the terminator alone reports it.
                let (Some(key), Some(value)) = (key, reply.value()) else {
                    return;
                };
                out.push(Self::value_header(key, reply, value.len()));
                out.push(value.clone());
                out.push(Bytes::from_static(b"\r\n"));
            }
            McOp::Version => {
                let mut line = BytesMut::with_capacity(32);
                line.put_slice(b"VERSION ");
                if let Some(value) = reply.value() {
                    line.put_slice(value);
                }
                line.put_slice(b"\r\n");
                out.push(line.freeze());
            }
            McOp::Incr | McOp::Decr => match reply.value() {
                Some(value) => {
                    out.push(value.clone());
                    out.push(Bytes::from_static(b"\r\n"));
                }
                None => out.push(result_line(reply.result())),
            },
            McOp::Stats => {
                if let Some(value) = reply.value() {
                    out.push(value.clone());
                }
                out.push(Bytes::from_static(b"END\r\n"));
            }
            _ => out.push(result_line(reply.result())),
        }
    }

    fn multi_op_terminator(&self) -> Bytes {
        Bytes::from_static(b"END\r\n")
    }
}

fn result_line(result: McResult) -> Bytes {
    Bytes::from_static(match result {
        McResult::Ok => b"OK\r\n",
        McResult::Stored => b"STORED\r\n",
        McResult::NotStored => b"NOT_STORED\r\n",
        McResult::Exists => b"EXISTS\r\n",
        McResult::NotFound => b"NOT_FOUND\r\n",
        McResult::Deleted => b"DELETED\r\n",
        McResult::Touched => b"TOUCHED\r\n",
        // Error results never reach here; encode() routes them first.
        McResult::BadKey | McResult::ClientError | McResult::ServerError => b"ERROR\r\n",
    })
}

/// Encoder for the typed protocol: a big-endian `u32` length over a
/// one-byte result code plus the payload.
pub struct TypedReplyEncoder;

impl TypedReplyEncoder {
    fn result_code(result: McResult) -> u8 {
        match result {
            McResult::Ok => 0,
            McResult::Stored => 1,
            McResult::NotStored => 2,
            McResult::Exists => 3,
            McResult::NotFound => 4,
            McResult::Deleted => 5,
            McResult::Touched => 6,
            McResult::BadKey => 7,
            McResult::ClientError => 8,
            McResult::ServerError => 9,
        }
    }
}

impl ReplyEncoder for TypedReplyEncoder {
    fn encode(&self, _op: McOp, _key: Option<&[u8]>, reply: &McReply, out: &mut Vec<Bytes>) {
        let payload = match (reply.value(), reply.message()) {
            (Some(value), _) => value.clone(),
            (None, Some(message)) => Bytes::copy_from_slice(message.as_bytes()),
            (None, None) => Bytes::new(),
        };
        let body_len = u32::try_from(payload.len() + 1).unwrap_or(u32::MAX);
        let mut header = BytesMut::with_capacity(5);
        header.put_u32(body_len);
        header.put_u8(Self::result_code(reply.result()));
        out.push(header.freeze());
        if !payload.is_empty() {
            out.push(payload);
        }
    }

    fn multi_op_terminator(&self) -> Bytes {
        Bytes::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(op: McOp, key: Option<&[u8]>, reply: &McReply) -> Vec<u8> {
        let mut segments = Vec::new();
        AsciiReplyEncoder.encode(op, key, reply, &mut segments);
        segments.concat()
    }

    #[test]
    fn get_hit_encodes_value_block() {
        let reply = McReply::new(McResult::Ok)
            .with_value(Bytes::from_static(b"world"))
            .with_flags(7);
        let wire = encode(McOp::Get, Some(b"hello"), &reply);
        assert_eq!(wire, b"VALUE hello 7 5\r\nworld\r\n");
    }

    #[test]
    fn gets_hit_carries_cas() {
        let reply = McReply::new(McResult::Ok)
            .with_value(Bytes::from_static(b"v"))
            .with_cas(42);
        let wire = encode(McOp::Gets, Some(b"k"), &reply);
        assert_eq!(wire, b"VALUE k 0 1 42\r\nv\r\n");
    }

    #[test]
    fn get_miss_encodes_to_nothing() {
        let wire = encode(McOp::Get, Some(b"gone"), &McReply::new(McResult::NotFound));
        assert!(wire.is_empty());
    }

    #[test]
    fn storage_results_encode_to_lines() {
        assert_eq!(
            encode(McOp::Set, None, &McReply::new(McResult::Stored)),
            b"STORED\r\n"
        );
        assert_eq!(
            encode(McOp::Delete, None, &McReply::new(McResult::NotFound)),
            b"NOT_FOUND\r\n"
        );
    }

    #[test]
    fn errors_encode_with_message() {
        assert_eq!(
            encode(McOp::Set, None, &McReply::client_error("bad data chunk")),
            b"CLIENT_ERROR bad data chunk\r\n"
        );
        assert_eq!(
            encode(McOp::Get, Some(b"k"), &McReply::new(McResult::BadKey)),
            b"CLIENT_ERROR bad key\r\n"
        );
    }

    #[test]
    fn version_reply_uses_version_line() {
        let wire = encode(McOp::Version, None, &McReply::version("mcshuttle test"));
        assert_eq!(wire, b"VERSION mcshuttle test\r\n");
    }

    #[test]
    fn typed_encoder_frames_payload() {
        let mut segments = Vec::new();
        TypedReplyEncoder.encode(
            McOp::Unknown,
            None,
            &McReply::new(McResult::Ok).with_value(Bytes::from_static(b"abc")),
            &mut segments,
        );
        let wire = segments.concat();
        assert_eq!(&wire[..4], &4u32.to_be_bytes());
        assert_eq!(wire[4], 0);
        assert_eq!(&wire[5..], b"abc");
    }
}
