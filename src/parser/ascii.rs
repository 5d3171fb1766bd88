//! Reference parser for the memcached text protocol.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};

use super::{ParserEvent, RequestParser};
use crate::error::ParseError;
use crate::protocol::{McOp, McResult, Protocol};
use crate::request::McRequest;

/// Longest accepted command line, data blocks excluded.
const MAX_LINE_LEN: usize = 8 * 1024;
/// Longest accepted key, per the text protocol.
const MAX_KEY_LEN: usize = 250;

/// Line-oriented parser for the memcached text protocol.
///
/// Always in-order: ids are assigned by the session. Multi-key GETs are
/// emitted as one [`ParserEvent::Request`] per key followed by
/// [`ParserEvent::MultiOpEnd`].
#[derive(Default)]
pub struct AsciiParser {
    state: State,
}

#[derive(Default)]
enum State {
    #[default]
    Command,
    /// Waiting for `needed` payload bytes plus the trailing CRLF.
    Data {
        op: McOp,
        request: McRequest,
        result: McResult,
        noreply: bool,
        needed: usize,
    },
}

impl AsciiParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestParser for AsciiParser {
    fn protocol(&self) -> Protocol {
        Protocol::Ascii
    }

    fn out_of_order(&self) -> bool {
        false
    }

    fn consume(
        &mut self,
        buf: &mut BytesMut,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        loop {
            match std::mem::take(&mut self.state) {
                State::Command => {
                    let Some(line_end) = buf.iter().position(|&b| b == b'\n') else {
                        if buf.len() > MAX_LINE_LEN {
                            return Err(ParseError::client_error("command line too long"));
                        }
                        return Ok(());
                    };
                    let line = buf.split_to(line_end + 1);
                    let line = trim_line(&line);
                    self.parse_command(line, events)?;
                }
                State::Data {
                    op,
                    request,
                    result,
                    noreply,
                    needed,
                } => {
                    if buf.len() < needed + 2 {
                        self.state = State::Data {
                            op,
                            request,
                            result,
                            noreply,
                            needed,
                        };
                        return Ok(());
                    }
                    let value = buf.split_to(needed).freeze();
                    if &buf[..2] != b"\r\n" {
                        return Err(ParseError::client_error("bad data chunk"));
                    }
                    buf.advance(2);
                    events.push_back(ParserEvent::Request {
                        request: request.with_value(value),
                        op,
                        reqid: 0,
                        result,
                        noreply,
                    });
                }
            }
        }
    }
}

impl AsciiParser {
    fn parse_command(
        &mut self,
        line: &[u8],
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
        let Some(cmd) = tokens.next() else {
            // Bare newline; tolerated between pipelined commands.
            return Ok(());
        };

        match std::str::from_utf8(cmd).unwrap_or("") {
            "get" => Self::parse_get(McOp::Get, tokens, events),
            "gets" => Self::parse_get(McOp::Gets, tokens, events),
            "lease-get" => Self::parse_get(McOp::LeaseGet, tokens, events),
            "metaget" => Self::parse_get(McOp::Metaget, tokens, events),
            "set" => self.parse_storage(McOp::Set, tokens),
            "add" => self.parse_storage(McOp::Add, tokens),
            "replace" => self.parse_storage(McOp::Replace, tokens),
            "append" => self.parse_storage(McOp::Append, tokens),
            "prepend" => self.parse_storage(McOp::Prepend, tokens),
            "cas" => self.parse_storage(McOp::Cas, tokens),
            "delete" => Self::parse_delete(tokens, events),
            "incr" => Self::parse_arith(McOp::Incr, tokens, events),
            "decr" => Self::parse_arith(McOp::Decr, tokens, events),
            "touch" => Self::parse_touch(tokens, events),
            "flush_all" => Self::parse_flush_all(tokens, events),
            "stats" => {
                push_request(events, McRequest::default(), McOp::Stats, McResult::Ok, false);
                Ok(())
            }
            "version" => {
                push_request(events, McRequest::default(), McOp::Version, McResult::Ok, false);
                Ok(())
            }
            "quit" => {
                // The reply exists only to complete the transaction; it
                // never reaches the wire.
                push_request(events, McRequest::default(), McOp::Quit, McResult::Ok, true);
                Ok(())
            }
            "shutdown" => {
                push_request(events, McRequest::default(), McOp::Shutdown, McResult::Ok, false);
                Ok(())
            }
            _ => Err(ParseError::client_error(format!(
                "unknown command '{}'",
                String::from_utf8_lossy(cmd)
            ))),
        }
    }

    fn parse_get<'a>(
        op: McOp,
        tokens: impl Iterator<Item = &'a [u8]>,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let mut emitted = 0usize;
        for key in tokens {
            let result = validate_key(key);
            push_request(
                events,
                McRequest::new(BytesMut::from(key).freeze()),
                op,
                result,
                false,
            );
            emitted += 1;
        }
        if emitted == 0 {
            return Err(ParseError::client_error("get requires at least one key"));
        }
        events.push_back(ParserEvent::MultiOpEnd);
        Ok(())
    }

    fn parse_storage<'a>(
        &mut self,
        op: McOp,
        mut tokens: impl Iterator<Item = &'a [u8]>,
    ) -> Result<(), ParseError> {
        let key = tokens
            .next()
            .ok_or_else(|| ParseError::client_error("bad command line format"))?;
        let flags: u32 = parse_number(tokens.next())?;
        let exptime: u32 = parse_number(tokens.next())?;
        let needed: usize = parse_number(tokens.next())?;
        let cas: Option<u64> = if op == McOp::Cas {
            Some(parse_number(tokens.next())?)
        } else {
            None
        };
        let noreply = parse_noreply(tokens)?;

        let result = validate_key(key);
        let mut request = McRequest::new(BytesMut::from(key).freeze())
            .with_flags(flags)
            .with_exptime(exptime);
        if let Some(cas) = cas {
            request = request.with_cas(cas);
        }
        // Data must be consumed even when the key is bad, or the payload
        // would be reparsed as commands.
        self.state = State::Data {
            op,
            request,
            result,
            noreply,
            needed,
        };
        Ok(())
    }

    fn parse_delete<'a>(
        mut tokens: impl Iterator<Item = &'a [u8]>,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let key = tokens
            .next()
            .ok_or_else(|| ParseError::client_error("bad command line format"))?;
        let noreply = parse_noreply(tokens)?;
        let result = validate_key(key);
        push_request(
            events,
            McRequest::new(BytesMut::from(key).freeze()),
            McOp::Delete,
            result,
            noreply,
        );
        Ok(())
    }

    fn parse_arith<'a>(
        op: McOp,
        mut tokens: impl Iterator<Item = &'a [u8]>,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let key = tokens
            .next()
            .ok_or_else(|| ParseError::client_error("bad command line format"))?;
        let delta: u64 = parse_number(tokens.next())?;
        let noreply = parse_noreply(tokens)?;
        let result = validate_key(key);
        push_request(
            events,
            McRequest::new(BytesMut::from(key).freeze()).with_delta(delta),
            op,
            result,
            noreply,
        );
        Ok(())
    }

    fn parse_touch<'a>(
        mut tokens: impl Iterator<Item = &'a [u8]>,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let key = tokens
            .next()
            .ok_or_else(|| ParseError::client_error("bad command line format"))?;
        let exptime: u32 = parse_number(tokens.next())?;
        let noreply = parse_noreply(tokens)?;
        let result = validate_key(key);
        push_request(
            events,
            McRequest::new(BytesMut::from(key).freeze()).with_exptime(exptime),
            McOp::Touch,
            result,
            noreply,
        );
        Ok(())
    }

    fn parse_flush_all<'a>(
        mut tokens: impl Iterator<Item = &'a [u8]>,
        events: &mut VecDeque<ParserEvent>,
    ) -> Result<(), ParseError> {
        let mut exptime = 0u32;
        let mut noreply = false;
        if let Some(token) = tokens.next() {
            if token == b"noreply" {
                noreply = true;
            } else {
                exptime = parse_number(Some(token))?;
                noreply = parse_noreply(tokens)?;
            }
        }
        push_request(
            events,
            McRequest::default().with_exptime(exptime),
            McOp::FlushAll,
            McResult::Ok,
            noreply,
        );
        Ok(())
    }
}

fn push_request(
    events: &mut VecDeque<ParserEvent>,
    request: McRequest,
    op: McOp,
    result: McResult,
    noreply: bool,
) {
    events.push_back(ParserEvent::Request {
        request,
        op,
        reqid: 0,
        result,
        noreply,
    });
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn validate_key(key: &[u8]) -> McResult {
    let printable = key.iter().all(|&b| b > 32 && b != 127);
    if key.is_empty() || key.len() > MAX_KEY_LEN || !printable {
        McResult::BadKey
    } else {
        McResult::Ok
    }
}

fn parse_number<N: std::str::FromStr>(token: Option<&[u8]>) -> Result<N, ParseError> {
    token
        .and_then(|t| std::str::from_utf8(t).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::client_error("bad command line format"))
}

fn parse_noreply<'a>(mut tokens: impl Iterator<Item = &'a [u8]>) -> Result<bool, ParseError> {
    match tokens.next() {
        None => Ok(false),
        Some(token) if token == b"noreply" => Ok(true),
        Some(_) => Err(ParseError::client_error("bad command line format")),
    }
}
