//! Aggregation of ASCII multi-key GET sub-requests.
//!
//! A multi-key GET surfaces to the handler as individual sub-requests but
//! answers the client as one logical reply. The parent reserves the wire
//! slot ahead of its sub-requests; sub-replies merge here, and once every
//! sub has reported and the parser's end marker has been seen, the parent
//! submits a single aggregated reply closed by a synthetic terminator.

use bytes::Bytes;
use std::collections::BTreeMap;

use crate::reply::McReply;
use crate::write_queue::WriteBuffer;

/// Accumulator for one in-flight multi-key GET.
#[derive(Debug, Default)]
pub struct MultiOpParent {
    parent_reqid: u64,
    pending_subs: usize,
    end_seen: bool,
    /// Encoded sub-payloads in sub-request arrival order.
    merged: BTreeMap<u64, Vec<Bytes>>,
    /// First error reported by any sub; preempts the merged payloads.
    error: Option<McReply>,
}

impl MultiOpParent {
    /// Create a parent owning the reserved wire slot `parent_reqid`.
    #[must_use]
    pub fn new(parent_reqid: u64) -> Self {
        Self {
            parent_reqid,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parent_reqid(&self) -> u64 {
        self.parent_reqid
    }

    /// Record that a sub-request joined this multi-op.
    pub fn sub_started(&mut self) {
        self.pending_subs += 1;
    }

    /// Merge a sub-reply's encoded payload.
    ///
    /// An error reply poisons the aggregate: the parent will answer with
    /// the first error instead of the merged values.
    pub fn sub_reply(&mut self, sub_reqid: u64, segments: Vec<Bytes>, error: Option<McReply>) {
        debug_assert!(self.pending_subs > 0);
        self.pending_subs = self.pending_subs.saturating_sub(1);
        if let Some(error) = error {
            self.error.get_or_insert(error);
            return;
        }
        if !segments.is_empty() {
            self.merged.insert(sub_reqid, segments);
        }
    }

    /// Record the parser's end marker (or its simulation at close).
    pub fn record_end(&mut self) {
        self.end_seen = true;
    }

    /// `true` once all sub-replies have merged and the end marker has been
    /// seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.end_seen && self.pending_subs == 0
    }

    /// The aggregate error, if any sub failed.
    #[must_use]
    pub fn error(&self) -> Option<&McReply> {
        self.error.as_ref()
    }

    /// Consume the parent into the single reply buffer for its reserved
    /// slot.
    ///
    /// `error_segments` must be the pre-encoded form of [`Self::error`]
    /// when one is present; `terminator` is appended after merged values
    /// otherwise.
    #[must_use]
    pub fn into_reply(self, error_segments: Option<Vec<Bytes>>, terminator: Bytes) -> WriteBuffer {
        debug_assert!(self.is_complete());
        let segments = match error_segments {
            Some(segments) => segments,
            None => {
                let mut segments: Vec<Bytes> =
                    self.merged.into_values().flatten().collect();
                segments.push(terminator);
                segments
            }
        };
        WriteBuffer::new(self.parent_reqid, false, segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::McReply;

    #[test]
    fn completes_only_after_end_and_all_subs() {
        let mut parent = MultiOpParent::new(0);
        parent.sub_started();
        parent.sub_started();

        parent.sub_reply(1, vec![Bytes::from_static(b"VALUE a 0 1\r\nx\r\n")], None);
        assert!(!parent.is_complete());

        parent.record_end();
        assert!(!parent.is_complete());

        parent.sub_reply(2, vec![], None);
        assert!(parent.is_complete());
    }

    #[test]
    fn aggregated_reply_orders_by_sub_id_and_terminates() {
        let mut parent = MultiOpParent::new(7);
        parent.sub_started();
        parent.sub_started();
        parent.record_end();
        // Replies merge out of order; the aggregate restores arrival order.
        parent.sub_reply(9, vec![Bytes::from_static(b"second")], None);
        parent.sub_reply(8, vec![Bytes::from_static(b"first")], None);

        let buffer = parent.into_reply(None, Bytes::from_static(b"END\r\n"));
        assert_eq!(buffer.reqid(), 7);
        let wire: Vec<u8> = buffer.segments().concat();
        assert_eq!(wire, b"firstsecondEND\r\n");
    }

    #[test]
    fn first_error_preempts_values() {
        let mut parent = MultiOpParent::new(0);
        parent.sub_started();
        parent.sub_started();
        parent.record_end();
        parent.sub_reply(1, vec![Bytes::from_static(b"VALUE ...")], None);
        parent.sub_reply(2, vec![], Some(McReply::server_error("route down")));

        assert!(parent.error().is_some());
        let buffer = parent.into_reply(
            Some(vec![Bytes::from_static(b"SERVER_ERROR route down\r\n")]),
            Bytes::from_static(b"END\r\n"),
        );
        assert_eq!(buffer.segments().concat(), b"SERVER_ERROR route down\r\n");
    }
}
