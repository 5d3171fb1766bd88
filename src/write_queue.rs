//! Serialized reply buffers and the three-compartment write queue.
//!
//! Replies stage in `pending` until the session flushes, move to
//! `inflight` for the duration of transport ownership, and retire in FIFO
//! batches whose sizes are recorded in `batches`. Noreply buffers travel
//! the same road without contributing wire segments, so completion
//! accounting never drifts.

use std::collections::VecDeque;

use bytes::Bytes;

/// A serialized reply owned by the write queue.
#[derive(Debug)]
pub struct WriteBuffer {
    reqid: u64,
    noreply: bool,
    is_sub: bool,
    segments: Vec<Bytes>,
}

impl WriteBuffer {
    /// A reply buffer carrying wire segments.
    #[must_use]
    pub fn new(reqid: u64, noreply: bool, segments: Vec<Bytes>) -> Self {
        Self {
            reqid,
            noreply,
            is_sub: false,
            segments,
        }
    }

    /// An empty noreply buffer releasing a multi-op sub-request's slot.
    #[must_use]
    pub fn sub_placeholder(reqid: u64) -> Self {
        Self {
            reqid,
            noreply: true,
            is_sub: true,
            segments: Vec::new(),
        }
    }

    #[must_use]
    pub fn reqid(&self) -> u64 {
        self.reqid
    }

    #[must_use]
    pub fn noreply(&self) -> bool {
        self.noreply
    }

    /// `true` when retiring this buffer completes a sub-request
    /// transaction rather than a real one.
    #[must_use]
    pub fn is_sub(&self) -> bool {
        self.is_sub
    }

    #[must_use]
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }
}

/// Reply buffers in send order, across staging, transport ownership, and
/// batch retirement.
#[derive(Debug, Default)]
pub struct WriteBufferQueue {
    pending: VecDeque<WriteBuffer>,
    inflight: VecDeque<WriteBuffer>,
    batches: VecDeque<usize>,
}

impl WriteBufferQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a reply for the next flush.
    pub fn stage(&mut self, buffer: WriteBuffer) {
        self.pending.push_back(buffer);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// `true` once every buffer has been retired.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.pending.is_empty() && self.inflight.is_empty()
    }

    /// Move up to `limit` staged buffers into transport ownership as one
    /// batch, returning the wire segments the batch contributes.
    ///
    /// Noreply buffers join the batch (and its retirement count) but add
    /// no segments.
    pub fn commit_batch(&mut self, limit: usize) -> Vec<Bytes> {
        let mut segments = Vec::new();
        let mut count = 0;
        while count < limit {
            let Some(buffer) = self.pending.pop_front() else {
                break;
            };
            if !buffer.noreply() {
                segments.extend_from_slice(buffer.segments());
            }
            self.inflight.push_back(buffer);
            count += 1;
        }
        if count > 0 {
            self.batches.push_back(count);
        }
        segments
    }

    /// Retire the oldest batch, yielding its buffers for transaction
    /// completion.
    pub fn complete_batch(&mut self) -> Vec<WriteBuffer> {
        let count = self.batches.pop_front().unwrap_or(0);
        debug_assert!(count <= self.inflight.len());
        let mut retired = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(buffer) = self.inflight.pop_front() else {
                break;
            };
            retired.push(buffer);
        }
        retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(reqid: u64, payload: &'static [u8]) -> WriteBuffer {
        WriteBuffer::new(reqid, false, vec![Bytes::from_static(payload)])
    }

    fn noreply_buffer(reqid: u64) -> WriteBuffer {
        WriteBuffer::new(reqid, true, vec![Bytes::from_static(b"suppressed")])
    }

    #[test]
    fn batch_preserves_order_and_skips_noreply_segments() {
        let mut queue = WriteBufferQueue::new();
        queue.stage(buffer(0, b"a"));
        queue.stage(noreply_buffer(1));
        queue.stage(buffer(2, b"c"));

        let segments = queue.commit_batch(usize::MAX);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].as_ref(), b"a");
        assert_eq!(segments[1].as_ref(), b"c");

        // All three buffers retire together, the suppressed one included.
        let retired = queue.complete_batch();
        assert_eq!(retired.len(), 3);
        assert_eq!(
            retired.iter().map(WriteBuffer::reqid).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(queue.is_quiescent());
    }

    #[test]
    fn single_write_batches_are_singletons() {
        let mut queue = WriteBufferQueue::new();
        queue.stage(buffer(0, b"a"));
        queue.stage(buffer(1, b"b"));

        assert_eq!(queue.commit_batch(1).len(), 1);
        assert_eq!(queue.commit_batch(1).len(), 1);
        assert_eq!(queue.complete_batch().len(), 1);
        assert_eq!(queue.complete_batch().len(), 1);
        assert!(queue.is_quiescent());
    }

    #[test]
    fn empty_commit_records_no_batch() {
        let mut queue = WriteBufferQueue::new();
        assert!(queue.commit_batch(usize::MAX).is_empty());
        assert!(queue.complete_batch().is_empty());
        assert!(queue.is_quiescent());
    }
}
