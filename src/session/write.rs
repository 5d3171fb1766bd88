//! Write staging, batching, and completion.
//!
//! `queue_write` only stages; the loop flushes everything staged during
//! the current turn. Batched mode hands the whole stage to one vectored
//! write; single-write mode issues one vectored write per buffer. Either
//! way the batch's buffer count is recorded so completion retires exactly
//! that many, noreply buffers included.

use std::io::IoSlice;

use bytes::Bytes;
use log::warn;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::McServerSession;
use super::state::{PauseReason, SessionState};
use crate::hooks::RequestHandler;
use crate::parser::RequestParser;
use crate::write_queue::WriteBuffer;

/// Cap on iovec entries per vectored write call.
const MAX_IOVECS: usize = 64;

impl<T, P, H> McServerSession<T, P, H>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    P: RequestParser,
    H: RequestHandler,
{
    /// Stage a buffer for the flush at the end of the current turn.
    pub(super) fn queue_write(&mut self, buffer: WriteBuffer) {
        self.writes.stage(buffer);
        self.write_scheduled = true;
    }

    /// Flush every staged batch.
    ///
    /// After a write error the transport is marked bad and remaining
    /// batches retire without touching the wire, so every buffer is still
    /// accounted exactly once.
    pub(super) async fn send_writes(&mut self) {
        if !self.write_scheduled {
            return;
        }
        self.write_scheduled = false;

        while self.writes.has_pending() {
            let limit = if self.config.single_write {
                1
            } else {
                usize::MAX
            };
            let segments = self.writes.commit_batch(limit);
            self.pause.set(PauseReason::Write);

            let result = match self.transport.as_mut() {
                Some(io) if self.transport_good && !segments.is_empty() => {
                    if let Some(tap) = self.debug_tap.as_mut() {
                        for segment in &segments {
                            tap.sent(segment);
                        }
                    }
                    write_segments(io, &segments).await
                }
                _ => Ok(()),
            };

            self.complete_write();

            match result {
                Ok(()) => {
                    if self.writes.is_quiescent() {
                        if self.state == SessionState::Streaming {
                            self.hooks.write_quiescence(self.id);
                        }
                        self.pause.clear(PauseReason::Write);
                    }
                }
                Err(err) => {
                    warn!("transport write failed: id={:?}, error={err}", self.id);
                    crate::metrics::inc_write_errors();
                    self.transport_good = false;
                    self.close();
                }
            }
        }
    }

    /// Retire the oldest batch and complete its transactions.
    fn complete_write(&mut self) {
        for buffer in self.writes.complete_batch() {
            self.transaction_completed(buffer.is_sub());
        }
    }
}

/// Write `segments` in order, advancing through partial vectored writes.
async fn write_segments<T>(io: &mut T, segments: &[Bytes]) -> std::io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    let segments: Vec<&Bytes> = segments.iter().filter(|s| !s.is_empty()).collect();
    let mut seg = 0;
    let mut offset = 0;

    while seg < segments.len() {
        let mut iovs = Vec::with_capacity(MAX_IOVECS.min(segments.len() - seg));
        iovs.push(IoSlice::new(&segments[seg][offset..]));
        for segment in segments[seg + 1..].iter().take(MAX_IOVECS - 1) {
            iovs.push(IoSlice::new(segment));
        }

        let mut written = io.write_vectored(&iovs).await?;
        if written == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        while written > 0 && seg < segments.len() {
            let remaining = segments[seg].len() - offset;
            if written >= remaining {
                written -= remaining;
                seg += 1;
                offset = 0;
            } else {
                offset += written;
                written = 0;
            }
        }
    }

    io.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_segments_handles_partial_writes() {
        // A duplex with a 4-byte internal buffer forces short writes.
        let (mut near, mut far) = tokio::io::duplex(4);
        let segments = vec![
            Bytes::from_static(b"hello "),
            Bytes::new(),
            Bytes::from_static(b"vectored "),
            Bytes::from_static(b"world"),
        ];

        let writer = tokio::spawn(async move {
            write_segments(&mut near, &segments).await.unwrap();
            drop(near);
        });

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut far, &mut out)
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(out, b"hello vectored world");
    }
}
