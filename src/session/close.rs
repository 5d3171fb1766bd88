//! The close state machine.

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::McServerSession;
use super::state::SessionState;
use crate::hooks::RequestHandler;
use crate::parser::RequestParser;

impl<T, P, H> McServerSession<T, P, H>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    P: RequestParser,
    H: RequestHandler,
{
    /// Begin (or re-observe) teardown. Idempotent: repeated calls collapse
    /// through the `check_closed` gate.
    pub(super) fn close(&mut self) {
        // A close mid-multi-op behaves as if the end marker arrived, so
        // the aggregator can flush or drop.
        if self.current_multiop.is_some() {
            self.process_multi_op_end();
        }

        if self.state == SessionState::Streaming {
            self.state = SessionState::Closing;
            debug!("session closing: id={:?}", self.id);
            self.hooks.close_start(self.id);
        }

        self.check_closed();
    }

    /// Take the `Closing → Closed` transition once nothing is in flight.
    ///
    /// Releases the transport exactly once; `on_close_finish` is the last
    /// callback the session ever makes.
    pub(super) fn check_closed(&mut self) {
        if self.in_flight != 0 {
            return;
        }
        debug_assert!(
            !self.writes.has_pending(),
            "write staged with no transaction in flight"
        );

        if self.state == SessionState::Closing {
            self.state = SessionState::Closed;
            // Dropping the transport detaches readability before any
            // spurious EOF can be observed.
            self.transport = None;
            self.hooks.close_finish(self.id);
        }
    }
}
