//! In-memory `PtyAdapter` fake for broker tests.
//!
//! Lets a test drive PTY output byte-for-byte and observe what the broker
//! wrote back, without spawning a real shell. Used to verify close-code
//! propagation (Testable Property #9) independent of OS pty quirks.

use super::{OpenParams, PtyAdapter, PtyHandle};
use crate::error::PtyError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared state a test can manipulate from outside while the broker holds
/// the `PtyHandle` on the other end.
#[derive(Debug, Default)]
pub struct FakePtyState {
    /// Bytes queued to be "read" from the pty (i.e. simulated shell output).
    pub pending_output: VecDeque<u8>,
    /// Bytes the broker has written to the pty (i.e. simulated shell input).
    pub written: Vec<u8>,
    /// Last `(cols, rows)` passed to `resize`.
    pub last_resize: Option<(u16, u16)>,
    /// Set by the test to make `is_done` return true.
    pub exited: bool,
    /// Set when `close` is called.
    pub closed: bool,
}

/// Adapter that always returns a handle backed by a fresh `FakePtyState`.
/// Tests that need to observe the state should use `FakePty::open_with_state`
/// directly rather than going through the `PtyAdapter` trait object.
#[derive(Debug, Default)]
pub struct FakePty;

impl PtyAdapter for FakePty {
    fn open(&self, _params: &OpenParams) -> Result<Arc<dyn PtyHandle>, PtyError> {
        let (handle, _state) = Self::open_with_state();
        Ok(Arc::new(handle))
    }
}

impl FakePty {
    /// Open a handle and return its shared state directly, for tests that
    /// need to manipulate the fake pty from outside the `PtyAdapter` trait
    /// object boundary.
    #[must_use]
    pub fn open_with_state() -> (FakePtyHandle, Arc<Mutex<FakePtyState>>) {
        let state = Arc::new(Mutex::new(FakePtyState::default()));
        (FakePtyHandle { state: state.clone() }, state)
    }
}

/// A `PtyHandle` backed by shared, externally observable state.
pub struct FakePtyHandle {
    state: Arc<Mutex<FakePtyState>>,
}

impl PtyHandle for FakePtyHandle {
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock().expect("fake pty state lock poisoned");
        let n = buf.len().min(state.pending_output.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.pending_output.pop_front().expect("checked len above");
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> std::io::Result<()> {
        self.state.lock().expect("fake pty state lock poisoned").written.extend_from_slice(buf);
        Ok(())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.state.lock().expect("fake pty state lock poisoned").last_resize = Some((cols, rows));
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.state.lock().expect("fake pty state lock poisoned").exited
    }

    fn close(&self) {
        self.state.lock().expect("fake pty state lock poisoned").closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_round_trips_writes_and_reads() {
        let (handle, state) = FakePty::open_with_state();
        handle.write(b"ls\n").unwrap();
        assert_eq!(state.lock().unwrap().written, b"ls\n");

        state.lock().unwrap().pending_output.extend(b"total 0\n".iter().copied());
        let mut buf = [0u8; 32];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"total 0\n");
    }

    #[test]
    fn fake_reports_is_done_and_close() {
        let (handle, state) = FakePty::open_with_state();
        assert!(!handle.is_done());
        handle.close();
        assert!(state.lock().unwrap().closed);
        // closing doesn't imply exited in this fake; they're independent knobs.
        assert!(!handle.is_done());

        state.lock().unwrap().exited = true;
        assert!(handle.is_done());
    }

    #[test]
    fn fake_records_resize_calls() {
        let (handle, state) = FakePty::open_with_state();
        handle.resize(120, 40).unwrap();
        assert_eq!(state.lock().unwrap().last_resize, Some((120, 40)));
    }
}
