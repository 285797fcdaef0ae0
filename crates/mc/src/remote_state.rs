//! CPU run/stop/pause state as driven by remote-control commands.

use std::sync::atomic::{AtomicU8, Ordering};

const RUN: u8 = 0;
const STOP: u8 = 1;
const PAUSE: u8 = 2;

/// Emulated CPU operating state, mutated by `REMOTE_RUN`/`STOP`/`PAUSE`/`RESET`.
pub struct RemoteState {
    state: AtomicU8,
}

impl RemoteState {
    pub fn new() -> Self {
        RemoteState { state: AtomicU8::new(STOP) }
    }

    pub fn run(&self) {
        self.state.store(RUN, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.state.store(STOP, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.state.store(PAUSE, Ordering::SeqCst);
    }

    /// A reset returns the CPU to the stopped state; it does not clear
    /// device memory (see [`crate::device_store::DeviceStore::clear_all`]
    /// for that).
    pub fn reset(&self) {
        self.state.store(STOP, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUN
    }

    pub fn is_paused(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PAUSE
    }
}

impl Default for RemoteState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_stop_pause_transitions() {
        let state = RemoteState::new();
        assert!(!state.is_running());
        state.run();
        assert!(state.is_running());
        state.pause();
        assert!(state.is_paused());
        state.stop();
        assert!(!state.is_running() && !state.is_paused());
    }

    #[test]
    fn reset_returns_to_stopped() {
        let state = RemoteState::new();
        state.run();
        state.reset();
        assert!(!state.is_running());
    }
}
