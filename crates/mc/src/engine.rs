//! Dedicated-thread ladder scanner: runs all loaded programs at a fixed
//! interval against a shared device store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::device_store::DeviceStore;
use crate::ladder::{self, EngineState, Instruction};
use crate::remote_state::RemoteState;

const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the running ladder scan thread.
pub struct LadderEngine {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LadderEngine {
    /// Spawn the scan thread. It runs every `program` in `programs` each
    /// scan while `remote.is_running()`; otherwise it idles without
    /// advancing timers, matching the RUN/STOP/PAUSE semantics in §4.5.
    pub fn spawn(
        store: Arc<DeviceStore>,
        remote: Arc<RemoteState>,
        programs: Arc<Mutex<Vec<Vec<Instruction>>>>,
        interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut state = EngineState::new();
            let interval = if interval.is_zero() { DEFAULT_SCAN_INTERVAL } else { interval };
            while !stop_clone.load(Ordering::Relaxed) {
                let scan_start = Instant::now();
                if remote.is_running() {
                    state.tick_timers(&store, scan_start);
                    let programs = programs.lock().unwrap();
                    for program in programs.iter() {
                        ladder::run_program(program, &store, &mut state, scan_start);
                    }
                }
                let elapsed = scan_start.elapsed();
                let sleep_for = interval.saturating_sub(elapsed);
                if !sleep_for.is_zero() {
                    std::thread::sleep(sleep_for);
                }
            }
        });
        LadderEngine { stop, handle: Some(handle) }
    }

    /// Signal the scan thread to stop and join it with a short timeout.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LadderEngine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_store::Series;
    use crate::ladder::DeviceRef;
    use mc_proto::DeviceType::{X, Y};

    #[test]
    fn engine_runs_loaded_program_while_running() {
        let store = Arc::new(DeviceStore::new(Series::Q));
        let remote = Arc::new(RemoteState::new());
        remote.run();
        let program = vec![Instruction::Ld(DeviceRef::new(X, 0)), Instruction::Out(DeviceRef::new(Y, 0))];
        let programs = Arc::new(Mutex::new(vec![program]));
        store.set_bit(X, 0, true).unwrap();

        let engine = LadderEngine::spawn(store.clone(), remote, programs, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(50));
        engine.stop();

        assert!(store.get_bit(Y, 0));
    }

    #[test]
    fn engine_idles_while_stopped() {
        let store = Arc::new(DeviceStore::new(Series::Q));
        let remote = Arc::new(RemoteState::new());
        let program = vec![Instruction::Ld(DeviceRef::new(X, 0)), Instruction::Out(DeviceRef::new(Y, 0))];
        let programs = Arc::new(Mutex::new(vec![program]));
        store.set_bit(X, 0, true).unwrap();

        let engine = LadderEngine::spawn(store.clone(), remote, programs, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(30));
        engine.stop();

        assert!(!store.get_bit(Y, 0));
    }
}
