//! Duty-cycle worker loop.
//!
//! Each worker splits a fixed 100 ms period into a busy phase and an idle
//! phase whose ratio is the slot's target load. Load and kernel are
//! re-snapshotted at the top of every cycle, so controller mutations take
//! effect within roughly one period without any direct coupling.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::kernels::{self, ComputeKernel};

/// Fixed duty-cycle period. Large enough to amortize clock and atomic
/// overhead, small enough for load changes to land within ~one cycle.
pub(crate) const CYCLE: Duration = Duration::from_millis(100);

// Remainders shorter than this are not worth a sleep syscall.
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// State shared between one worker thread and the controller. The controller
/// is the sole writer; the worker only reads snapshots.
pub(crate) struct WorkerShared {
    /// Target load as `f64` bits, fraction in `[0.0, 1.0]`.
    pub load: Arc<AtomicU64>,
    /// One-shot stop signal, never reset.
    pub stop: Arc<AtomicBool>,
    /// Pool-global kernel selection, encoded via `ComputeKernel as u8`.
    pub kernel: Arc<AtomicU8>,
}

impl WorkerShared {
    pub(crate) fn target_load(&self) -> f64 {
        f64::from_bits(self.load.load(Ordering::SeqCst))
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Runs duty cycles until the stop signal is observed. Terminal: a stopped
/// worker is discarded by the controller, never resumed.
pub(crate) fn worker_loop(shared: WorkerShared) {
    while !shared.stopped() {
        let cycle_start = Instant::now();
        let load = shared.target_load();
        let kernel = ComputeKernel::from_u8(shared.kernel.load(Ordering::SeqCst));

        if load <= 0.0 {
            // Pure idle, zero CPU contribution.
            thread::sleep(CYCLE);
        } else if load >= 1.0 {
            // No idle phase, continuous kernel execution.
            kernels::run(kernel, cycle_start + CYCLE);
        } else {
            kernels::run(kernel, cycle_start + CYCLE.mul_f64(load));

            // Kernel overshoot eats into the idle phase; it is accepted as
            // bounded jitter rather than corrected.
            let idle = CYCLE.saturating_sub(cycle_start.elapsed());
            if idle >= MIN_SLEEP {
                // Re-check before sleeping so shutdown latency is bounded by
                // one sleep interval, not one full duty cycle.
                if shared.stopped() {
                    break;
                }
                thread::sleep(idle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(load: f64, kernel: ComputeKernel) -> (WorkerShared, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        let shared = WorkerShared {
            load: Arc::new(AtomicU64::new(load.to_bits())),
            stop: stop.clone(),
            kernel: Arc::new(AtomicU8::new(kernel as u8)),
        };
        (shared, stop)
    }

    #[test]
    fn worker_exits_promptly_after_stop() {
        let (worker_shared, stop) = shared(0.5, ComputeKernel::BusyWait);
        let handle = thread::spawn(move || worker_loop(worker_shared));

        thread::sleep(CYCLE * 3);
        stop.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished(), "worker still running 2s after stop");
        handle.join().unwrap();
    }

    #[test]
    fn idle_worker_observes_stop_within_one_period() {
        let (worker_shared, stop) = shared(0.0, ComputeKernel::BusyWait);
        let handle = thread::spawn(move || worker_loop(worker_shared));

        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);

        let start = Instant::now();
        handle.join().unwrap();
        assert!(
            start.elapsed() < CYCLE + Duration::from_millis(500),
            "idle worker took {:?} to stop",
            start.elapsed()
        );
    }

    #[test]
    fn load_snapshot_reads_latest_value() {
        let (worker_shared, _stop) = shared(0.25, ComputeKernel::BusyWait);
        assert_eq!(worker_shared.target_load(), 0.25);
        worker_shared.load.store(0.75f64.to_bits(), Ordering::SeqCst);
        assert_eq!(worker_shared.target_load(), 0.75);
    }
}
