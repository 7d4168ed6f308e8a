//! Pool ownership and thread-safe load control.
//!
//! The controller is the sole mutator of shared state. Workers only ever read
//! snapshots of their slot's load and the global kernel selection, so
//! per-slot mutations need no exclusivity against each other, only against an
//! in-progress resize. Resize and shutdown take the pool write lock, which
//! guarantees no reader observes a half-replaced pool.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::{LoadError, Result};
use crate::kernels::ComputeKernel;
use crate::worker::{worker_loop, WorkerShared};

/// Bounded wait per worker during resize and shutdown. A worker that misses
/// the bound is abandoned; process exit reclaims it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One pool position. The slot index is its position in the vector, stable
/// only until the next resize.
#[derive(Debug)]
struct WorkerSlot {
    /// Target load fraction in `[0.0, 1.0]`, stored as `f64` bits.
    load: Arc<AtomicU64>,
    /// One-shot stop signal. Never reset; stopped slots are discarded.
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerSlot {
    fn spawn(kernel: Arc<AtomicU8>) -> WorkerSlot {
        let load = Arc::new(AtomicU64::new(0.0f64.to_bits()));
        let stop = Arc::new(AtomicBool::new(false));
        let shared = WorkerShared {
            load: load.clone(),
            stop: stop.clone(),
            kernel,
        };
        let handle = thread::spawn(move || worker_loop(shared));
        WorkerSlot {
            load,
            stop,
            handle: Some(handle),
        }
    }

    fn load_percent(&self) -> f64 {
        f64::from_bits(self.load.load(Ordering::SeqCst)) * 100.0
    }

    fn set_load_percent(&self, percent: f64) {
        self.load
            .store((percent / 100.0).to_bits(), Ordering::SeqCst);
    }
}

/// Owns the worker pool and exposes every control operation. Safe to share
/// behind an `Arc` and call from any thread.
#[derive(Debug)]
pub struct LoadController {
    slots: RwLock<Vec<WorkerSlot>>,
    kernel: Arc<AtomicU8>,
}

impl LoadController {
    /// Creates a pool of `num_threads` workers, all at zero load.
    pub fn new(num_threads: usize, kernel: ComputeKernel) -> Result<LoadController> {
        if num_threads == 0 {
            return Err(LoadError::InvalidArgument(
                "number of threads must be positive".to_string(),
            ));
        }
        Ok(Self::spawn_pool(num_threads, kernel))
    }

    /// Creates a pool sized to the number of available processing units.
    pub fn with_default_size(kernel: ComputeKernel) -> LoadController {
        Self::spawn_pool(num_cpus::get().max(1), kernel)
    }

    fn spawn_pool(num_threads: usize, kernel: ComputeKernel) -> LoadController {
        let kernel = Arc::new(AtomicU8::new(kernel as u8));
        let slots = (0..num_threads)
            .map(|_| WorkerSlot::spawn(kernel.clone()))
            .collect();
        info!(
            "started load controller with {} worker threads ({} kernel)",
            num_threads,
            ComputeKernel::from_u8(kernel.load(Ordering::SeqCst))
        );
        LoadController {
            slots: RwLock::new(slots),
            kernel,
        }
    }

    /// Sets the target load for one slot, as a percentage in `[0, 100]`.
    /// Takes effect on the worker's next duty-cycle read.
    pub fn set_thread_load(&self, index: usize, percent: f64) -> Result<()> {
        let slots = self.slots.read().unwrap();
        let slot = slots.get(index).ok_or_else(|| {
            LoadError::OutOfRange(format!(
                "thread id must be between 0 and {}",
                slots.len().saturating_sub(1)
            ))
        })?;
        validate_percent(percent)?;
        slot.set_load_percent(percent);
        Ok(())
    }

    /// Sets the same target load on every current slot.
    pub fn set_all_loads(&self, percent: f64) -> Result<()> {
        validate_percent(percent)?;
        let slots = self.slots.read().unwrap();
        for slot in slots.iter() {
            slot.set_load_percent(percent);
        }
        Ok(())
    }

    /// Returns the last-set target load for one slot, as a percentage. This
    /// is the configured target, not measured CPU usage.
    pub fn get_thread_load(&self, index: usize) -> Result<f64> {
        let slots = self.slots.read().unwrap();
        let slot = slots.get(index).ok_or_else(|| {
            LoadError::OutOfRange(format!(
                "thread id must be between 0 and {}",
                slots.len().saturating_sub(1)
            ))
        })?;
        Ok(slot.load_percent())
    }

    /// Returns every slot's target load percentage, indexed by slot.
    pub fn get_all_loads(&self) -> Vec<f64> {
        let slots = self.slots.read().unwrap();
        slots.iter().map(|slot| slot.load_percent()).collect()
    }

    pub fn get_num_threads(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    /// Replaces the whole pool with `num_threads` fresh slots at zero load.
    ///
    /// This is a destructive reset: previously set per-slot loads are
    /// discarded, not carried over. Old workers are signaled to stop and
    /// joined before the new pool is spawned; by the time this returns, the
    /// exposed size and the slot collection agree.
    pub fn set_num_threads(&self, num_threads: usize) -> Result<()> {
        if num_threads == 0 {
            return Err(LoadError::InvalidArgument(
                "number of threads must be positive".to_string(),
            ));
        }

        let mut slots = self.slots.write().unwrap();
        let old = std::mem::take(&mut *slots);
        let old_len = old.len();
        stop_and_join(old);

        *slots = (0..num_threads)
            .map(|_| WorkerSlot::spawn(self.kernel.clone()))
            .collect();
        info!("resized worker pool from {} to {}", old_len, num_threads);
        Ok(())
    }

    /// Selects the kernel every worker runs during its busy phase, effective
    /// on each worker's next cycle. Unknown kernel names are rejected by
    /// `ComputeKernel::from_str` before they reach this call.
    pub fn set_kernel(&self, kernel: ComputeKernel) {
        self.kernel.store(kernel as u8, Ordering::SeqCst);
    }

    pub fn get_kernel(&self) -> ComputeKernel {
        ComputeKernel::from_u8(self.kernel.load(Ordering::SeqCst))
    }

    /// Signals every worker to stop and waits with a bounded per-thread
    /// timeout. Stragglers are logged and abandoned; process exit reclaims
    /// them. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut slots = self.slots.write().unwrap();
        let old = std::mem::take(&mut *slots);
        if old.is_empty() {
            return;
        }
        info!("stopping {} worker threads", old.len());
        stop_and_join(old);
    }
}

impl Drop for LoadController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_percent(percent: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(LoadError::InvalidArgument(
            "load percent must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

/// Signals every slot first, then joins each within `JOIN_TIMEOUT`, so all
/// workers wind down concurrently.
fn stop_and_join(slots: Vec<WorkerSlot>) {
    for slot in &slots {
        slot.stop.store(true, Ordering::SeqCst);
    }
    for (index, mut slot) in slots.into_iter().enumerate() {
        if let Some(handle) = slot.handle.take() {
            if !join_with_timeout(handle, JOIN_TIMEOUT) {
                warn!(
                    "worker {} did not stop within {:?}, abandoning it",
                    index, JOIN_TIMEOUT
                );
            }
        }
    }
}

/// Best-effort bounded join. Returns `false` if the thread was abandoned.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected_at_construction() {
        let err = LoadController::new(0, ComputeKernel::BusyWait).unwrap_err();
        assert!(matches!(err, LoadError::InvalidArgument(_)));
    }

    #[test]
    fn shutdown_drains_the_pool_and_is_idempotent() {
        let controller = LoadController::new(3, ComputeKernel::BusyWait).unwrap();
        controller.set_all_loads(100.0).unwrap();

        let start = Instant::now();
        controller.shutdown();
        assert!(start.elapsed() < Duration::from_secs(7));
        assert_eq!(controller.get_num_threads(), 0);

        // Second call finds nothing to stop.
        controller.shutdown();
    }

    #[test]
    fn resize_joins_old_workers_before_returning() {
        let controller = LoadController::new(2, ComputeKernel::BusyWait).unwrap();
        controller.set_all_loads(100.0).unwrap();

        controller.set_num_threads(1).unwrap();

        // The write lock was released with the new pool fully in place.
        assert_eq!(controller.get_num_threads(), 1);
        assert_eq!(controller.get_all_loads(), vec![0.0]);
        controller.shutdown();
    }
}
