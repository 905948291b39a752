//! Bounded worker pool for per-frame tasks.
//!
//! Tasks run on a dedicated rayon pool. An in-flight counter caps the number
//! of submitted-but-unfinished tasks; when the cap is reached the
//! [`Backpressure`] policy either blocks the submitter or rejects the task.
//! A panicking task is caught and counted; it never takes down the pool or
//! the submitter.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::pipeline::config::Backpressure;
use crate::track_error::TrackError;

#[derive(Debug, Default)]
struct PoolState {
    in_flight: Mutex<usize>,
    idle: Condvar,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

impl PoolState {
    fn finish(&self) {
        let mut n = self.in_flight.lock();
        *n -= 1;
        self.idle.notify_all();
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    state: Arc<PoolState>,
    max_in_flight: usize,
    backpressure: Backpressure,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.pool.current_num_threads())
            .field("max_in_flight", &self.max_in_flight)
            .field("backpressure", &self.backpressure)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl WorkerPool {
    /// `workers == 0` uses rayon's default thread count.
    pub fn new(workers: usize, max_in_flight: usize, backpressure: Backpressure) -> Result<Self, TrackError> {
        if max_in_flight == 0 {
            return Err(TrackError::Config("max_in_flight must be at least 1".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("vortex-worker-{i}"))
            .build()
            .map_err(|e| TrackError::Config(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            pool,
            state: Arc::new(PoolState::default()),
            max_in_flight,
            backpressure,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Schedule a task. Returns `false` if the task was rejected under
    /// [`Backpressure::Drop`].
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut n = self.state.in_flight.lock();
            while *n >= self.max_in_flight {
                match self.backpressure {
                    Backpressure::Block => self.state.idle.wait(&mut n),
                    Backpressure::Drop => return false,
                }
            }
            *n += 1;
        }
        let state = Arc::clone(&self.state);
        self.pool.spawn(move || {
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                state.panicked.fetch_add(1, Ordering::Relaxed);
                log::error!("worker task panicked");
            }
            state.completed.fetch_add(1, Ordering::Relaxed);
            state.finish();
        });
        true
    }

    /// Block until every submitted task has finished.
    pub fn wait_idle(&self) {
        let mut n = self.state.in_flight.lock();
        while *n > 0 {
            self.state.idle.wait(&mut n);
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.state.in_flight.lock()
    }

    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> usize {
        self.state.panicked.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.wait_idle();
    }
}
