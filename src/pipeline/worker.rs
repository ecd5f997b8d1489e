//! Named worker threads with cooperative stop and time-bounded join

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::RecvTimeoutError;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::error::PipelineError;

/// Shared shutdown flag.
///
/// Loops check it once per iteration and use [`StopSignal::wait_timeout`]
/// for any pause, so a stop request ends a sleep immediately.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<StopState>);

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        // Taking the lock orders the store before any waiter re-checks the flag
        let _guard = self.0.lock.lock();
        self.0.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, returning early once stop is requested.
    ///
    /// Returns `true` if stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.0.lock.lock();
        while !self.is_stopped() {
            if self.0.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stopped()
    }
}

/// Handle to a spawned worker thread.
pub struct Worker<R> {
    name: String,
    stop: StopSignal,
    handle: JoinHandle<R>,
    // Disconnects when the thread exits, including by panic
    done: flume::Receiver<()>,
}

impl<R: Send + 'static> Worker<R> {
    /// Spawn `body` on a named thread. The body receives the stop signal.
    pub fn start<F>(name: &str, body: F) -> Result<Self, PipelineError>
    where
        F: FnOnce(StopSignal) -> R + Send + 'static,
    {
        let stop = StopSignal::new();
        let (done_tx, done) = flume::bounded::<()>(1);

        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                body(thread_stop)
            })
            .map_err(|source| PipelineError::Spawn {
                worker: name.to_string(),
                source,
            })?;

        debug!(worker = name, "worker started");
        Ok(Self {
            name: name.to_string(),
            stop,
            handle,
            done,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to exit at its next loop boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_disconnected()
    }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// On timeout the thread is detached and left to finish on its own.
    pub fn join(self, timeout: Duration) -> Result<R, PipelineError> {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    worker = %self.name,
                    ?timeout,
                    "worker did not stop in time, abandoning thread"
                );
                return Err(PipelineError::JoinTimeout {
                    worker: self.name,
                    timeout,
                });
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        }

        self.handle.join().map_err(|_| {
            error!(worker = %self.name, "worker panicked");
            PipelineError::WorkerPanicked { worker: self.name }
        })
    }
}
