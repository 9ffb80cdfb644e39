//! The in-order device work queue and its completion events.
//!
//! One worker thread drains submitted kernels in submission order. That
//! single invariant carries the whole dependency model: launches whose
//! views alias the same buffer are serialized by construction, and the
//! combine phase of a reduction can never observe an unfinished partial.

use crate::{BlasError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub(crate) type TaskFn = Box<dyn FnOnce() -> Result<()> + Send>;

struct Task {
    run: TaskFn,
    event: Arc<EventCore>,
}

struct EventCore {
    state: Mutex<Option<Result<()>>>,
    cvar: Condvar,
}

impl EventCore {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
            cvar: Condvar::new(),
        }
    }

    fn finish(&self, outcome: Result<()>) {
        if let Ok(mut state) = self.state.lock() {
            *state = Some(outcome);
        }
        self.cvar.notify_all();
    }
}

/// Completion handle for an enqueued kernel launch.
///
/// Cheap to clone; [`Event::wait`] is the only blocking operation in the
/// crate and is where fatal device failures surface.
#[derive(Clone)]
pub struct Event {
    core: Arc<EventCore>,
}

impl Event {
    /// Block until the launch completes, propagating device failures.
    pub fn wait(&self) -> Result<()> {
        let mut state = self
            .core
            .state
            .lock()
            .map_err(|_| BlasError::Device("event state poisoned".into()))?;
        loop {
            if let Some(outcome) = state.as_ref() {
                return outcome.clone();
            }
            state = self
                .core
                .cvar
                .wait(state)
                .map_err(|_| BlasError::Device("event state poisoned".into()))?;
        }
    }

    /// Whether the launch already finished (without blocking).
    pub fn is_complete(&self) -> bool {
        self.core
            .state
            .lock()
            .map(|state| state.is_some())
            .unwrap_or(false)
    }
}

pub(crate) struct DeviceQueue {
    tx: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl DeviceQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::<Task>();
        let worker = std::thread::spawn(move || {
            while let Ok(task) = rx.recv() {
                let outcome = match catch_unwind(AssertUnwindSafe(task.run)) {
                    Ok(result) => result,
                    Err(_) => Err(BlasError::Device("kernel panicked on device queue".into())),
                };
                task.event.finish(outcome);
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Enqueue a kernel; returns immediately with its completion handle.
    pub(crate) fn submit(&self, run: TaskFn) -> Result<Event> {
        let core = Arc::new(EventCore::new());
        let event = Event {
            core: Arc::clone(&core),
        };
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BlasError::Device("device queue is shut down".into()))?;
        tx.send(Task { run, event: core })
            .map_err(|_| BlasError::Device("device queue worker is gone".into()))?;
        Ok(event)
    }
}

impl Drop for DeviceQueue {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
