//! The executor: device queue ownership and kernel launch machinery.
//!
//! An [`Executor`] pairs one in-order device queue with a work-group-size
//! policy. It is stateless with respect to any single operation; views and
//! trees are created fresh per call, consumed once, and discarded.
//!
//! `execute` evaluates a point-wise [`Statement`] by fanning logical
//! indices across work-groups; the reduction engine routes its phases
//! through the same launch machinery. All launches are asynchronous: the
//! returned [`Event`] is the only place the caller can block.

use crate::buffer::DeviceBuffer;
use crate::expr::Statement;
use crate::queue::{DeviceQueue, Event};
use crate::{BlasError, Result, Scalar, DEFAULT_WORK_GROUP_SIZE};
use rayon::prelude::*;
use std::sync::mpsc::channel;
use std::sync::Arc;

fn policy_work_group_size() -> usize {
    match std::env::var("QUEUED_BLAS_WG_SIZE") {
        Ok(v) => v
            .parse()
            .ok()
            .filter(|&wg| wg > 0)
            .unwrap_or(DEFAULT_WORK_GROUP_SIZE),
        Err(_) => DEFAULT_WORK_GROUP_SIZE,
    }
}

/// Device-queue-owning evaluator of operation trees.
pub struct Executor {
    queue: DeviceQueue,
    work_group_size: usize,
}

impl Executor {
    /// Create an executor with the policy work-group size
    /// (`QUEUED_BLAS_WG_SIZE` environment override, else
    /// [`DEFAULT_WORK_GROUP_SIZE`]).
    pub fn new() -> Self {
        Self {
            queue: DeviceQueue::new(),
            work_group_size: policy_work_group_size(),
        }
    }

    /// Create an executor with an explicit work-group size.
    pub fn with_work_group_size(work_group_size: usize) -> Result<Self> {
        if work_group_size == 0 {
            return Err(BlasError::ZeroWorkGroup);
        }
        Ok(Self {
            queue: DeviceQueue::new(),
            work_group_size,
        })
    }

    /// The configured work-group size.
    pub fn work_group_size(&self) -> usize {
        self.work_group_size
    }

    /// Enqueue a point-wise assignment tree with the policy geometry.
    ///
    /// Shape mismatches are raised here, before submission; the launch
    /// itself is asynchronous. Every output element is written exactly
    /// once.
    pub fn execute<T: Scalar>(&self, statement: Statement<T>) -> Result<Event> {
        self.execute_with(statement, self.work_group_size)
    }

    /// Enqueue a point-wise assignment tree with an explicit work-group
    /// size.
    pub fn execute_with<T: Scalar>(
        &self,
        statement: Statement<T>,
        local_size: usize,
    ) -> Result<Event> {
        if local_size == 0 {
            return Err(BlasError::ZeroWorkGroup);
        }
        let n = statement.validate()?;
        self.submit_task(move || {
            let n_groups = n.div_ceil(local_size);
            (0..n_groups).into_par_iter().for_each(|g| {
                let start = g * local_size;
                let end = (start + local_size).min(n);
                for i in start..end {
                    unsafe { statement.eval_at(i) };
                }
            });
            Ok(())
        })
    }

    /// Enqueue one launch of `n_groups` work-groups running `kernel`.
    ///
    /// The reduction engine and the GEMV strategies route their partial
    /// phases through here so that every launch obeys the same queue
    /// ordering.
    pub(crate) fn launch<F>(&self, n_groups: usize, kernel: F) -> Result<Event>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.submit_task(move || {
            (0..n_groups).into_par_iter().for_each(|g| kernel(g));
            Ok(())
        })
    }

    /// Synchronously transfer a device buffer back to the host.
    ///
    /// The read runs as a queue task, so it observes every previously
    /// submitted launch.
    pub fn copy_to_host<E: Copy + Send + Sync + 'static>(
        &self,
        buf: &Arc<DeviceBuffer<E>>,
    ) -> Result<Vec<E>> {
        let (tx, rx) = channel();
        let buf = Arc::clone(buf);
        let event = self.submit_task(move || {
            let data = unsafe { buf.read_all() };
            let _ = tx.send(data);
            Ok(())
        })?;
        event.wait()?;
        rx.recv()
            .map_err(|_| BlasError::Device("device-to-host transfer lost".into()))
    }

    pub(crate) fn submit_task<F>(&self, task: F) -> Result<Event>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.queue.submit(Box::new(task))
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
