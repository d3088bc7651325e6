//! Device-Slot Scheduler
//!
//! Distributes a queue of tasks across a fixed pool of device ids with
//! bounded retry-and-requeue.
//!
//! # Contract (both backends)
//! - Tasks are popped from the front of a FIFO queue.
//! - Each popped task takes the next device round-robin; the cursor advances
//!   by exactly one per pop, retries included.
//! - `TaskError::Retryable` increments the task's attempt counter. Past
//!   `max_retries` the whole dispatch fails; otherwise the task goes to the
//!   back of the queue.
//! - `TaskError::Fatal` fails the whole dispatch immediately.
//! - Failure returns no partial results.
//!
//! # Backends
//! - [`DeviceScheduler::dispatch`]: one task at a time on the calling thread.
//! - [`DeviceScheduler::dispatch_pooled`]: one concurrent worker per device
//!   slot. A popped task waits for its own device's slot rather than taking
//!   whichever slot frees first, so assignment stays round-robin over
//!   dispatch attempts.

use duet_common::config::DispatchMode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Opaque execution-unit label
pub type DeviceId = u32;

/// Failure reported by a worker
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Transient; the task may be requeued
    #[error("retryable failure: {0}")]
    Retryable(String),

    /// Permanent; the dispatch stops
    #[error("{0}")]
    Fatal(String),
}

/// Fatal dispatch outcome
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("At least one device id is required")]
    NoDevices,

    #[error("Task {task} failed on device {device}: {message}")]
    Fatal {
        task: String,
        device: DeviceId,
        message: String,
    },

    #[error("Task {task} exhausted its retry budget ({attempts} failed attempts, max_retries = {max_retries}): {message}")]
    RetriesExhausted {
        task: String,
        attempts: u32,
        max_retries: u32,
        message: String,
    },

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Work unit scheduled onto a device
#[derive(Debug)]
pub struct Task<P> {
    /// Submission position, stable across retries
    pub index: usize,
    pub name: String,
    pub payload: P,
    attempts: AtomicU32,
}

impl<P> Task<P> {
    pub fn new(index: usize, name: impl Into<String>, payload: P) -> Self {
        Self {
            index,
            name: name.into(),
            payload,
            attempts: AtomicU32::new(0),
        }
    }

    /// Failed attempts so far (0 on first execution)
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record_failure(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A completed task with the device it ran on and the worker's result
#[derive(Debug)]
pub struct Dispatched<P, R> {
    pub task: Arc<Task<P>>,
    pub device: DeviceId,
    pub result: R,
}

/// Round-robin allocator over the device pool
#[derive(Debug, Clone)]
pub struct DeviceRoundRobin {
    devices: Vec<DeviceId>,
    next: usize,
}

impl DeviceRoundRobin {
    fn new(devices: &[DeviceId]) -> Self {
        Self {
            devices: devices.to_vec(),
            next: 0,
        }
    }

    /// Slot index and device id for the next dispatch attempt
    pub fn next_slot(&mut self) -> (usize, DeviceId) {
        let slot = self.next;
        self.next = (self.next + 1) % self.devices.len();
        (slot, self.devices[slot])
    }
}

/// Round-robin scheduler with retry semantics
#[derive(Debug, Clone)]
pub struct DeviceScheduler {
    devices: Vec<DeviceId>,
    max_retries: u32,
}

impl DeviceScheduler {
    pub fn new(devices: Vec<DeviceId>, max_retries: u32) -> Result<Self, DispatchError> {
        if devices.is_empty() {
            return Err(DispatchError::NoDevices);
        }
        Ok(Self {
            devices,
            max_retries,
        })
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `tasks` one at a time, distributing across devices
    ///
    /// Returns `(task, device, result)` triples in completion order.
    pub fn dispatch<P, R, W>(
        &self,
        tasks: impl IntoIterator<Item = Task<P>>,
        worker: W,
    ) -> Result<Vec<Dispatched<P, R>>, DispatchError>
    where
        W: FnMut(&Task<P>, DeviceId) -> Result<R, TaskError>,
    {
        self.dispatch_sequential(tasks, worker, None)
    }

    /// [`dispatch`](Self::dispatch) that stops between tasks once `cancel` fires
    pub fn dispatch_cancellable<P, R, W>(
        &self,
        tasks: impl IntoIterator<Item = Task<P>>,
        worker: W,
        cancel: &CancellationToken,
    ) -> Result<Vec<Dispatched<P, R>>, DispatchError>
    where
        W: FnMut(&Task<P>, DeviceId) -> Result<R, TaskError>,
    {
        self.dispatch_sequential(tasks, worker, Some(cancel))
    }

    fn dispatch_sequential<P, R, W>(
        &self,
        tasks: impl IntoIterator<Item = Task<P>>,
        mut worker: W,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Dispatched<P, R>>, DispatchError>
    where
        W: FnMut(&Task<P>, DeviceId) -> Result<R, TaskError>,
    {
        let mut queue: VecDeque<Arc<Task<P>>> = tasks.into_iter().map(Arc::new).collect();
        let mut cursor = DeviceRoundRobin::new(&self.devices);
        let mut results = Vec::with_capacity(queue.len());

        while let Some(task) = queue.pop_front() {
            if cancel.map(CancellationToken::is_cancelled).unwrap_or(false) {
                return Err(DispatchError::Cancelled);
            }
            let (_, device) = cursor.next_slot();
            debug!(task = %task.name, device, attempt = task.attempts(), "Dispatching task");

            match worker(&*task, device) {
                Ok(result) => results.push(Dispatched {
                    task,
                    device,
                    result,
                }),
                Err(err) => {
                    self.handle_failure(&task, device, err)?;
                    queue.push_back(task);
                }
            }
        }
        Ok(results)
    }

    /// Run `tasks` on a bounded pool with one worker per device slot
    ///
    /// Workers run on the blocking thread pool. On any fatal outcome, or
    /// when `cancel` fires, no new task starts, queued blocking tasks that
    /// have not begun are skipped, and no results are returned.
    ///
    /// A worker that is already running cannot be interrupted: the call
    /// returns only after it finishes, so no work outlives the dispatch.
    /// Long-running workers should be split into smaller tasks.
    pub async fn dispatch_pooled<P, R, W>(
        &self,
        tasks: impl IntoIterator<Item = Task<P>>,
        worker: W,
        cancel: &CancellationToken,
    ) -> Result<Vec<Dispatched<P, R>>, DispatchError>
    where
        P: Send + Sync + 'static,
        R: Send + 'static,
        W: Fn(&Task<P>, DeviceId) -> Result<R, TaskError> + Send + Sync + 'static,
    {
        let worker = Arc::new(worker);
        let slots: Vec<Arc<Semaphore>> = self
            .devices
            .iter()
            .map(|_| Arc::new(Semaphore::new(1)))
            .collect();
        let abort = cancel.child_token();

        let mut queue: VecDeque<Arc<Task<P>>> = tasks.into_iter().map(Arc::new).collect();
        let mut cursor = DeviceRoundRobin::new(&self.devices);
        let mut in_flight: JoinSet<Completion<P, R>> = JoinSet::new();
        let mut results = Vec::with_capacity(queue.len());

        let outcome: Result<(), DispatchError> = 'dispatch: loop {
            let Some(task) = queue.pop_front() else {
                if in_flight.is_empty() {
                    break Ok(());
                }
                // Queue drained but retries may still come back from in-flight work
                tokio::select! {
                    biased;
                    _ = abort.cancelled() => break Err(DispatchError::Cancelled),
                    Some(joined) = in_flight.join_next() => {
                        if let Err(err) = self.settle(joined, &abort, &mut queue, &mut results) {
                            break Err(err);
                        }
                    }
                }
                continue;
            };

            let (slot, device) = cursor.next_slot();
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = abort.cancelled() => break 'dispatch Err(DispatchError::Cancelled),
                    // Settle finished work first so a failure stops new dispatches
                    Some(joined) = in_flight.join_next() => {
                        if let Err(err) = self.settle(joined, &abort, &mut queue, &mut results) {
                            break 'dispatch Err(err);
                        }
                    }
                    permit = Arc::clone(&slots[slot]).acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => break 'dispatch Err(DispatchError::Cancelled),
                    },
                }
            };

            debug!(task = %task.name, device, attempt = task.attempts(), "Dispatching task to pool");
            let worker = Arc::clone(&worker);
            let token = abort.clone();
            in_flight.spawn_blocking(move || {
                let _permit = permit;
                let result = if token.is_cancelled() {
                    Err(TaskError::Fatal("cancelled before start".to_string()))
                } else {
                    worker(&*task, device)
                };
                (task, device, result)
            });
        };

        match outcome {
            Ok(()) => Ok(results),
            Err(err) => {
                abort.cancel();
                // Drops tasks not yet started; running blocking work is awaited
                in_flight.abort_all();
                while in_flight.join_next().await.is_some() {}
                Err(err)
            }
        }
    }

    /// Run with the backend selected in configuration
    pub async fn dispatch_with<P, R, W>(
        &self,
        mode: DispatchMode,
        tasks: Vec<Task<P>>,
        worker: W,
        cancel: &CancellationToken,
    ) -> Result<Vec<Dispatched<P, R>>, DispatchError>
    where
        P: Send + Sync + 'static,
        R: Send + 'static,
        W: Fn(&Task<P>, DeviceId) -> Result<R, TaskError> + Send + Sync + 'static,
    {
        match mode {
            DispatchMode::Pooled => self.dispatch_pooled(tasks, worker, cancel).await,
            DispatchMode::Sequential => {
                let scheduler = self.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || {
                    scheduler.dispatch_cancellable(tasks, worker, &cancel)
                })
                .await
                .map_err(|e| DispatchError::WorkerPanicked(e.to_string()))?
            }
        }
    }

    /// Record a finished pooled task: keep its result or requeue it
    fn settle<P, R>(
        &self,
        joined: Result<Completion<P, R>, JoinError>,
        abort: &CancellationToken,
        queue: &mut VecDeque<Arc<Task<P>>>,
        results: &mut Vec<Dispatched<P, R>>,
    ) -> Result<(), DispatchError> {
        let (task, device, outcome) =
            joined.map_err(|e| DispatchError::WorkerPanicked(e.to_string()))?;
        if abort.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        match outcome {
            Ok(result) => {
                results.push(Dispatched {
                    task,
                    device,
                    result,
                });
            }
            Err(err) => {
                self.handle_failure(&task, device, err)?;
                queue.push_back(task);
            }
        }
        Ok(())
    }

    /// Ok means "requeue"; Err ends the dispatch
    fn handle_failure<P>(
        &self,
        task: &Task<P>,
        device: DeviceId,
        err: TaskError,
    ) -> Result<(), DispatchError> {
        match err {
            TaskError::Retryable(message) => {
                let attempts = task.record_failure();
                if attempts > self.max_retries {
                    error!(
                        task = %task.name,
                        device,
                        attempts,
                        max_retries = self.max_retries,
                        "Retry budget exhausted"
                    );
                    return Err(DispatchError::RetriesExhausted {
                        task: task.name.clone(),
                        attempts,
                        max_retries: self.max_retries,
                        message,
                    });
                }
                warn!(
                    task = %task.name,
                    device,
                    attempts,
                    max_retries = self.max_retries,
                    reason = %message,
                    "Task failed, requeued at back of queue"
                );
                Ok(())
            }
            TaskError::Fatal(message) => {
                error!(task = %task.name, device, reason = %message, "Task failed fatally");
                Err(DispatchError::Fatal {
                    task: task.name.clone(),
                    device,
                    message,
                })
            }
        }
    }
}

type Completion<P, R> = (Arc<Task<P>>, DeviceId, Result<R, TaskError>);
