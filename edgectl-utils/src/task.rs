//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task;
use tokio::time::{self, Instant};
use tracing::error;

/// A handle which can be used to manipulate the task created by
/// [`Task::spawn`] and [`Task::spawn_blocking`].
///
/// Dropping this handle cancels the task unless [`Task::detach`] was called.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// A handle which can be used to manipulate the interval task created by
/// [`IntervalTask::new`].
///
/// Dropping this handle cancels the interval task.
#[derive(Debug)]
pub struct IntervalTask {
    _task: Task<()>,
    control: UnboundedSender<Message>,
    next: Arc<Mutex<Instant>>,
}

/// A handle which can be used to manipulate the one-shot timeout task
/// created by [`TimeoutTask::new`].
#[derive(Debug)]
pub struct TimeoutTask {
    _task: Task<()>,
    control: UnboundedSender<Message>,
    next: Arc<Mutex<Instant>>,
}

#[derive(Debug)]
enum Message {
    Reset(Option<Duration>),
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Spawns a supervised task that automatically restarts if it panics.
    ///
    /// Used for long-running loops (monitor ticks, the stitcher, the
    /// heartbeat checker) that must not bring down the orchestrator if a
    /// single iteration panics on malformed input.
    pub fn spawn_supervised<F, Fut>(spawn_fn: F) -> Task<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let join_handle = tokio::spawn(async move {
            loop {
                let worker = Task::spawn(spawn_fn());
                match worker.await {
                    Ok(()) => break,
                    Err(error) if error.is_panic() => {
                        error!("task panicked, restarting");
                        continue;
                    }
                    Err(error) => {
                        error!(%error, "task failed");
                        break;
                    }
                }
            }
        });
        Task {
            join_handle,
            detached: false,
        }
    }

    /// Runs the provided closure on a thread where blocking is acceptable.
    pub fn spawn_blocking<F>(f: F) -> Task<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn_blocking(f),
            detached: false,
        }
    }

    /// Detaches the task so it keeps running after this handle is dropped.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a task that calls `cb` every time `interval` elapses.
    ///
    /// `tick_on_start` controls whether the first invocation happens
    /// immediately or only after the first full interval (the stitcher and
    /// heartbeat loops tick immediately; the monitor loops wait one period
    /// before their first reading so counters have a baseline sample).
    pub fn new<F, Fut>(interval: Duration, tick_on_start: bool, mut cb: F) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Arc::new(Mutex::new(Instant::now() + interval));
        let next_child = next.clone();

        let task = Task::spawn(async move {
            let mut interval_fut = if tick_on_start {
                time::interval(interval)
            } else {
                time::interval_at(Instant::now() + interval, interval)
            };

            loop {
                tokio::select! {
                    _ = interval_fut.tick() => {
                        *next_child.lock().unwrap() = Instant::now() + interval;
                        (cb)().await;
                    }
                    message = control_rx.recv() => {
                        match message {
                            Some(Message::Reset(None)) => {
                                interval_fut = time::interval(interval);
                                *next_child.lock().unwrap() = Instant::now() + interval;
                            }
                            Some(Message::Reset(Some(new_interval))) => {
                                interval_fut = time::interval(new_interval);
                                *next_child.lock().unwrap() = Instant::now() + new_interval;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        IntervalTask {
            _task: task,
            control: control_tx,
            next,
        }
    }

    /// Resets the interval; reuses the last interval value if none is given.
    pub fn reset(&mut self, interval: Option<Duration>) {
        if self.control.send(Message::Reset(interval)).is_err() {
            error!("failed to reset interval task");
        }
    }

    /// Returns the time remaining before the next tick.
    pub fn remaining(&self) -> Duration {
        let next = self.next.lock().unwrap();
        next.saturating_duration_since(Instant::now())
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a task that calls `cb` once, after `timeout` elapses, unless
    /// reset or dropped first.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Arc::new(Mutex::new(Instant::now() + timeout));
        let next_child = next.clone();

        let task = Task::spawn(async move {
            let sleep = time::sleep(timeout);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => {
                        (cb)().await;
                        break;
                    }
                    message = control_rx.recv() => {
                        match message {
                            Some(Message::Reset(None)) => {
                                let next = Instant::now() + timeout;
                                sleep.as_mut().reset(next);
                                *next_child.lock().unwrap() = next;
                            }
                            Some(Message::Reset(Some(new_timeout))) => {
                                let next = Instant::now() + new_timeout;
                                sleep.as_mut().reset(next);
                                *next_child.lock().unwrap() = next;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        TimeoutTask {
            _task: task,
            control: control_tx,
            next,
        }
    }

    /// Resets the timeout, regardless of whether it already fired.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        if self.control.send(Message::Reset(timeout)).is_err() {
            error!("failed to reset timeout task");
        }
    }

    /// Returns the time remaining before the timeout fires.
    pub fn remaining(&self) -> Duration {
        let next = self.next.lock().unwrap();
        next.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interval_task_ticks_repeatedly() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = count.clone();
        let _task = IntervalTask::new(Duration::from_millis(10), true, move || {
            let count = count_cb.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::advance(Duration::from_millis(35)).await;
        // Let the spawned task observe the advanced clock.
        tokio::task::yield_now().await;
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_task_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = count.clone();
        let _task = TimeoutTask::new(Duration::from_millis(10), move || {
            let count = count_cb.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
