use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::{debug, warn};
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};

use crate::error::Error;

// Upper bound on how long a stop request can go unnoticed by a sleeping worker.
const STOP_SLICE: Duration = Duration::from_millis(10);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    Normal,
    Elevated,
    RealTime,
}
impl Priority {
    fn thread_priority(self) -> Option<ThreadPriority> {
        match self {
            Priority::Normal => None,
            Priority::Elevated => ThreadPriorityValue::try_from(75u8)
                .ok()
                .map(ThreadPriority::Crossplatform),
            Priority::RealTime => Some(ThreadPriority::Max),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);
impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleeps for `duration`, waking early if a stop is requested.
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            spin_sleep::sleep((deadline - now).min(STOP_SLICE));
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    StopRequested,
    Stopped,
}

/// A named thread that can be asked to stop and joined with a bound.
///
/// The thread drops its end of a completion channel as its very last act, so
/// `join_timeout` can wait with a deadline and only calls the blocking
/// `JoinHandle::join` once the thread is known to be done.
pub struct Worker<T> {
    name: String,
    priority: Priority,
    stop: StopToken,
    done: Receiver<()>,
    handle: Option<JoinHandle<T>>,
}
impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: impl Into<String>, priority: Priority, body: F) -> Result<Self, Error>
    where
        F: FnOnce(StopToken) -> T + Send + 'static,
    {
        let name = name.into();
        let stop = StopToken::new();
        let (done_tx, done) = channel::bounded::<()>(1);

        let thread_stop = stop.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _done = done_tx;
            apply_priority(&thread_name, priority);
            body(thread_stop)
        })?;
        debug!("started {name} ({priority:?})");

        Ok(Self {
            name,
            priority,
            stop,
            done,
            handle: Some(handle),
        })
    }
}
impl<T> Worker<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> WorkerState {
        let finished = self.handle.as_ref().map_or(true, |h| h.is_finished());
        if finished {
            WorkerState::Stopped
        } else if self.stop.is_requested() {
            WorkerState::StopRequested
        } else {
            WorkerState::Running
        }
    }

    pub fn request_stop(&self) {
        self.stop.request();
    }

    /// Waits at most `timeout` for the thread to exit and returns what it
    /// produced. Does not request a stop by itself.
    pub fn join_timeout(mut self, timeout: Duration) -> Result<T, Error> {
        if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(timeout) {
            return Err(Error::ShutdownTimeout {
                component: self.name.clone(),
                waited: timeout,
            });
        }
        let handle = self.handle.take().ok_or_else(|| Error::WorkerPanicked {
            component: self.name.clone(),
        })?;
        let value = handle.join().map_err(|_| Error::WorkerPanicked {
            component: self.name.clone(),
        })?;
        debug!("{} stopped", self.name);
        Ok(value)
    }

    pub fn stop(self, timeout: Duration) -> Result<T, Error> {
        self.request_stop();
        self.join_timeout(timeout)
    }
}
impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        // A handle that was never joined still gets told to wind down.
        if self.handle.is_some() {
            self.stop.request();
        }
    }
}

fn apply_priority(name: &str, priority: Priority) {
    let Some(level) = priority.thread_priority() else {
        return;
    };
    if let Err(err) = set_current_thread_priority(level) {
        warn!("{name}: could not raise scheduling priority to {priority:?}: {err:?}");
    }
}
