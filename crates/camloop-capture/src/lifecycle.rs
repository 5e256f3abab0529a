//! Worker thread lifecycle shared by the pipeline components.
//!
//! Each component runs one dedicated thread. Stop is cooperative through a
//! [`CancelToken`]; joining is bounded through a done-channel so a backend
//! call that never returns cannot hang shutdown.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error, warn};

use camloop_ipc::{ComponentKind, ComponentState, SessionEvent};

/// Errors returned when joining a worker thread.
#[derive(Debug, Error)]
pub enum JoinError {
    /// The worker did not exit within the timeout; it was detached.
    #[error("{name} thread did not stop within {timeout:?}")]
    TimedOut { name: String, timeout: Duration },

    /// The worker panicked.
    #[error("{name} thread panicked")]
    Panicked { name: String },
}

#[derive(Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// Cancellation signal observed by a worker loop.
///
/// Cloning shares the same signal. Once cancelled it stays cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Wait until cancelled or `timeout` elapses. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .condvar
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Lock-free holder for a component's [`ComponentState`].
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new(state: ComponentState) -> Self {
        Self(Arc::new(AtomicU8::new(state.into())))
    }

    pub fn get(&self) -> ComponentState {
        ComponentState::from(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ComponentState) {
        self.0.store(state.into(), Ordering::SeqCst);
    }

    /// Move to `next` only if the current state is `current`.
    pub fn transition(&self, current: ComponentState, next: ComponentState) -> bool {
        self.0
            .compare_exchange(current.into(), next.into(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Publishes component status to the session event channel.
#[derive(Clone)]
pub struct StatusReporter {
    component: ComponentKind,
    events: Option<Sender<SessionEvent>>,
    wake: Option<CancelToken>,
}

impl StatusReporter {
    pub fn new(component: ComponentKind, events: Option<Sender<SessionEvent>>) -> Self {
        Self {
            component,
            events,
            wake: None,
        }
    }

    /// A reporter that only logs.
    pub fn silent(component: ComponentKind) -> Self {
        Self::new(component, None)
    }

    /// Also cancel `token` when the worker exits.
    pub fn wake_on_exit(mut self, token: CancelToken) -> Self {
        self.wake = Some(token);
        self
    }

    pub fn component(&self) -> ComponentKind {
        self.component
    }

    pub fn state_changed(&self, state: ComponentState) {
        debug!(component = self.component.name(), state = state.name(), "Component state");
        self.send(SessionEvent::ComponentStateChanged {
            component: self.component,
            state,
        });
    }

    pub fn exited(&self, error: Option<String>) {
        if let Some(ref message) = error {
            error!(component = self.component.name(), "Worker exited with error: {}", message);
        }
        self.send(SessionEvent::ComponentExited {
            component: self.component,
            error,
        });
        if let Some(ref wake) = self.wake {
            wake.cancel();
        }
    }

    fn send(&self, event: SessionEvent) {
        if let Some(ref events) = self.events {
            if let Err(e) = events.try_send(event) {
                warn!("Failed to send event: {}", e);
            }
        }
    }
}

/// Run a worker body, converting a panic into an error message.
///
/// Workers call this around their loop so a panicking backend still ends in
/// a reported `Failed` exit instead of a silent one.
pub fn catch_worker_panic<T>(name: &str, body: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(body)).map_err(|payload| {
        let message = format!("{name} thread panicked: {}", panic_message(payload.as_ref()));
        error!(thread = name, "{}", message);
        message
    })
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Sends on the done-channel when dropped, including during a panic unwind.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Handle to a spawned worker thread with a bounded join.
pub struct WorkerHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
}

impl WorkerHandle {
    /// Spawn `body` on a named thread.
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name(format!("camloop-{name}"))
            .spawn(move || {
                let _guard = DoneGuard(done_tx);
                body();
            })?;

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            done_rx,
        })
    }

    /// Returns true once the worker body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait up to `timeout` for the worker to exit, then join it.
    ///
    /// On timeout the thread is detached and whatever it still owns is
    /// released when (if) its blocking call returns.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<(), JoinError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                handle.join().map_err(|_| JoinError::Panicked {
                    name: self.name.clone(),
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(thread = %self.name, ?timeout, "Worker did not stop, detaching");
                drop(handle);
                Err(JoinError::TimedOut {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }
}
