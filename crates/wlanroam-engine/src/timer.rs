//! Timeout plumbing.
//!
//! The engine never sleeps; it arms timeouts through a `TimeoutScheduler`
//! and consumes expiries as ordinary events via `RoamEngine::on_timeout`.
//! Production embedders use [`TokioTimeoutScheduler`] plus
//! [`spawn_timeout_pump`]; deterministic hosts and tests use
//! [`ManualTimeoutScheduler`] and feed expiries by hand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use wlanroam_types::{CommandId, InterfaceId};

/// Opaque handle for one armed timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle(pub u64);

/// What fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// An active command exceeded its per-kind deadline
    CommandDeadline {
        interface_id: InterfaceId,
        command_id: CommandId,
    },
    /// A firmware roam reached no terminal event within the watchdog window
    RoamWatchdog { interface_id: InterfaceId },
}

/// Arms and cancels wall-clock timeouts on behalf of the engine.
pub trait TimeoutScheduler: Send {
    fn schedule(&mut self, event: TimeoutEvent, after: Duration) -> TimeoutHandle;
    fn cancel(&mut self, handle: TimeoutHandle);
}

/// Tokio-backed scheduler: one sleeper task per armed timeout, cancelled
/// through a `CancellationToken`. Due events land on the channel returned
/// by [`TokioTimeoutScheduler::new`]; the embedder forwards them into the
/// engine (see [`spawn_timeout_pump`]).
///
/// `schedule` must be called within a tokio runtime context.
pub struct TokioTimeoutScheduler {
    next_id: u64,
    tx: mpsc::UnboundedSender<TimeoutEvent>,
    armed: HashMap<u64, CancellationToken>,
}

impl TokioTimeoutScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimeoutEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                next_id: 1,
                tx,
                armed: HashMap::new(),
            },
            rx,
        )
    }
}

impl TimeoutScheduler for TokioTimeoutScheduler {
    fn schedule(&mut self, event: TimeoutEvent, after: Duration) -> TimeoutHandle {
        // Fired sleepers cancel their own token; drop those entries here.
        self.armed.retain(|_, token| !token.is_cancelled());

        let id = self.next_id;
        self.next_id += 1;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    debug!("timeout fired: {:?}", event);
                    let _ = tx.send(event);
                    task_token.cancel();
                }
            }
        });

        self.armed.insert(id, token);
        TimeoutHandle(id)
    }

    fn cancel(&mut self, handle: TimeoutHandle) {
        if let Some(token) = self.armed.remove(&handle.0) {
            token.cancel();
        }
    }
}

/// Scheduler that never fires on its own. Armed timeouts are inspected and
/// fired explicitly by the host, which makes expiry paths deterministic.
#[derive(Clone, Default)]
pub struct ManualTimeoutScheduler {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    armed: Vec<(TimeoutHandle, TimeoutEvent, Duration)>,
}

impl ManualTimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of currently armed timeouts, oldest first.
    pub fn armed(&self) -> Vec<(TimeoutHandle, TimeoutEvent, Duration)> {
        self.lock().armed.clone()
    }

    /// Number of armed timeouts.
    pub fn armed_count(&self) -> usize {
        self.lock().armed.len()
    }

    /// Pop the oldest armed timeout, as if it had expired. The caller feeds
    /// the returned event into `RoamEngine::on_timeout`.
    pub fn fire_oldest(&self) -> Option<TimeoutEvent> {
        let mut state = self.lock();
        if state.armed.is_empty() {
            None
        } else {
            let (_, event, _) = state.armed.remove(0);
            Some(event)
        }
    }
}

impl TimeoutScheduler for ManualTimeoutScheduler {
    fn schedule(&mut self, event: TimeoutEvent, after: Duration) -> TimeoutHandle {
        let mut state = self.lock();
        state.next_id += 1;
        let handle = TimeoutHandle(state.next_id);
        state.armed.push((handle, event, after));
        handle
    }

    fn cancel(&mut self, handle: TimeoutHandle) {
        let mut state = self.lock();
        state.armed.retain(|(h, _, _)| *h != handle);
    }
}
