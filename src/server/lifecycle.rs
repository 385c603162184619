//! Server lifecycle tracking
//!
//! ```text
//! Created -> Starting -> Serving -> ShuttingDown -> Stopped
//! ```
//!
//! A failed start goes straight from Starting to Stopped.

use tokio::sync::watch;
use tracing::debug;

/// Where a server is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created,
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self { state }
    }

    pub(crate) fn current(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Move from Created to Starting; false if the server was already started
    pub(crate) fn begin_start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == LifecycleState::Created {
                *state = LifecycleState::Starting;
                true
            } else {
                false
            }
        })
    }

    /// Advance to `next`; moving backwards is ignored
    pub(crate) fn advance(&self, next: LifecycleState) {
        let changed = self.state.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(state = ?next, "Server lifecycle advanced");
        }
    }

    /// Resolve once the state is `target` or later
    pub(crate) async fn reached(&self, target: LifecycleState) -> LifecycleState {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as self, so the channel cannot close here.
        let reached = receiver
            .wait_for(|state| *state >= target)
            .await
            .map(|state| *state);
        match reached {
            Ok(state) => state,
            Err(_) => self.current(),
        }
    }
}
