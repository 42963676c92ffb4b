//! Worker versions and the registration that tracks them.
//!
//! ```text
//! ServiceWorkerRegistration
//!     ├── installing (ServiceWorker)
//!     ├── waiting (ServiceWorker)
//!     └── active (ServiceWorker)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use url::Url;

use crate::WorkerError;

/// Unique identifier for a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Install event running.
    Installing,
    /// Installed and waiting for activation.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced or failed.
    Redundant,
}

/// One deployed version of the worker.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Cache generation tag this version owns.
    pub cache_name: String,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    /// Create a new worker version.
    pub fn new(cache_name: &str) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            cache_name: cache_name.to_string(),
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    /// Check if redundant.
    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Start installing a new version, superseding any earlier installing one.
    pub fn start_install(&mut self, mut worker: ServiceWorker) -> Option<ServiceWorker> {
        worker.set_state(ServiceWorkerState::Installing);
        let superseded = self.installing.replace(worker);
        superseded.map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        })
    }

    /// Transition worker `id` from installing to waiting. A previously waiting
    /// version becomes redundant.
    ///
    /// Fails with [`WorkerError::Superseded`] when a newer install replaced `id`
    /// while its install event was running.
    pub fn install_complete(
        &mut self,
        id: ServiceWorkerId,
    ) -> Result<Option<ServiceWorker>, WorkerError> {
        let mut worker = match self.installing.take() {
            Some(worker) if worker.id == id => worker,
            other => {
                self.installing = other;
                return Err(WorkerError::Superseded(id));
            }
        };
        worker.set_state(ServiceWorkerState::Installed);

        let replaced = self.waiting.replace(worker);
        Ok(replaced.map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        }))
    }

    /// Discard worker `id` if it is still the installing one.
    pub fn install_failed(&mut self, id: ServiceWorkerId) -> Option<ServiceWorker> {
        if self.installing.as_ref().map(|w| w.id) != Some(id) {
            return None;
        }
        self.installing.take().map(|mut worker| {
            worker.set_state(ServiceWorkerState::Redundant);
            worker
        })
    }

    /// Whether the waiting worker may activate now.
    ///
    /// Without skip-waiting, a waiting worker activates only once no page is
    /// controlled by the current active one.
    pub fn can_activate(&self, controlled_clients: usize, skip_waiting: bool) -> bool {
        self.waiting.is_some()
            && (skip_waiting || self.active.is_none() || controlled_clients == 0)
    }

    /// Move the waiting worker into `Activating`. Returns the worker it replaces.
    pub fn begin_activation(&mut self) -> Result<Option<ServiceWorker>, WorkerError> {
        let mut worker = self
            .waiting
            .take()
            .ok_or_else(|| WorkerError::StateError("no waiting worker".to_string()))?;
        worker.set_state(ServiceWorkerState::Activating);

        let previous = self.active.replace(worker);
        Ok(previous.map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        }))
    }

    /// Mark the activating worker as activated.
    pub fn finish_activation(&mut self) -> Result<(), WorkerError> {
        match self.active {
            Some(ref mut worker) if worker.state == ServiceWorkerState::Activating => {
                worker.set_state(ServiceWorkerState::Activated);
                Ok(())
            }
            _ => Err(WorkerError::StateError(
                "no activating worker".to_string(),
            )),
        }
    }

    /// Get the active worker.
    pub fn get_active(&self) -> Option<&ServiceWorker> {
        self.active.as_ref()
    }

    /// Unregister: every version becomes redundant.
    pub fn unregister(&mut self) -> Vec<ServiceWorker> {
        [self.installing.take(), self.waiting.take(), self.active.take()]
            .into_iter()
            .flatten()
            .map(|mut worker| {
                worker.set_state(ServiceWorkerState::Redundant);
                worker
            })
            .collect()
    }
}
