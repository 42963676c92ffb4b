//! Host side: drives worker versions through their lifecycle and routes
//! events to the active one.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use trendo_net::{Fetcher, Request, Response};
use url::Url;

use crate::clients::{Client, WindowAction};
use crate::config::WorkerConfig;
use crate::events::{ActivationReport, EventOutcome, InstallReport, LifecycleEvent};
use crate::notification::{Notification, NotificationId, PushMessage};
use crate::registration::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
use crate::router::{InterceptionRouter, WorkerScope};
use crate::WorkerError;

/// Notifications about the registration, for hosts that want to observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// A new version started installing.
    UpdateFound { cache_name: String },
    /// A version changed state.
    StateChange {
        worker_id: ServiceWorkerId,
        cache_name: String,
        new_state: ServiceWorkerState,
    },
    /// A new version took control.
    ControllerChange { worker_id: ServiceWorkerId },
}

/// Outcome of [`ServiceWorkerContainer::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub worker_id: ServiceWorkerId,
    pub install: InstallReport,
    /// Present when the version activated right away.
    pub activation: Option<ActivationReport>,
}

/// Owns the registration, the shared scope and one router per live version.
pub struct ServiceWorkerContainer {
    registration: RwLock<ServiceWorkerRegistration>,
    routers: RwLock<HashMap<ServiceWorkerId, Arc<InterceptionRouter>>>,
    scope: WorkerScope,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerContainer {
    /// Create a new container.
    pub fn new(
        scope_url: Url,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                registration: RwLock::new(ServiceWorkerRegistration::new(scope_url)),
                routers: RwLock::new(HashMap::new()),
                scope: WorkerScope::new(fetcher),
                event_tx,
            },
            event_rx,
        )
    }

    /// Shared storage, clients and notifications.
    pub fn scope(&self) -> &WorkerScope {
        &self.scope
    }

    /// Deploy a worker version: install it, then activate it if allowed.
    ///
    /// A version replaced by a later `register` before its install settled
    /// fails with [`WorkerError::Superseded`] and is never promoted.
    pub async fn register(&self, config: WorkerConfig) -> Result<RegistrationOutcome, WorkerError> {
        config.validate()?;

        let worker = ServiceWorker::new(&config.cache_name);
        let worker_id = worker.id;
        let router = Arc::new(InterceptionRouter::new(Arc::new(config), self.scope.clone()));
        let cache_name = router.config().cache_name.clone();

        if let Some(old) = self.registration.write().await.start_install(worker) {
            self.retire(&old).await;
        }
        self.routers.write().await.insert(worker_id, Arc::clone(&router));
        self.emit(ServiceWorkerEvent::UpdateFound {
            cache_name: cache_name.clone(),
        });
        self.emit_state(worker_id, &cache_name, ServiceWorkerState::Installing);

        let install = match router.dispatch(LifecycleEvent::Install).await {
            Ok(EventOutcome::Installed(report)) => report,
            Ok(other) => {
                return Err(WorkerError::StateError(format!(
                    "install settled with {other:?}"
                )))
            }
            Err(e) => {
                warn!(cache = %cache_name, error = %e, "Install failed");
                if let Some(failed) = self.registration.write().await.install_failed(worker_id) {
                    self.retire(&failed).await;
                }
                return Err(e);
            }
        };

        // A newer register may have replaced this version while it installed.
        let replaced = self
            .registration
            .write()
            .await
            .install_complete(worker_id)
            .inspect_err(|e| debug!(cache = %cache_name, error = %e, "Install discarded"))?;
        if let Some(old) = replaced {
            self.retire(&old).await;
        }
        self.emit_state(worker_id, &cache_name, ServiceWorkerState::Installed);
        info!(cache = %cache_name, cached = install.cached.len(), failed = install.failed.len(), "Installed");

        let activation = self.try_activate().await?;

        Ok(RegistrationOutcome {
            worker_id,
            install,
            activation,
        })
    }

    /// Activate the waiting version if nothing holds it back.
    pub async fn try_activate(&self) -> Result<Option<ActivationReport>, WorkerError> {
        let (router, worker_id, cache_name, previous) = {
            let mut registration = self.registration.write().await;
            let Some(waiting) = registration.waiting.as_ref() else {
                return Ok(None);
            };
            let worker_id = waiting.id;
            let router = self.router(worker_id).await?;
            let skip_waiting = router.config().skip_waiting;
            let controlled = self.scope.clients.read().await.controlled_count();

            if !registration.can_activate(controlled, skip_waiting) {
                debug!(cache = %waiting.cache_name, controlled, "Waiting for controlled pages to close");
                return Ok(None);
            }

            let cache_name = waiting.cache_name.clone();
            let previous = registration.begin_activation()?;
            (router, worker_id, cache_name, previous)
        };

        if let Some(old) = previous {
            self.retire(&old).await;
        }
        self.emit_state(worker_id, &cache_name, ServiceWorkerState::Activating);

        let report = match router.dispatch(LifecycleEvent::Activate).await? {
            EventOutcome::Activated(report) => report,
            other => {
                return Err(WorkerError::StateError(format!(
                    "activate settled with {other:?}"
                )))
            }
        };

        self.registration.write().await.finish_activation()?;
        self.emit_state(worker_id, &cache_name, ServiceWorkerState::Activated);
        self.emit(ServiceWorkerEvent::ControllerChange { worker_id });
        info!(cache = %cache_name, deleted = ?report.deleted, "Activated");

        Ok(Some(report))
    }

    /// Route a request through the active version, or straight to the network
    /// when no version controls the origin yet.
    pub async fn fetch(&self, request: Request) -> Result<Response, WorkerError> {
        match self.dispatch_to_active(LifecycleEvent::Fetch(request)).await {
            Err(WorkerError::NoActiveWorker(event)) => match *event {
                LifecycleEvent::Fetch(request) => Ok(self.scope.fetcher.fetch(&request).await?),
                other => Err(WorkerError::StateError(format!(
                    "{} returned for fetch",
                    other.name()
                ))),
            },
            Ok(EventOutcome::Responded(response)) => Ok(response),
            Ok(other) => Err(WorkerError::StateError(format!(
                "fetch settled with {other:?}"
            ))),
            Err(e) => Err(e),
        }
    }

    /// Deliver a push message.
    pub async fn push(&self, message: PushMessage) -> Result<Option<Notification>, WorkerError> {
        match self.dispatch_to_active(LifecycleEvent::Push(message)).await? {
            EventOutcome::NotificationShown(notification) => Ok(Some(notification)),
            EventOutcome::PushIgnored => Ok(None),
            other => Err(WorkerError::StateError(format!(
                "push settled with {other:?}"
            ))),
        }
    }

    /// Deliver a notification click.
    pub async fn notification_click(
        &self,
        id: NotificationId,
    ) -> Result<(Client, WindowAction), WorkerError> {
        match self
            .dispatch_to_active(LifecycleEvent::NotificationClick(id))
            .await?
        {
            EventOutcome::WindowOpened { client, action } => Ok((client, action)),
            other => Err(WorkerError::StateError(format!(
                "notificationclick settled with {other:?}"
            ))),
        }
    }

    /// A page loaded. It is controlled when an active version exists.
    pub async fn connect_client(&self, url: Url) -> Client {
        let controlled = self.registration.read().await.get_active().is_some();
        self.scope.clients.write().await.connect(url, controlled)
    }

    /// A page closed. The waiting version may now activate.
    pub async fn disconnect_client(
        &self,
        id: &str,
    ) -> Result<Option<ActivationReport>, WorkerError> {
        self.scope.clients.write().await.remove(id);
        self.try_activate().await
    }

    /// Cache tag of the active version.
    pub async fn active_cache_name(&self) -> Option<String> {
        self.registration
            .read()
            .await
            .get_active()
            .map(|w| w.cache_name.clone())
    }

    /// Snapshot of (installing, waiting, active) cache tags.
    pub async fn versions(&self) -> (Option<String>, Option<String>, Option<String>) {
        let registration = self.registration.read().await;
        (
            registration.installing.as_ref().map(|w| w.cache_name.clone()),
            registration.waiting.as_ref().map(|w| w.cache_name.clone()),
            registration.active.as_ref().map(|w| w.cache_name.clone()),
        )
    }

    /// Retire every version. Caches stay; only activation evicts them.
    pub async fn unregister(&self) -> usize {
        let retired = self.registration.write().await.unregister();
        for worker in &retired {
            self.retire(worker).await;
        }
        retired.len()
    }

    async fn dispatch_to_active(&self, event: LifecycleEvent) -> Result<EventOutcome, WorkerError> {
        let active = self.registration.read().await.get_active().map(|w| w.id);
        let Some(worker_id) = active else {
            return Err(WorkerError::NoActiveWorker(Box::new(event)));
        };
        let router = self.router(worker_id).await?;
        router.dispatch(event).await
    }

    async fn router(&self, id: ServiceWorkerId) -> Result<Arc<InterceptionRouter>, WorkerError> {
        self.routers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkerError::NotFound(format!("worker {}", id.raw())))
    }

    async fn retire(&self, worker: &ServiceWorker) {
        self.routers.write().await.remove(&worker.id);
        self.emit_state(worker.id, &worker.cache_name, ServiceWorkerState::Redundant);
    }

    fn emit_state(&self, worker_id: ServiceWorkerId, cache_name: &str, new_state: ServiceWorkerState) {
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id,
            cache_name: cache_name.to_string(),
            new_state,
        });
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        let _ = self.event_tx.send(event);
    }
}
