//! Interception router: per-request cache/network decisions, cache population
//! and generation cleanup.

use std::sync::Arc;

use http::Method;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};
use trendo_common::OptionExt;
use trendo_net::{Fetcher, Request, Response, ResponseType};

use crate::cache::{CacheEntry, CacheStorage, RequestKey};
use crate::clients::{Client, Clients, WindowAction};
use crate::config::{NavigationPolicy, WorkerConfig};
use crate::events::{ActivationReport, EventOutcome, InstallReport, LifecycleEvent, PendingOperation};
use crate::notification::{Notification, NotificationCenter, NotificationId, PushMessage, PushPayload};
use crate::WorkerError;

/// State shared by every worker version of one origin.
#[derive(Clone)]
pub struct WorkerScope {
    pub caches: Arc<RwLock<CacheStorage>>,
    pub clients: Arc<RwLock<Clients>>,
    pub notifications: Arc<RwLock<NotificationCenter>>,
    pub fetcher: Arc<dyn Fetcher>,
}

impl WorkerScope {
    /// Fresh storage around a fetcher.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            caches: Arc::new(RwLock::new(CacheStorage::new())),
            clients: Arc::new(RwLock::new(Clients::new())),
            notifications: Arc::new(RwLock::new(NotificationCenter::new())),
            fetcher,
        }
    }
}

/// The request/response logic of one worker version.
pub struct InterceptionRouter {
    config: Arc<WorkerConfig>,
    scope: WorkerScope,
}

impl InterceptionRouter {
    pub fn new(config: Arc<WorkerConfig>, scope: WorkerScope) -> Self {
        Self { config, scope }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start handling an event.
    pub fn dispatch(&self, event: LifecycleEvent) -> PendingOperation<'_> {
        trace!(event = event.name(), cache = %self.config.cache_name, "Dispatching");
        Box::pin(async move {
            match event {
                LifecycleEvent::Install => self.install().await.map(EventOutcome::Installed),
                LifecycleEvent::Activate => self.activate().await.map(EventOutcome::Activated),
                LifecycleEvent::Fetch(request) => {
                    self.handle_fetch(request).await.map(EventOutcome::Responded)
                }
                LifecycleEvent::Push(message) => Ok(match self.handle_push(message).await {
                    Some(notification) => EventOutcome::NotificationShown(notification),
                    None => EventOutcome::PushIgnored,
                }),
                LifecycleEvent::NotificationClick(id) => {
                    let (client, action) = self.handle_notification_click(id).await?;
                    Ok(EventOutcome::WindowOpened { client, action })
                }
            }
        })
    }

    /// Open the current generation and precache the manifest, best effort.
    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        let cache_name = self.config.cache_name.clone();
        self.scope.caches.write().await.open(&cache_name);
        info!(cache = %cache_name, "Cache opened");

        let mut report = InstallReport {
            cache_name,
            skip_waiting: self.config.skip_waiting,
            ..Default::default()
        };

        for path in &self.config.precache {
            match self.precache(path).await {
                Ok(()) => report.cached.push(path.clone()),
                Err(e) => {
                    warn!(path = %path, error = %e, "Cache error");
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        if report.skip_waiting {
            debug!(cache = %report.cache_name, "Requesting immediate activation");
        }

        Ok(report)
    }

    async fn precache(&self, path: &str) -> Result<(), WorkerError> {
        let request = Request::get(self.config.resolve(path)?);
        let response = self.scope.fetcher.fetch(&request).await?;
        if !response.ok() {
            return Err(WorkerError::CacheError(format!(
                "{} answered {}",
                request.url, response.status
            )));
        }

        let entry = CacheEntry::from_response(response).await?;
        self.store(RequestKey::for_request(&request), entry).await;
        Ok(())
    }

    /// Delete every generation except the current one.
    pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
        let current = &self.config.cache_name;
        let mut caches = self.scope.caches.write().await;

        let stale: Vec<String> = caches
            .keys()
            .into_iter()
            .filter(|name| *name != current.as_str())
            .map(str::to_string)
            .collect();

        for name in &stale {
            info!(cache = %name, "Deleting old cache");
            if !caches.delete(name) {
                return Err(WorkerError::CacheError(format!("cache {name} vanished")));
            }
        }

        Ok(ActivationReport {
            cache_name: current.clone(),
            deleted: stale,
        })
    }

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, WorkerError> {
        if request.is_navigation() && self.config.navigation == NavigationPolicy::NetworkFirst {
            self.network_first(request).await
        } else {
            self.cache_first(request).await
        }
    }

    async fn network_first(&self, request: Request) -> Result<Response, WorkerError> {
        match self.scope.fetcher.fetch(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation failed, trying cache");
                match self.lookup(&request).await {
                    Some(response) => Ok(response),
                    None => Err(WorkerError::NavigationFailed {
                        url: request.url.to_string(),
                        source: e,
                    }),
                }
            }
        }
    }

    async fn cache_first(&self, request: Request) -> Result<Response, WorkerError> {
        if let Some(response) = self.lookup(&request).await {
            trace!(url = %request.url, "Cache hit");
            return Ok(response);
        }

        let response = self.scope.fetcher.fetch(&request).await?;
        if !is_storable(&request, &response) {
            trace!(
                url = %request.url,
                status = response.status,
                response_type = ?response.response_type,
                "Not caching"
            );
            return Ok(response);
        }

        let (response, copy) = response.duplicate().await?;
        let entry = CacheEntry::from_response(copy).await?;
        self.store(RequestKey::for_request(&request), entry).await;
        debug!(url = %request.url, cache = %self.config.cache_name, "Cached");

        Ok(response)
    }

    async fn lookup(&self, request: &Request) -> Option<Response> {
        self.scope
            .caches
            .read()
            .await
            .match_request(request)
            .map(CacheEntry::to_response)
    }

    async fn store(&self, key: RequestKey, entry: CacheEntry) {
        self.scope
            .caches
            .write()
            .await
            .open(&self.config.cache_name)
            .put(key, entry);
    }

    /// Show a notification for a push message. `None` when there was nothing to show.
    pub async fn handle_push(&self, message: PushMessage) -> Option<Notification> {
        let payload = PushPayload::parse(&message)?;
        let (title, options) = self.config.notifications.render(payload);

        let notification = self.scope.notifications.write().await.show(title, options);
        info!(
            id = notification.id.raw(),
            title = %notification.title,
            url = %notification.options.data.url,
            "Notification shown"
        );
        Some(notification)
    }

    /// Dismiss a notification and bring up a window at its destination.
    pub async fn handle_notification_click(
        &self,
        id: NotificationId,
    ) -> Result<(Client, WindowAction), WorkerError> {
        let url = {
            let notifications = self.scope.notifications.read().await;
            let notification = notifications
                .get(id)
                .ok_or_not_found(format!("notification {}", id.raw()))?;
            self.config.resolve(&notification.options.data.url)?
        };

        self.scope
            .notifications
            .write()
            .await
            .close(id)
            .ok_or_not_found(format!("notification {}", id.raw()))?;
        let (client, action) = self.scope.clients.write().await.open_or_focus(url);
        info!(client = %client.id, url = %client.url, action = ?action, "Notification clicked");

        Ok((client, action))
    }
}

/// Only same-origin 200 GET responses are stored lazily.
fn is_storable(request: &Request, response: &Response) -> bool {
    request.method == Method::GET
        && response.status == 200
        && response.response_type == ResponseType::Basic
}
