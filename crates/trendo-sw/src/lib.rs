//! # Trendo SW
//!
//! Offline worker for the TrendoAI web app.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, fetch, push and notification-click events
//! - **Cache generations**: one current generation, older ones swept on activation
//! - **Routing**: network-first navigations, cache-first sub-resources
//! - **Push**: JSON payloads rendered as notifications, clicks open or focus a window
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer
//!     ├── ServiceWorkerRegistration (installing → waiting → active)
//!     └── InterceptionRouter per version ──┐
//!                                          ▼
//! WorkerScope (shared by every version)
//!     ├── CacheStorage ── Cache ── RequestKey → CacheEntry
//!     ├── Clients
//!     ├── NotificationCenter
//!     └── Fetcher (network)
//! ```

use thiserror::Error;
use trendo_common::TrendoError;
use trendo_net::NetError;

pub mod cache;
pub mod clients;
pub mod config;
pub mod container;
pub mod events;
pub mod notification;
pub mod registration;
pub mod router;

pub use cache::{Cache, CacheEntry, CacheStorage, RequestKey};
pub use clients::{Client, Clients, WindowAction};
pub use config::{NavigationPolicy, NotificationDefaults, WorkerConfig};
pub use container::{RegistrationOutcome, ServiceWorkerContainer, ServiceWorkerEvent};
pub use events::{ActivationReport, EventOutcome, InstallReport, LifecycleEvent, PendingOperation};
pub use notification::{Notification, NotificationCenter, NotificationId, PushMessage, PushPayload};
pub use registration::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
pub use router::{InterceptionRouter, WorkerScope};
pub use trendo_net::{Request, RequestDestination, RequestMode, Response, ResponseType};

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Navigation to {url} failed and no cached copy exists")]
    NavigationFailed {
        url: String,
        #[source]
        source: NetError,
    },

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Worker {} was superseded before its install settled", .0.raw())]
    Superseded(ServiceWorkerId),

    #[error("No active worker for {} event", .0.name())]
    NoActiveWorker(Box<LifecycleEvent>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<TrendoError> for WorkerError {
    fn from(err: TrendoError) -> Self {
        match err {
            TrendoError::NotFound(what) => WorkerError::NotFound(what),
            TrendoError::InvalidArgument(message) => WorkerError::InvalidUrl(message),
            TrendoError::Cache { message, .. } => WorkerError::CacheError(message),
            TrendoError::Network { message, .. } => {
                WorkerError::Network(NetError::RequestFailed(message))
            }
            e @ (TrendoError::Config { .. } | TrendoError::Io(_) | TrendoError::Json(_)) => {
                WorkerError::Config(e.to_string())
            }
            e => WorkerError::StateError(e.to_string()),
        }
    }
}

impl From<WorkerError> for TrendoError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Network(e) => TrendoError::network_with_source("fetch failed", e),
            e @ WorkerError::NavigationFailed { .. } => {
                TrendoError::network_with_source("navigation failed", e)
            }
            WorkerError::CacheError(message) => TrendoError::cache(message),
            WorkerError::InvalidUrl(message) => TrendoError::InvalidArgument(message),
            WorkerError::NotFound(what) => TrendoError::NotFound(what),
            WorkerError::Config(message) => TrendoError::config(message),
            e => TrendoError::lifecycle_with_source("worker event failed", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_categories() {
        let net: TrendoError = WorkerError::Network(NetError::RequestFailed("x".into())).into();
        assert_eq!(net.category(), "network");
        assert!(net.is_offline_recoverable());

        let state: TrendoError = WorkerError::StateError("no waiting worker".into()).into();
        assert_eq!(state.category(), "lifecycle");

        let cache: TrendoError = WorkerError::CacheError("gone".into()).into();
        assert_eq!(cache.category(), "cache");
    }

    #[test]
    fn test_common_errors_keep_their_kind() {
        let config: WorkerError = TrendoError::config("cache_name must not be empty").into();
        assert!(matches!(config, WorkerError::Config(_)));

        let missing: WorkerError = TrendoError::NotFound("notification 7".into()).into();
        assert!(matches!(missing, WorkerError::NotFound(ref what) if what == "notification 7"));

        let cache: WorkerError = TrendoError::cache("gone").into();
        assert!(matches!(cache, WorkerError::CacheError(_)));

        let net: WorkerError = TrendoError::network("dns").into();
        assert!(matches!(net, WorkerError::Network(_)));

        let logging: WorkerError = TrendoError::Logging("already set".into()).into();
        assert!(matches!(logging, WorkerError::StateError(_)));
    }

    #[test]
    fn test_no_active_worker_message() {
        let err = WorkerError::NoActiveWorker(Box::new(LifecycleEvent::Push(PushMessage::empty())));
        assert_eq!(err.to_string(), "No active worker for push event");
    }
}
