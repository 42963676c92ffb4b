//! Lifecycle events and their outcomes.

use std::future::Future;
use std::pin::Pin;

use trendo_net::{Request, Response};

use crate::clients::{Client, WindowAction};
use crate::notification::{Notification, NotificationId, PushMessage};
use crate::WorkerError;

/// Everything the host can deliver to a worker version.
#[derive(Debug)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(PushMessage),
    NotificationClick(NotificationId),
}

impl LifecycleEvent {
    /// Event name as the host knows it.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Install => "install",
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::Fetch(_) => "fetch",
            LifecycleEvent::Push(_) => "push",
            LifecycleEvent::NotificationClick(_) => "notificationclick",
        }
    }
}

/// Result of the install event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Generation that was opened.
    pub cache_name: String,
    /// Manifest paths stored.
    pub cached: Vec<String>,
    /// Manifest paths that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// The version asked to skip the waiting phase.
    pub skip_waiting: bool,
}

/// Result of the activate event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Generation kept.
    pub cache_name: String,
    /// Stale generations deleted.
    pub deleted: Vec<String>,
}

/// What a settled event produced.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Responded(Response),
    NotificationShown(Notification),
    /// Push without a usable payload.
    PushIgnored,
    WindowOpened { client: Client, action: WindowAction },
}

/// Work an event started. The host keeps the worker alive until it settles.
pub type PendingOperation<'a> =
    Pin<Box<dyn Future<Output = Result<EventOutcome, WorkerError>> + Send + 'a>>;
