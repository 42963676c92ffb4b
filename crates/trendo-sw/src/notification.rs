//! Push messages and the notifications they produce.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NotificationDefaults;

/// A message delivered by the push transport.
#[derive(Debug, Clone, Default)]
pub struct PushMessage {
    data: Option<Bytes>,
}

impl PushMessage {
    /// Message with a body.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// Message without a body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw body, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }
}

/// `{ "title"?: string, "body": string, "url"?: string }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    /// Decode a message body. Absent or malformed bodies yield `None`.
    pub fn parse(message: &PushMessage) -> Option<Self> {
        let data = message.data()?;
        match serde_json::from_slice(data) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed push payload");
                None
            }
        }
    }
}

/// Metadata attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    /// Click-through destination.
    pub url: String,
}

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
    pub body: Option<String>,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
}

impl NotificationDefaults {
    /// Title and options for a payload, filling in the defaults.
    pub fn render(&self, payload: PushPayload) -> (String, NotificationOptions) {
        let title = payload
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.default_title.clone());
        let url = payload
            .url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.default_url.clone());

        let options = NotificationOptions {
            body: payload.body,
            icon: self.icon.clone(),
            badge: self.badge.clone(),
            vibrate: self.vibrate.clone(),
            data: NotificationData { url },
        };
        (title, options)
    }
}

/// Unique identifier for a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A system notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

/// Notifications currently on screen, oldest first.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display a notification.
    pub fn show(&mut self, title: String, options: NotificationOptions) -> Notification {
        let notification = Notification {
            id: NotificationId::new(),
            title,
            options,
        };
        self.shown.push(notification.clone());
        notification
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.iter().find(|n| n.id == id)
    }

    /// Dismiss a notification.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        let index = self.shown.iter().position(|n| n.id == id)?;
        Some(self.shown.remove(index))
    }

    /// Notifications on screen.
    pub fn active(&self) -> &[Notification] {
        &self.shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let message =
            PushMessage::new(r#"{"title":"New post","body":"GPT-5 is out","url":"/blog/gpt-5"}"#);
        let payload = PushPayload::parse(&message).unwrap();
        assert_eq!(payload.title.as_deref(), Some("New post"));
        assert_eq!(payload.body.as_deref(), Some("GPT-5 is out"));
        assert_eq!(payload.url.as_deref(), Some("/blog/gpt-5"));
    }

    #[test]
    fn test_parse_rejects_absent_and_malformed() {
        assert!(PushPayload::parse(&PushMessage::empty()).is_none());
        assert!(PushPayload::parse(&PushMessage::new("plain text")).is_none());
        assert!(PushPayload::parse(&PushMessage::new("[1,2]")).is_none());
        assert!(PushPayload::parse(&PushMessage::new(r#"{"title":5}"#)).is_none());
    }

    #[test]
    fn test_render_defaults() {
        let defaults = NotificationDefaults::default();
        let payload = PushPayload::parse(&PushMessage::new(r#"{"body":"hello"}"#)).unwrap();

        let (title, options) = defaults.render(payload);
        assert_eq!(title, "TrendoAI");
        assert_eq!(options.body.as_deref(), Some("hello"));
        assert_eq!(options.icon, "/static/img/logo.png");
        assert_eq!(options.badge, "/static/img/logo.png");
        assert_eq!(options.vibrate, vec![100, 50, 100]);
        assert_eq!(options.data.url, "/");
    }

    #[test]
    fn test_empty_title_falls_back() {
        let defaults = NotificationDefaults::default();
        let payload = PushPayload {
            title: Some(String::new()),
            body: Some("x".into()),
            url: Some(String::new()),
        };
        let (title, options) = defaults.render(payload);
        assert_eq!(title, "TrendoAI");
        assert_eq!(options.data.url, "/");
    }

    #[test]
    fn test_center_show_and_close() {
        let mut center = NotificationCenter::new();
        let (title, options) = NotificationDefaults::default().render(PushPayload::default());
        let first = center.show(title.clone(), options.clone());
        let second = center.show(title, options);
        assert_ne!(first.id, second.id);
        assert_eq!(center.active().len(), 2);

        assert_eq!(center.close(first.id).unwrap().id, first.id);
        assert!(center.get(first.id).is_none());
        assert!(center.close(first.id).is_none());
        assert_eq!(center.active().len(), 1);
    }

    #[test]
    fn test_notification_serializes_like_the_web_api() {
        let (title, options) = NotificationDefaults::default().render(PushPayload {
            url: Some("/dashboard".into()),
            ..Default::default()
        });
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(title, "TrendoAI");
        assert_eq!(json["data"]["url"], "/dashboard");
        assert_eq!(json["vibrate"], serde_json::json!([100, 50, 100]));
    }
}
