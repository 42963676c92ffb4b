//! Window clients: pages the worker controls and windows it opens.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use url::Url;

/// A window client (page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Current URL.
    pub url: Url,

    /// Whether focused.
    pub focused: bool,

    /// Whether an active worker controls this client.
    pub controlled: bool,
}

/// How a window request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    /// A new window was opened.
    Opened,
    /// A window already showing the URL was focused.
    Focused,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Number of clients under an active worker.
    pub fn controlled_count(&self) -> usize {
        self.clients.values().filter(|c| c.controlled).count()
    }

    /// Add a window that loaded `url`.
    pub fn connect(&mut self, url: Url, controlled: bool) -> Client {
        let client = Client {
            id: next_client_id(),
            url,
            focused: false,
            controlled,
        };
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Open a focused window at `url`.
    pub fn open_window(&mut self, url: Url) -> Client {
        self.blur_all();
        let mut client = self.connect(url, false);
        client.focused = true;
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Focus a window already showing `url`, or open one.
    pub fn open_or_focus(&mut self, url: Url) -> (Client, WindowAction) {
        let existing = self
            .clients
            .values()
            .find(|c| c.url == url)
            .map(|c| c.id.clone());

        if let Some(id) = existing {
            self.blur_all();
            if let Some(client) = self.clients.get_mut(&id) {
                client.focused = true;
                return (client.clone(), WindowAction::Focused);
            }
        }
        (self.open_window(url), WindowAction::Opened)
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn blur_all(&mut self) {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://trendo.ai").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_open_window() {
        let mut clients = Clients::new();

        let client = clients.open_window(url("/dashboard"));
        assert!(client.focused);
        assert!(!client.controlled);
        assert!(clients.get(&client.id).unwrap().focused);
    }

    #[test]
    fn test_open_or_focus_reuses_window() {
        let mut clients = Clients::new();
        let page = clients.connect(url("/dashboard"), true);
        let blog = clients.open_window(url("/blog"));

        let (client, action) = clients.open_or_focus(url("/dashboard"));
        assert_eq!(action, WindowAction::Focused);
        assert_eq!(client.id, page.id);
        assert_eq!(clients.len(), 2);
        assert!(clients.get(&page.id).unwrap().focused);
        assert!(!clients.get(&blog.id).unwrap().focused);
    }

    #[test]
    fn test_open_or_focus_opens_new() {
        let mut clients = Clients::new();
        clients.connect(url("/"), true);

        let (client, action) = clients.open_or_focus(url("/dashboard"));
        assert_eq!(action, WindowAction::Opened);
        assert_eq!(client.url, url("/dashboard"));
        assert_eq!(clients.len(), 2);
    }

    #[test]
    fn test_controlled_count() {
        let mut clients = Clients::new();
        clients.connect(url("/"), true);
        let other = clients.connect(url("/about"), false);
        assert_eq!(clients.controlled_count(), 1);

        assert!(clients.remove(&other.id).is_some());
        assert_eq!(clients.controlled_count(), 1);
        assert!(clients.remove(&other.id).is_none());
    }
}
