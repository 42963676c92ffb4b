//! Cache generations.
//!
//! ```text
//! CacheStorage (ordered by creation)
//!     └── Cache "trendoai-v2"
//!             └── RequestKey (method + URL) → CacheEntry
//! ```

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, Method};
use trendo_net::{NetError, Request, Response, ResponseType};
use url::Url;

/// Identity of a stored request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: Url,
}

impl RequestKey {
    /// Key for a request.
    pub fn for_request(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Final response URL.
    pub url: Url,
    /// The network answer followed at least one redirect.
    pub redirected: bool,
    pub status: u16,
    pub headers: HeaderMap,
    pub response_type: ResponseType,
    pub body: Bytes,
    /// Milliseconds since the epoch.
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response, reading its body to the end.
    pub async fn from_response(response: Response) -> Result<Self, NetError> {
        let url = response.url.clone();
        let redirected = response.redirected;
        let status = response.status;
        let headers = response.headers.clone();
        let response_type = response.response_type;
        let body = response.bytes().await?;

        Ok(Self {
            url,
            redirected,
            status,
            headers,
            response_type,
            body,
            cached_at: now_millis(),
        })
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(
            self.url.clone(),
            self.status,
            self.response_type,
            self.body.clone(),
        );
        response.headers = self.headers.clone();
        response.redirected = self.redirected;
        response.from_cache = true;
        response
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One cache generation.
#[derive(Debug, Default)]
pub struct Cache {
    /// Generation tag.
    pub name: String,

    entries: HashMap<RequestKey, CacheEntry>,
}

impl Cache {
    /// Create an empty cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&RequestKey::for_request(request))
    }

    /// Look up by key.
    pub fn get(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one for the key.
    pub fn put(&mut self, key: RequestKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<&RequestKey> {
        self.entries.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache generations of the origin.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: Vec<Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        let index = match self.caches.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.caches.push(Cache::new(name));
                self.caches.len() - 1
            }
        };
        &mut self.caches[index]
    }

    /// Get an existing cache.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Delete a cache and every entry in it.
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.caches.len();
        self.caches.retain(|c| c.name != name);
        self.caches.len() != before
    }

    /// Cache names in creation order.
    pub fn keys(&self) -> Vec<&str> {
        self.caches.iter().map(|c| c.name.as_str()).collect()
    }

    /// Match across all caches, oldest first.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.caches.iter().find_map(|c| c.match_request(request))
    }
}
