//! In-memory fetcher with scripted routes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

use crate::{Fetcher, NetError, Request, RequestMode, Response, ResponseType};

#[derive(Debug, Clone)]
struct Route {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

/// Fetcher that answers from a route table and can be switched offline.
///
/// Routes on the configured origin answer `basic`; routes elsewhere answer
/// `cors`, or `opaque` for no-cors requests. Unknown same-origin URLs get 404.
#[derive(Debug)]
pub struct ScriptedFetcher {
    origin: Url,
    routes: Mutex<HashMap<(Method, Url), Route>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(Method, Url)>>,
}

impl ScriptedFetcher {
    /// Create a fetcher for an application served from `origin`.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            routes: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer GET `url` with `status` and `body`.
    pub fn respond(&self, url: &Url, status: u16, body: impl Into<Bytes>) {
        self.respond_with(Method::GET, url, status, HeaderMap::new(), body);
    }

    /// Answer `method url` with a full response.
    pub fn respond_with(
        &self,
        method: Method,
        url: &Url,
        status: u16,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) {
        let route = Route {
            status,
            headers,
            body: body.into(),
        };
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method, url.clone()), route);
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests that reached this fetcher, offline attempts included.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Requests that reached this fetcher for `url`.
    pub fn calls_to(&self, url: &Url) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, u)| u == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.method.clone(), request.url.clone()));

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::unreachable(&request.url, "offline"));
        }

        let same_origin = crate::same_origin(&self.origin, &request.url);
        if !same_origin && request.mode == RequestMode::NoCors {
            return Ok(Response::opaque(request.url.clone()));
        }

        let route = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(request.method.clone(), request.url.clone()))
            .cloned();

        let response_type = if same_origin {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };

        Ok(match route {
            Some(route) => {
                let mut response =
                    Response::new(request.url.clone(), route.status, response_type, route.body);
                response.headers = route.headers;
                response
            }
            None => Response::new(request.url.clone(), 404, response_type, Bytes::new()),
        })
    }
}
