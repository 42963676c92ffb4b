//! Network fetchers.

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{same_origin, NetError, Request, RequestMode, Response, ResponseType};

/// Something that can answer a request from the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Non-2xx statuses are responses, not errors.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Origin of the controlled application; decides `basic` vs cross-origin.
    pub origin: Url,
    /// User agent string.
    pub user_agent: String,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Hand bodies to the caller as chunk streams instead of buffering them.
    pub stream_bodies: bool,
}

impl LoaderConfig {
    /// Configuration for an application served from `origin`.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            user_agent: format!("TrendoWorker/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            stream_bodies: true,
        }
    }
}

/// reqwest-backed fetcher.
///
/// No request timeout is configured: a hung fetch only blocks its own request.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        debug!(origin = %config.origin, "HttpFetcher initialized");

        Ok(Self { client, config })
    }

    /// The application origin responses are classified against.
    pub fn origin(&self) -> &Url {
        &self.config.origin
    }

    fn classify(&self, request: &Request, final_url: &Url) -> ResponseType {
        if same_origin(&self.config.origin, final_url) {
            ResponseType::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching from network");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if let Some(ref referrer) = request.referrer {
            req_builder = req_builder.header("Referer", referrer.as_str());
        }

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        let mut response = req_builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                warn!(url = %request.url, error = %e, "Network unreachable");
                NetError::unreachable(&request.url, e.to_string())
            } else {
                NetError::HttpError(e)
            }
        })?;

        let final_url = response.url().clone();
        let response_type = self.classify(request, &final_url);
        let redirected = final_url != request.url;

        if response_type == ResponseType::Opaque {
            trace!(url = %final_url, "Opaque response");
            let mut opaque = Response::opaque(final_url);
            opaque.redirected = redirected;
            return Ok(opaque);
        }

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let mut out = if self.config.stream_bodies {
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                loop {
                    match response.chunk().await {
                        Ok(Some(chunk)) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(NetError::RequestFailed(e.to_string()))).await;
                            break;
                        }
                    }
                }
            });
            Response::streaming(final_url, status, response_type, rx)
        } else {
            let body = response.bytes().await?;
            Response::new(final_url, status, response_type, body)
        };
        out.headers = headers;
        out.redirected = redirected;

        trace!(
            url = %out.url,
            status = out.status,
            response_type = ?out.response_type,
            "Response received"
        );

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestDestination;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer) -> HttpFetcher {
        HttpFetcher::new(LoaderConfig::new(Url::parse(&server.uri()).unwrap())).unwrap()
    }

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::new(Url::parse("https://trendo.ai").unwrap());
        assert!(config.user_agent.starts_with("TrendoWorker/"));
        assert!(config.stream_bodies);
    }

    #[tokio::test]
    async fn test_same_origin_is_basic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/css/style.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let url = Url::parse(&format!("{}/static/css/style.css", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.response_type, ResponseType::Basic);
        assert_eq!(response.text().await.unwrap(), "body{}");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_cross_origin_classification() {
        let app = MockServer::start().await;
        let cdn = MockServer::start().await;
        Mock::given(path("/lib.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("lib"))
            .mount(&cdn)
            .await;

        let fetcher = fetcher_for(&app);
        let url = Url::parse(&format!("{}/lib.js", cdn.uri())).unwrap();

        let cors = fetcher.fetch(&Request::get(url.clone())).await.unwrap();
        assert_eq!(cors.response_type, ResponseType::Cors);
        assert_eq!(cors.status, 200);

        let no_cors = Request::get(url)
            .mode(RequestMode::NoCors)
            .destination(RequestDestination::Script);
        let opaque = fetcher.fetch(&no_cors).await.unwrap();
        assert_eq!(opaque.response_type, ResponseType::Opaque);
        assert_eq!(opaque.status, 0);
        assert!(opaque.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buffered_bodies() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let mut config = LoaderConfig::new(Url::parse(&server.uri()).unwrap());
        config.stream_bodies = false;
        let fetcher = HttpFetcher::new(config).unwrap();

        let url = Url::parse(&format!("{}/", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::navigate(url)).await.unwrap();
        assert!(!response.is_streaming());
        assert_eq!(response.text().await.unwrap(), "<html>");
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let origin = Url::parse("http://127.0.0.1:9").unwrap();
        let fetcher = HttpFetcher::new(LoaderConfig::new(origin.clone())).unwrap();

        let err = fetcher
            .fetch(&Request::get(origin.join("/").unwrap()))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }
}
