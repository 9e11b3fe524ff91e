//! The fetch primitive the worker forwards requests through.

use async_trait::async_trait;
use tracing::{debug, info, trace};

use crate::{NetError, Request, Response, ResponseSource};

/// Asynchronous network access.
///
/// Implementations resolve with any HTTP status; only transport failures
/// (DNS, refused connection, reset) are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string.
    pub user_agent: String,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Enable cookies.
    pub cookies_enabled: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("ClamFlowWorker/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            cookies_enabled: true,
        }
    }
}

/// [`Fetcher`] backed by reqwest.
///
/// No request timeout is set: a hung connection hangs the request.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookies_enabled)
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!("HttpFetcher initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url: Some(url),
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert!(config.user_agent.starts_with("ClamFlowWorker/"));
        assert!(config.cookies_enabled);
    }

    #[tokio::test]
    async fn test_http_fetcher_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/lots"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"[{"id":42}]"#, "application/json"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/api/lots", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body.as_ref(), br#"[{"id":42}]"#);
        assert_eq!(response.content_type(), Some(mime::APPLICATION_JSON));
    }

    #[tokio::test]
    async fn test_http_fetcher_error_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/health", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_http_fetcher_connection_refused() {
        let fetcher = HttpFetcher::new(FetchConfig::default()).unwrap();
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let result = fetcher.fetch(&Request::get(url)).await;

        assert!(matches!(result, Err(NetError::HttpError(_))));
    }
}
