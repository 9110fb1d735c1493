use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue};
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::Instant;

use super::util::{has_header, host_header_value, merge_headers};
use super::{Error, HttpRequest, HttpResponse, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Applies to requests that do not set [`HttpRequest::timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared, cloneable HTTP/1.1 client. Connections are pooled across clones.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

/// Turns an [`HttpRequest`] into a hyper request, filling in `host` and
/// `content-length` when the caller did not set them.
fn build(req: HttpRequest) -> Result<Request<Full<Bytes>>> {
    let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme(req.url));
    }
    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

    let mut builder = Request::builder().method(req.method).uri(uri);

    if !has_header(&req.headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        builder = builder.header(HOST, host);
    }
    if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
        builder = builder.header(CONTENT_LENGTH, req.body.len());
    }

    for (name, value) in req.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(&value).map_err(|_| Error::InvalidHeader(name))?;
        builder = builder.header(header_name, header_value);
    }

    Ok(builder.body(Full::new(req.body))?)
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(connect_timeout);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bounds every request that carries no timeout of its own.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Sends `req` and reads the whole body. `elapsed` covers both.
    ///
    /// Fails with [`Error::Timeout`] when the response is not complete within the
    /// request's own timeout, or the client's default when it has none.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let limit = req.timeout.unwrap_or(self.request_timeout);
        let req = build(req)?;

        let started = Instant::now();
        let exchange = async {
            let (parts, body) = self.inner.request(req).await?.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts, body))
        };
        let (parts, body) = tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| Error::Timeout(limit))??;
        let elapsed = started.elapsed();

        tracing::trace!(
            status = parts.status.as_u16(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "http response"
        );

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            headers: merge_headers(&parts.headers),
            body,
            elapsed,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}
