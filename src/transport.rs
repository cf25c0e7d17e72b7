use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::{FetchError, Result};

/// Byte stream of a remote artifact.
pub type Payload = Box<dyn Read + Send>;

/// The only network contract the fetch core relies on.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<Payload, FetchError>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("nwp-opendata-rs/", env!("CARGO_PKG_VERSION"))),
        );
        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<Payload, FetchError> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| FetchError::transport(url, e))?;

        match resp.status() {
            s if s.is_success() => Ok(Box::new(resp)),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound { url: url.to_string() }),
            s => Err(FetchError::transport(url, format!("http status {s}"))),
        }
    }
}
