//! HTTP transport used by the fetch client
//!
//! The transport performs exactly one request. Rate limiting, retries and
//! rotation are layered on top of it by `FetchClient`.

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// One outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: Url,
    pub user_agent: Option<String>,

    /// Proxy to route through, or None for a direct connection
    pub proxy: Option<String>,
}

/// A received response, any status
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,

    /// URL after redirects
    pub final_url: Url,
}

/// Kind of transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// The response body could not be read
    Body,
    /// Any other failure while sending
    Request,
    /// The client itself could not be built (bad proxy URL, TLS setup)
    Client,
}

/// A request that produced no response
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns true if the same request may succeed when repeated
    pub fn is_transient(&self) -> bool {
        !matches!(self.kind, TransportErrorKind::Client)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// Performs single HTTP GET requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Production transport backed by `reqwest`
///
/// One pooled client is kept per proxy (and one for direct connections),
/// since reqwest binds proxies at client construction.
pub struct ReqwestTransport {
    timeout: Duration,
    connect_timeout: Duration,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    /// Creates a transport with the given request and connect timeouts
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the client for `proxy`, building it on first use
    fn client_for(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        let key = proxy.map(str::to_string);
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .gzip(true)
            .brotli(true);

        if let Some(proxy_url) = proxy {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Client,
                    format!("invalid proxy {}: {}", proxy_url, e),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Client, e.to_string()))?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let client = self.client_for(request.proxy.as_deref())?;

        let mut builder = client.get(request.url.clone());
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, user_agent);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(TransportErrorKind::Body, e.to_string()))?;

        Ok(TransportResponse {
            status,
            body,
            final_url,
        })
    }
}

/// Maps a reqwest send error to a transport error kind
fn classify(error: reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else if error.is_builder() {
        TransportErrorKind::Client
    } else {
        TransportErrorKind::Request
    };
    TransportError::new(kind, error.to_string())
}
