//! HTTP transport contract (spec.md §4.4).
//!
//! Grounded in the teacher's direct `reqwest::Client` usage in
//! `anthropic.rs`/`openai.rs`: build a request, `.send().await`, drain
//! `.bytes_stream()`. The spec's synchronous callback contract
//! (`post(..., on_chunk) -> bool`) is realized idiomatically as an async
//! byte stream the engine drives itself chunk-by-chunk, checking
//! cancellation between chunks — the engine plays the role of the
//! "callback" (spec.md §9's own redesign note: type the streaming context
//! explicitly rather than keep an untyped callback pointer).

use crate::error::TransportError;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A streaming HTTP transport used by every provider adapter.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(
        &self,
        path: &str,
        headers: &HashMap<String, String>,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError>;

    async fn get(
        &self,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes, TransportError>;

    fn set_verify_tls(&self, verify: bool);
    fn set_connect_timeout(&self, timeout: Duration);
    fn set_read_timeout(&self, timeout: Duration);
    fn set_write_timeout(&self, timeout: Duration);
    fn set_headers(&self, headers: HashMap<String, String>);

    /// Ask any in-flight request to abort at its next chunk boundary.
    fn interrupt(&self);
}

/// `reqwest`-backed transport. The client is rebuilt lazily when TLS
/// verification or timeouts change, since `reqwest::Client` configuration
/// is immutable once built.
pub struct ReqwestTransport {
    base_url: String,
    client: RwLock<reqwest::Client>,
    verify_tls: AtomicBool,
    connect_timeout: RwLock<Duration>,
    read_timeout: RwLock<Duration>,
    write_timeout: RwLock<Duration>,
    default_headers: RwLock<HashMap<String, String>>,
    interrupted: Arc<AtomicBool>,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_verify_tls(base_url, true)
    }

    /// Build a transport whose client already honors `verify_tls`, so an
    /// endpoint configured with TLS verification disabled doesn't silently
    /// verify anyway until some later call rebuilds the client.
    pub fn with_verify_tls(base_url: impl Into<String>, verify_tls: bool) -> Self {
        let connect_timeout = Duration::from_secs(10);
        let read_timeout = Duration::from_secs(120);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client: RwLock::new(client),
            verify_tls: AtomicBool::new(verify_tls),
            connect_timeout: RwLock::new(connect_timeout),
            read_timeout: RwLock::new(read_timeout),
            write_timeout: RwLock::new(Duration::from_secs(120)),
            default_headers: RwLock::new(HashMap::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn rebuild_client(&self) -> Result<(), TransportError> {
        let connect_timeout = *self.connect_timeout.read().await;
        let read_timeout = *self.read_timeout.read().await;
        let verify_tls = self.verify_tls.load(Ordering::Relaxed);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(TransportError::Reqwest)?;
        *self.client.write().await = client;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Clear the interrupt flag ahead of a new request.
    pub fn reset_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        path: &str,
        headers: &HashMap<String, String>,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
        self.reset_interrupt();
        let client = self.client.read().await.clone();
        let mut req = client
            .post(self.url(path))
            .header("content-type", content_type)
            .body(body);
        for (k, v) in self.default_headers.read().await.iter() {
            req = req.header(k, v);
        }
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let write_timeout = *self.write_timeout.read().await;
        let response = tokio::time::timeout(write_timeout, req.send())
            .await
            .map_err(|_| TransportError::Write("request send timed out".to_string()))?
            .map_err(TransportError::Reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let interrupted = self.interrupted.clone();
        let stream = response.bytes_stream().map(move |chunk| {
            if interrupted.load(Ordering::SeqCst) {
                return Err(TransportError::Interrupted);
            }
            chunk.map_err(TransportError::Reqwest)
        });
        Ok(Box::pin(stream))
    }

    async fn get(
        &self,
        path: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes, TransportError> {
        let client = self.client.read().await.clone();
        let mut req = client.get(self.url(path));
        for (k, v) in self.default_headers.read().await.iter() {
            req = req.header(k, v);
        }
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let response = req.send().await.map_err(TransportError::Reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response.bytes().await.map_err(TransportError::Reqwest)
    }

    fn set_verify_tls(&self, verify: bool) {
        self.verify_tls.store(verify, Ordering::Relaxed);
        // Applied on next request; rebuilt lazily via `post`/`get` would add
        // an await to a sync fn, so callers that need it immediately call
        // `rebuild_client` explicitly via the async setters below.
    }

    fn set_connect_timeout(&self, timeout: Duration) {
        if let Ok(mut guard) = self.connect_timeout.try_write() {
            *guard = timeout;
        }
    }

    fn set_read_timeout(&self, timeout: Duration) {
        if let Ok(mut guard) = self.read_timeout.try_write() {
            *guard = timeout;
        }
    }

    fn set_write_timeout(&self, timeout: Duration) {
        if let Ok(mut guard) = self.write_timeout.try_write() {
            *guard = timeout;
        }
    }

    /// Headers sent with every request, merged under any per-call `headers`
    /// passed to `post`/`get` (a per-call header of the same name wins).
    fn set_headers(&self, headers: HashMap<String, String>) {
        if let Ok(mut guard) = self.default_headers.try_write() {
            *guard = headers;
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

impl ReqwestTransport {
    /// Apply any pending TLS/timeout changes by rebuilding the underlying
    /// client. Call after `set_verify_tls`/`set_connect_timeout`/
    /// `set_read_timeout` when the change must take effect before the next
    /// request is built lazily.
    pub async fn apply_settings(&self) -> Result<(), TransportError> {
        self.rebuild_client().await
    }
}
