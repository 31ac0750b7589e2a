//! HTTP transport behind a small capability trait.
//!
//! The RPC client and the relay sender only need `post(url, body, headers,
//! timeout) -> (status, body)`, so that is the whole interface. Production
//! uses a single long-lived reqwest client with keep-alive and HTTP/2;
//! tests use the in-memory double from [`mock`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

pub type SharedTransport = Arc<dyn HttpTransport>;

/// reqwest-backed transport. One client for the process lifetime; the
/// connection pool keeps sockets warm between calls.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(None)
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(format!("http client init: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url).timeout(timeout).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! In-memory transport double: queued responses, recorded requests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{HttpResponse, HttpTransport};
    use crate::error::{Error, Result};

    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, status: u16, body: impl Into<String>) {
            self.responses.lock().unwrap().push_back(HttpResponse {
                status,
                body: body.into(),
            });
        }

        pub fn push_result(&self, result: serde_json::Value) {
            self.push(
                200,
                serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string(),
            );
        }

        /// `(url, body)` pairs in send order.
        pub fn requests(&self) -> Vec<(String, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn post(
            &self,
            url: &str,
            body: String,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push((url.to_string(), body));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Network("mock response queue empty".into()))
        }
    }
}
