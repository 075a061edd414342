//! Network probes used by health checks.
//!
//! The monitor only depends on the traits; tests plug in their own
//! implementations.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::ProbeError;

/// Issues one HTTP GET and reports the status code.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

/// Attempts one TCP connect.
#[async_trait]
pub trait TcpProbe: Send + Sync {
    /// Returns true if a connection was established within `timeout`.
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// [`HttpProbe`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    /// Creates a probe that talks to the server directly, ignoring any
    /// system proxy.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        trace!(url, "probing server");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Request(e.to_string())
                }
            })?;
        Ok(response.status().as_u16())
    }
}

/// [`TcpProbe`] backed by `tokio::net`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTcpProbe;

#[async_trait]
impl TcpProbe for TokioTcpProbe {
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                trace!(host, port, error = %e, "tcp connect failed");
                false
            }
            Err(_) => {
                trace!(host, port, "tcp connect timed out");
                false
            }
        }
    }
}
