//! HTTP transport for account requests.

use crate::config::NetworkConfig;
use crate::error::{Result, TrackError};

/// Response to a request that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Performs one GET request.
///
/// `Err` means no response was obtained at all; any HTTP status is `Ok`.
pub trait LogoutTransport: Send + Sync {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<TransportResponse>;
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    #[cfg_attr(not(feature = "network"), allow(dead_code))]
    timeout_ms: u64,
    #[cfg_attr(not(feature = "network"), allow(dead_code))]
    user_agent: String,
}

impl HttpTransport {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            user_agent: config.user_agent.clone(),
        }
    }
}

#[cfg(feature = "network")]
impl LogoutTransport for HttpTransport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<TransportResponse> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| TrackError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let response = client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| TrackError::ConnectionFailed {
                reason: if e.is_timeout() {
                    format!("Timed out after {}ms", self.timeout_ms)
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TrackError::ConnectionFailed {
                reason: format!("Failed to read response body: {}", e),
            })?
            .trim()
            .to_string();

        Ok(TransportResponse { status, body })
    }
}

#[cfg(not(feature = "network"))]
impl LogoutTransport for HttpTransport {
    fn get(&self, _url: &str, _query: &[(&str, String)]) -> Result<TransportResponse> {
        Err(TrackError::ConnectionFailed {
            reason: "Network support not compiled. Build with --features network".to_string(),
        })
    }
}
