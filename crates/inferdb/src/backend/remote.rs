//! Remote backend client: operations serialized over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value as Json, json};

use crate::error::{EngineError, Result};

use super::BackendClient;

/// Default request timeout; analyze calls can run long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Backend client that sends each operation to a network endpoint.
///
/// The wire format is a JSON-RPC-shaped envelope: `{method, params, id}`
/// out, `{result}` or `{error}` back. Connection, serialization, and
/// backend-reported failures all map to `EngineError::Backend`.
pub struct RemoteClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RemoteClient {
    /// Create a client for the backend at `host:port`.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Backend(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("http://{}:{}", host, port),
            next_id: AtomicU64::new(1),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Json>,
    #[serde(default)]
    error: Option<Json>,
}

impl BackendClient for RemoteClient {
    fn invoke(&self, operation: &str, params: Json) -> Result<Json> {
        let body = json!({
            "method": operation,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::Backend(format!("Backend at {} is unreachable: {}", self.url, e))
                } else {
                    EngineError::Backend(format!("Backend request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(EngineError::Backend(format!(
                "Backend error ({}): {}",
                status, text
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .map_err(|e| EngineError::Backend(format!("Failed to parse backend response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(EngineError::Backend(format!(
                "Backend reported failure for '{}': {}",
                operation, error
            )));
        }
        parsed
            .result
            .ok_or_else(|| EngineError::Backend("Backend response had no result".to_string()))
    }
}
