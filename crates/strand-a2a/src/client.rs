use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use strand_core::error::{Result, StrandError};

use crate::types::*;

/// JSON-RPC client for handing work to a remote agent.
pub struct DelegationClient {
    http: Client,
    next_id: AtomicI64,
}

impl DelegationClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StrandError::Transport(e.to_string()))?;
        Ok(Self::with_http(http))
    }

    pub fn with_http(http: Client) -> Self {
        Self {
            http,
            next_id: AtomicI64::new(0),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Send `message` to the agent at `endpoint` and return the resulting task.
    pub async fn send_message(&self, endpoint: &str, message: Message) -> Result<Task> {
        let request = JsonRpcRequest::new(
            self.next_id(),
            SEND_MESSAGE_METHOD,
            SendMessageParams {
                message,
                configuration: Some(SendMessageConfig::default()),
            },
        );

        debug!(endpoint = %endpoint, id = request.id, "Sending delegation request");

        let response = self
            .http
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| StrandError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StrandError::Transport(e.to_string()))?;

        let parsed = serde_json::from_str::<JsonRpcResponse>(&body);

        if !status.is_success() {
            // A JSON-RPC error body wins over the bare status.
            if let Ok(JsonRpcResponse {
                error: Some(err), ..
            }) = parsed
            {
                return Err(StrandError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            warn!(endpoint = %endpoint, status = %status, "Delegation endpoint returned non-success status");
            return Err(StrandError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let rpc = parsed.map_err(|e| StrandError::Protocol(format!("decode response: {}", e)))?;
        if let Some(err) = rpc.error {
            return Err(StrandError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = rpc
            .result
            .ok_or_else(|| StrandError::Protocol("response has neither result nor error".into()))?;
        serde_json::from_value(result)
            .map_err(|e| StrandError::Protocol(format!("decode task: {}", e)))
    }
}
