//! A mock transport for testing RPC consumers without a node.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::RpcTransport;
use crate::error::RpcError;

/// A transport programmed with per-route responses.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Result<Value, RpcError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program the response returned for the next request to `route`.
    pub async fn push_response(&self, route: &str, response: Result<Value, RpcError>) {
        self.responses.lock().await.insert(route.to_string(), response);
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn request(&self, route: &str, _params: Value) -> Result<Value, RpcError> {
        match self.responses.lock().await.remove(route) {
            Some(response) => response,
            None => Err(RpcError::Response {
                route: route.to_string(),
                status: 500,
                message: "MockTransport: no response programmed for this route".to_string(),
            }),
        }
    }
}
