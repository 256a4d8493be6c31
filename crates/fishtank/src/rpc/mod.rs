//! The node RPC collaborator.
//!
//! The engine depends only on a handful of query shapes; a generic
//! [`RpcTransport`] carries route + params and the typed [`RpcClient`]
//! wrappers sit on top, so tests can program a [`mock::MockTransport`]
//! instead of dialing a socket.

pub mod mock;
pub mod tcp;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

pub use tcp::TcpTransport;

/// A generic transport carrying one RPC request to the node.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send a request for `route` and return the response payload. Non-2xx
    /// responses surface as [`RpcError::Response`] with the reported status.
    async fn request(&self, route: &str, params: Value) -> Result<Value, RpcError>;
}

/// Typed client over an [`RpcTransport`].
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient").field("transport", &"<dyn RpcTransport>").finish()
    }
}

impl RpcClient {
    pub fn new(transport: impl RpcTransport + 'static) -> Self {
        Self { transport: Arc::new(transport) }
    }

    async fn request<P, R>(&self, route: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let params =
            serde_json::to_value(params).map_err(|e| RpcError::Codec(e.to_string()))?;
        let response = self.transport.request(route, params).await?;
        serde_json::from_value(response).map_err(|e| RpcError::Codec(e.to_string()))
    }

    /// `node/getStatus`: lifecycle, chain head, sync state, and wallet scan
    /// head in one report.
    pub async fn get_status(&self) -> Result<NodeStatusReport, RpcError> {
        self.request("node/getStatus", Value::Null).await
    }

    /// `chain/getTransaction`: succeeds once the transaction is on a block;
    /// reports status 404 while it is not found.
    pub async fn get_transaction(&self, transaction_hash: &str) -> Result<(), RpcError> {
        let _: Value = self
            .request(
                "chain/getTransaction",
                serde_json::json!({ "transactionHash": transaction_hash }),
            )
            .await?;
        Ok(())
    }

    /// `wallet/getBalance` for the default account.
    pub async fn get_account_balance(&self) -> Result<AccountBalance, RpcError> {
        self.request("wallet/getBalance", Value::Null).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusReport {
    pub node: NodeReport,
    pub blockchain: BlockchainReport,
    #[serde(default)]
    pub accounts: AccountsReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainReport {
    pub head: ChainHead,
    #[serde(default)]
    pub synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainHead {
    pub hash: String,
    pub sequence: u64,
}

/// Wallet scanning progress; `head` is absent until the first scan starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<ChainHead>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    /// Decimal string on the wire; the node reports amounts in ore.
    pub available: String,
}

impl AccountBalance {
    pub fn available_amount(&self) -> Result<u128, RpcError> {
        self.available
            .parse()
            .map_err(|_| RpcError::Codec(format!("unparseable balance {:?}", self.available)))
    }
}
