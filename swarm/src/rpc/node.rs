// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::rpc::{
    types::{
        parse_quantity, ConnectedPeer, PrivacyTransactionReceipt, Transaction,
        TransactionReceipt, TxHash,
    },
    JsonRpcClient, RpcError,
};
use async_trait::async_trait;
use serde_json::json;

/// Query surface of a consensus node.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, RpcError>;

    async fn get_transaction_by_hash(
        &self,
        hash: &TxHash,
    ) -> Result<Option<Transaction>, RpcError>;

    async fn get_balance(&self, account: &str) -> Result<u128, RpcError>;

    async fn get_privacy_transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<PrivacyTransactionReceipt>, RpcError>;

    async fn connected_peers(&self) -> Result<usize, RpcError>;
}

pub struct JsonRpcNodeClient {
    rpc: JsonRpcClient,
}

impl JsonRpcNodeClient {
    pub fn new(rpc: JsonRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl NodeRpc for JsonRpcNodeClient {
    async fn get_transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.rpc
            .call("eth_getTransactionReceipt", json!([hash.as_str()]))
            .await
    }

    async fn get_transaction_by_hash(
        &self,
        hash: &TxHash,
    ) -> Result<Option<Transaction>, RpcError> {
        self.rpc
            .call("eth_getTransactionByHash", json!([hash.as_str()]))
            .await
    }

    async fn get_balance(&self, account: &str) -> Result<u128, RpcError> {
        let quantity: String = self
            .rpc
            .call("eth_getBalance", json!([account, "latest"]))
            .await?;
        parse_quantity(&quantity).map_err(|err| RpcError::Rpc {
            code: -1,
            message: format!("balance {:?} is not a hex quantity: {}", quantity, err),
        })
    }

    async fn get_privacy_transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<PrivacyTransactionReceipt>, RpcError> {
        self.rpc
            .call("priv_getTransactionReceipt", json!([hash.as_str()]))
            .await
    }

    async fn connected_peers(&self) -> Result<usize, RpcError> {
        let peers: Vec<ConnectedPeer> = self.rpc.call("admin_peers", json!([])).await?;
        Ok(peers.len())
    }
}
