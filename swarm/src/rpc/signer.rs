// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::rpc::{
    types::{parse_quantity, PrivacyIdentity, TxHash},
    JsonRpcClient, RpcError,
};
use async_trait::async_trait;
use serde_json::json;

/// Query surface of a signing proxy.
#[async_trait]
pub trait SignerRpc: Send + Sync {
    /// Submits a confidential contract deployment for the given privacy
    /// group, returning the hash of the resulting marker transaction.
    async fn deploy_contract_to_privacy_group(
        &self,
        binary: &str,
        private_from: &PrivacyIdentity,
        private_for: &[PrivacyIdentity],
    ) -> Result<TxHash, RpcError>;

    /// Chain head as seen through the proxy. Succeeds only when the proxy
    /// can reach its downstream node.
    async fn block_number(&self) -> Result<u64, RpcError>;
}

pub struct JsonRpcSignerClient {
    rpc: JsonRpcClient,
}

impl JsonRpcSignerClient {
    pub fn new(rpc: JsonRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SignerRpc for JsonRpcSignerClient {
    async fn deploy_contract_to_privacy_group(
        &self,
        binary: &str,
        private_from: &PrivacyIdentity,
        private_for: &[PrivacyIdentity],
    ) -> Result<TxHash, RpcError> {
        let recipients: Vec<&str> = private_for.iter().map(PrivacyIdentity::as_str).collect();
        let hash: String = self
            .rpc
            .call(
                "eea_sendTransaction",
                json!([{
                    "data": binary,
                    "privateFrom": private_from.as_str(),
                    "privateFor": recipients,
                    "restriction": "restricted",
                }]),
            )
            .await?;
        Ok(TxHash::new(hash))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let quantity: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
            .map(|value| value as u64)
            .map_err(|err| RpcError::Rpc {
                code: -1,
                message: format!("block number {:?} is not a hex quantity: {}", quantity, err),
            })
    }
}
