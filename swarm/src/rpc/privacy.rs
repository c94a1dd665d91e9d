// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::rpc::{types::PrivacyIdentity, JsonRpcClient, RpcError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Query surface of a privacy transaction manager.
#[async_trait]
pub trait PrivacyRpc: Send + Sync {
    /// Stores a payload for the given recipient, returning the receipt key
    /// under which the recipient can fetch it.
    async fn send(&self, to: &PrivacyIdentity, payload: &str) -> Result<String, RpcError>;

    /// Fetches a payload by receipt key; `None` until it is available on
    /// this manager.
    async fn receive(&self, key: &str) -> Result<Option<String>, RpcError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    payload: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    key: String,
}

#[derive(Serialize)]
struct ReceiveRequest<'a> {
    key: &'a str,
    to: &'a str,
}

#[derive(Deserialize)]
struct ReceiveResponse {
    #[serde(default)]
    payload: Option<String>,
}

/// REST client for a privacy manager, bound to the identity it sends as.
pub struct RestPrivacyClient {
    rpc: JsonRpcClient,
    identity: PrivacyIdentity,
}

impl RestPrivacyClient {
    pub fn new(rpc: JsonRpcClient, identity: PrivacyIdentity) -> Self {
        Self { rpc, identity }
    }
}

#[async_trait]
impl PrivacyRpc for RestPrivacyClient {
    async fn send(&self, to: &PrivacyIdentity, payload: &str) -> Result<String, RpcError> {
        let response: SendResponse = self
            .rpc
            .post(
                "/send",
                &SendRequest {
                    from: self.identity.as_str(),
                    to: vec![to.as_str()],
                    payload,
                },
            )
            .await?;
        Ok(response.key)
    }

    async fn receive(&self, key: &str) -> Result<Option<String>, RpcError> {
        let response: ReceiveResponse = self
            .rpc
            .post(
                "/receive",
                &ReceiveRequest {
                    key,
                    to: self.identity.as_str(),
                },
            )
            .await?;
        Ok(response.payload)
    }
}
