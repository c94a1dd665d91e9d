// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-role query surfaces and their JSON-RPC/REST implementations.
//!
//! The orchestration core only sees the [`NodeRpc`], [`PrivacyRpc`], and
//! [`SignerRpc`] traits; every call is fallible and callers decide whether
//! to poll it again. Nothing in here retries.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;

mod node;
mod privacy;
mod signer;
pub mod types;

pub use node::{JsonRpcNodeClient, NodeRpc};
pub use privacy::{PrivacyRpc, RestPrivacyClient};
pub use signer::{JsonRpcSignerClient, SignerRpc};

use types::PrivacyIdentity;

const JSON_RPC_VERSION: &str = "2.0";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

/// Shared HTTP plumbing for one member endpoint.
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_request_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self {
            http,
            url,
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Issues one JSON-RPC call and deserializes its result. A `null`
    /// result deserializes into `Option::None` when `R` is an `Option`.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: JSON_RPC_VERSION,
            method,
            params,
            id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
        };
        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(serde_json::from_value(response.result)?)
    }

    /// Issues one REST call against a path on the same endpoint.
    pub async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, RpcError> {
        let url = format!("{}{}", self.url, path);
        Ok(self
            .http
            .post(&url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

/// Creates the per-role clients bound to a member's endpoint.
///
/// The production factory builds JSON-RPC clients over a shared HTTP
/// connection pool; tests substitute a factory that returns in-memory
/// fakes.
pub trait ClientFactory: Send + Sync {
    fn node(&self, endpoint: &str) -> Arc<dyn NodeRpc>;
    fn privacy(&self, endpoint: &str, identity: PrivacyIdentity) -> Arc<dyn PrivacyRpc>;
    fn signer(&self, endpoint: &str) -> Arc<dyn SignerRpc>;
}

/// [`ClientFactory`] producing real wire clients.
#[derive(Default)]
pub struct JsonRpcFactory {
    http: reqwest::Client,
}

impl JsonRpcFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientFactory for JsonRpcFactory {
    fn node(&self, endpoint: &str) -> Arc<dyn NodeRpc> {
        Arc::new(JsonRpcNodeClient::new(JsonRpcClient::new(
            self.http.clone(),
            endpoint.to_string(),
        )))
    }

    fn privacy(&self, endpoint: &str, identity: PrivacyIdentity) -> Arc<dyn PrivacyRpc> {
        Arc::new(RestPrivacyClient::new(
            JsonRpcClient::new(self.http.clone(), endpoint.to_string()),
            identity,
        ))
    }

    fn signer(&self, endpoint: &str) -> Arc<dyn SignerRpc> {
        Arc::new(JsonRpcSignerClient::new(JsonRpcClient::new(
            self.http.clone(),
            endpoint.to_string(),
        )))
    }
}
