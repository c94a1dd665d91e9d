// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signing proxy members.
//!
//! A proxy fronts exactly one consensus node. The downstream address and
//! chain id are captured when the member is added; construction order, not
//! start order, carries the dependency.

use crate::{
    member::{start_member_process, stop_process, MemberId, MemberState, ProcessCell},
    network::NetworkError,
    node,
    rpc::{
        types::{PrivacyIdentity, TxHash},
        ClientFactory, SignerRpc,
    },
    runtime::{ContainerRuntime, HttpProbe, LaunchSpec, NetworkHandle},
};
use privnet_retrier::{wait_until_with, PollPolicy};
use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex},
};
use tracing::info;

const SIGNER_IMAGE: &str = "privnet/signer:latest";
pub(crate) const RPC_PORT: u16 = 8545;
const UPCHECK_PATH: &str = "/upcheck";
const ALIVE_STATUS: u16 = 200;

/// Immutable configuration of a signing proxy.
#[derive(Clone, Debug)]
pub struct SignerConfig {
    pub downstream: MemberId,
}

impl SignerConfig {
    pub fn new(downstream: MemberId) -> Self {
        Self { downstream }
    }
}

pub struct SigningProxy {
    id: MemberId,
    address: Ipv4Addr,
    downstream: MemberId,
    downstream_address: Ipv4Addr,
    chain_id: u64,
    network: NetworkHandle,
    cell: ProcessCell,
    rpc: Mutex<Option<Arc<dyn SignerRpc>>>,
}

impl SigningProxy {
    pub(crate) fn new(
        id: MemberId,
        address: Ipv4Addr,
        downstream: MemberId,
        downstream_address: Ipv4Addr,
        chain_id: u64,
        network: NetworkHandle,
    ) -> Self {
        Self {
            id,
            address,
            downstream,
            downstream_address,
            chain_id,
            network,
            cell: ProcessCell::new(),
            rpc: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn downstream(&self) -> &MemberId {
        &self.downstream
    }

    pub fn state(&self) -> MemberState {
        self.cell.state()
    }

    /// The proxy's bound query client. Available once the member is
    /// running.
    pub fn rpc(&self) -> Result<Arc<dyn SignerRpc>, NetworkError> {
        self.rpc
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| NetworkError::NotStarted {
                member: self.id.clone(),
            })
    }

    /// Submits a confidential contract deployment through this proxy.
    pub async fn deploy_contract_to_privacy_group(
        &self,
        binary: &str,
        private_from: &PrivacyIdentity,
        private_for: &[PrivacyIdentity],
    ) -> Result<TxHash, NetworkError> {
        self.rpc()?
            .deploy_contract_to_privacy_group(binary, private_from, private_for)
            .await
            .map_err(|source| NetworkError::Rpc {
                member: self.id.clone(),
                source,
            })
    }

    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            member: self.id.to_string(),
            image: SIGNER_IMAGE.to_string(),
            command: vec![
                "--logging=INFO".to_string(),
                "--data-path=/opt/signer/data".to_string(),
                "--http-listen-host=0.0.0.0".to_string(),
                format!("--http-listen-port={}", RPC_PORT),
                format!("--chain-id={}", self.chain_id),
                format!("--downstream-http-host={}", self.downstream_address),
                format!("--downstream-http-port={}", node::RPC_PORT),
            ],
            env: Vec::new(),
            binds: Vec::new(),
            network: self.network.clone(),
            address: self.address,
            ports: vec![RPC_PORT],
            readiness: HttpProbe {
                port: RPC_PORT,
                path: UPCHECK_PATH.to_string(),
                status: ALIVE_STATUS,
            },
        }
    }

    pub(crate) async fn start(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
        clients: &Arc<dyn ClientFactory>,
        policy: PollPolicy,
    ) -> Result<(), NetworkError> {
        info!(
            "starting signing proxy {} at {} for node {}",
            self.id, self.address, self.downstream
        );
        let (handle, endpoint) = start_member_process(
            runtime,
            &self.cell,
            &self.id,
            self.launch_spec(),
            RPC_PORT,
            policy,
        )
        .await?;
        *self.rpc.lock().unwrap() = Some(clients.signer(&endpoint));
        self.cell.mark_running(handle);
        info!("signing proxy {} is running", self.id);
        Ok(())
    }

    pub(crate) async fn stop(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
    ) -> Result<(), NetworkError> {
        stop_process(runtime, &self.cell, &self.id).await
    }

    /// The proxy is connected once a call routed through it reaches its
    /// downstream node.
    pub(crate) async fn await_downstream(&self, policy: PollPolicy) -> Result<(), NetworkError> {
        let rpc = self.rpc()?;
        let description = format!(
            "signing proxy {} to reach its downstream node {}",
            self.id, self.downstream
        );
        wait_until_with(policy, &description, || {
            let rpc = Arc::clone(&rpc);
            Box::pin(async move {
                rpc.block_number()
                    .await
                    .map(|_| ())
                    .map_err(|err| err.to_string())
            })
        })
        .await?;
        Ok(())
    }
}
