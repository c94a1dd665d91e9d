// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Consensus node members.

use crate::{
    member::{start_member_process, stop_process, MemberId, MemberState, ProcessCell},
    network::NetworkError,
    privacy,
    rpc::{types::PrivacyIdentity, ClientFactory, NodeRpc},
    runtime::{ContainerRuntime, HttpProbe, LaunchSpec, NetworkHandle},
};
use privnet_retrier::{wait_until_with, PollPolicy};
use std::{
    net::Ipv4Addr,
    sync::{Arc, Mutex},
};
use tracing::info;

const NODE_IMAGE: &str = "privnet/node:latest";
pub(crate) const RPC_PORT: u16 = 8545;
const P2P_PORT: u16 = 30303;
const LIVENESS_PATH: &str = "/liveness";
const ALIVE_STATUS: u16 = 200;

/// Immutable configuration of a consensus node, fixed before the member is
/// added.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub chain_id: u64,
    pub privacy_manager: Option<MemberId>,
    pub bootnode: Option<MemberId>,
}

impl NodeConfig {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            privacy_manager: None,
            bootnode: None,
        }
    }

    pub fn with_privacy_manager(mut self, manager: MemberId) -> Self {
        self.privacy_manager = Some(manager);
        self
    }

    pub fn with_bootnode(mut self, node: MemberId) -> Self {
        self.bootnode = Some(node);
        self
    }
}

/// Privacy manager coordinates captured when the node is added, so the
/// node never holds a reference back into the network.
#[derive(Clone, Debug)]
pub(crate) struct PrivacyBinding {
    pub(crate) address: Ipv4Addr,
    pub(crate) identity: PrivacyIdentity,
}

pub struct ConsensusNode {
    id: MemberId,
    address: Ipv4Addr,
    chain_id: u64,
    privacy: Option<PrivacyBinding>,
    bootnode: Option<Ipv4Addr>,
    network: NetworkHandle,
    cell: ProcessCell,
    rpc: Mutex<Option<Arc<dyn NodeRpc>>>,
}

impl ConsensusNode {
    pub(crate) fn new(
        id: MemberId,
        address: Ipv4Addr,
        config: NodeConfig,
        privacy: Option<PrivacyBinding>,
        bootnode: Option<Ipv4Addr>,
        network: NetworkHandle,
    ) -> Self {
        Self {
            id,
            address,
            chain_id: config.chain_id,
            privacy,
            bootnode,
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

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn state(&self) -> MemberState {
        self.cell.state()
    }

    /// The node's bound query client. Available once the member is running.
    pub fn rpc(&self) -> Result<Arc<dyn NodeRpc>, NetworkError> {
        self.rpc
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| NetworkError::NotStarted {
                member: self.id.clone(),
            })
    }

    fn launch_spec(&self) -> LaunchSpec {
        let mut command = vec![
            "--data-path=/opt/privnet/data".to_string(),
            "--rpc-http-enabled".to_string(),
            format!("--rpc-http-port={}", RPC_PORT),
            format!("--p2p-port={}", P2P_PORT),
            format!("--p2p-host={}", self.address),
            format!("--chain-id={}", self.chain_id),
            "--host-allowlist=*".to_string(),
        ];
        if let Some(bootnode) = self.bootnode {
            command.push(format!("--bootnodes=http://{}:{}", bootnode, P2P_PORT));
        }
        if let Some(privacy) = &self.privacy {
            command.push("--privacy-enabled".to_string());
            command.push(format!(
                "--privacy-url=http://{}:{}",
                privacy.address,
                privacy::CLIENT_PORT
            ));
            command.push(format!("--privacy-public-key={}", privacy.identity));
        }
        LaunchSpec {
            member: self.id.to_string(),
            image: NODE_IMAGE.to_string(),
            command,
            env: Vec::new(),
            binds: Vec::new(),
            network: self.network.clone(),
            address: self.address,
            ports: vec![RPC_PORT, P2P_PORT],
            readiness: HttpProbe {
                port: RPC_PORT,
                path: LIVENESS_PATH.to_string(),
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
        info!("starting consensus node {} at {}", self.id, self.address);
        let (handle, endpoint) = start_member_process(
            runtime,
            &self.cell,
            &self.id,
            self.launch_spec(),
            RPC_PORT,
            policy,
        )
        .await?;
        *self.rpc.lock().unwrap() = Some(clients.node(&endpoint));
        self.cell.mark_running(handle);
        info!("consensus node {} is running", self.id);
        Ok(())
    }

    pub(crate) async fn stop(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
    ) -> Result<(), NetworkError> {
        stop_process(runtime, &self.cell, &self.id).await
    }

    /// Waits until this node reports at least `expected` connected peers.
    pub(crate) async fn await_peers(
        &self,
        expected: usize,
        policy: PollPolicy,
    ) -> Result<(), NetworkError> {
        if expected == 0 {
            return Ok(());
        }
        let rpc = self.rpc()?;
        let description = format!("node {} to connect to {} peers", self.id, expected);
        wait_until_with(policy, &description, || {
            let rpc = Arc::clone(&rpc);
            Box::pin(async move {
                let peers = rpc.connected_peers().await.map_err(|err| err.to_string())?;
                if peers >= expected {
                    Ok(())
                } else {
                    Err(format!("connected to {} of {} peers", peers, expected))
                }
            })
        })
        .await?;
        Ok(())
    }
}
