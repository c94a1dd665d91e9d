// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The network orchestrator.
//!
//! A [`Network`] owns every member added to it, in insertion order, plus
//! the private network they share and the directory their generated
//! configuration lives in. Members are added while the network is cold,
//! started in one parallel fan-out, and stopped the same way on close.

use crate::{
    member::{ConfigError, Member, MemberId},
    node::{ConsensusNode, NodeConfig, PrivacyBinding},
    privacy::{PrivacyManager, PrivacyManagerConfig},
    rpc::{
        types::{PrivacyTransactionReceipt, Transaction, TransactionReceipt, TxHash},
        ClientFactory, JsonRpcFactory, NodeRpc, PrivacyRpc,
    },
    runtime::{ContainerRuntime, HealthCheckError, NetworkHandle, RuntimeError},
    signer::{SignerConfig, SigningProxy},
    subnet::{Subnet, SubnetError, SubnetPool},
    verify::{self, NetworkVerifier},
};
use futures::future::join_all;
use privnet_retrier::{wait_until_with, PollPolicy, TimeoutError};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Subnet(#[from] SubnetError),
    #[error("failed to provision the private network: {source}")]
    Provision {
        #[source]
        source: RuntimeError,
    },
    #[error("failed to launch member {member}: {source}")]
    Launch {
        member: MemberId,
        #[source]
        source: RuntimeError,
    },
    #[error("member {member} failed before becoming healthy: {cause}")]
    Unhealthy {
        member: MemberId,
        cause: HealthCheckError,
    },
    #[error("runtime operation failed for member {member}: {source}")]
    Runtime {
        member: MemberId,
        #[source]
        source: RuntimeError,
    },
    #[error("rpc failure on member {member}: {source}")]
    Rpc {
        member: MemberId,
        #[source]
        source: crate::rpc::RpcError,
    },
    #[error("member {member} has no bound rpc client; was the network started?")]
    NotStarted { member: MemberId },
    #[error("member {member} cannot start from the {state:?} state")]
    Lifecycle {
        member: MemberId,
        state: crate::member::MemberState,
    },
    #[error("the network has already been started")]
    AlreadyStarted,
    #[error("consensus is undefined for fewer than two members, have {0}")]
    InsufficientMembers(usize),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a network keeps its generated configuration and logs.
#[derive(Debug)]
pub enum NetworkDirectory {
    Persistent(PathBuf),
    Temporary(TempDir),
}

impl AsRef<Path> for NetworkDirectory {
    fn as_ref(&self) -> &Path {
        match self {
            NetworkDirectory::Persistent(path) => path.as_path(),
            NetworkDirectory::Temporary(dir) => dir.path(),
        }
    }
}

pub struct NetworkBuilder {
    runtime: Arc<dyn ContainerRuntime>,
    clients: Option<Arc<dyn ClientFactory>>,
    subnet_pool: Option<Arc<SubnetPool>>,
    dir: Option<PathBuf>,
    policy: PollPolicy,
}

impl NetworkBuilder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            clients: None,
            subnet_pool: None,
            dir: None,
            policy: PollPolicy::default(),
        }
    }

    pub fn client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Shares a subnet pool with other networks in this process. Without
    /// one, the network draws from its own pool and must not run
    /// concurrently with another network doing the same.
    pub fn subnet_pool(mut self, pool: Arc<SubnetPool>) -> Self {
        self.subnet_pool = Some(pool);
        self
    }

    /// Keeps generated configuration under a persistent directory instead
    /// of a temporary one. An existing directory is wiped first.
    pub fn dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn build(self) -> Result<Network, NetworkError> {
        let dir = match self.dir {
            Some(dir) => {
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
                std::fs::create_dir_all(&dir)?;
                NetworkDirectory::Persistent(dir)
            }
            None => NetworkDirectory::Temporary(TempDir::new()?),
        };
        let pool = self
            .subnet_pool
            .unwrap_or_else(|| Arc::new(SubnetPool::new()));
        let subnet = pool.next_subnet()?;
        let handle = self
            .runtime
            .create_network(&subnet.cidr())
            .await
            .map_err(|source| NetworkError::Provision { source })?;
        info!("provisioned private network {} ({})", handle.id, handle.cidr);
        Ok(Network {
            members: Vec::new(),
            subnet,
            network: handle,
            runtime: self.runtime,
            clients: self
                .clients
                .unwrap_or_else(|| Arc::new(JsonRpcFactory::new())),
            dir,
            path_counter: AtomicUsize::new(0),
            uniqueifier: AtomicU64::new(0),
            policy: self.policy,
            started: false,
            closed: false,
        })
    }
}

pub struct Network {
    members: Vec<Member>,
    subnet: Subnet,
    network: NetworkHandle,
    runtime: Arc<dyn ContainerRuntime>,
    clients: Arc<dyn ClientFactory>,
    dir: NetworkDirectory,
    path_counter: AtomicUsize,
    uniqueifier: AtomicU64,
    policy: PollPolicy,
    started: bool,
    closed: bool,
}

impl Network {
    pub fn builder(runtime: Arc<dyn ContainerRuntime>) -> NetworkBuilder {
        NetworkBuilder::new(runtime)
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_ref()
    }

    pub fn subnet(&self) -> &Subnet {
        &self.subnet
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|member| member.id() == id)
    }

    pub fn consensus_nodes(&self) -> impl Iterator<Item = &ConsensusNode> {
        self.members.iter().filter_map(Member::as_node)
    }

    pub fn privacy_managers(&self) -> impl Iterator<Item = &PrivacyManager> {
        self.members.iter().filter_map(Member::as_privacy_manager)
    }

    pub fn signers(&self) -> impl Iterator<Item = &SigningProxy> {
        self.members.iter().filter_map(Member::as_signer)
    }

    pub fn node(&self, id: &MemberId) -> Result<&ConsensusNode, NetworkError> {
        let member = self
            .member(id)
            .ok_or_else(|| ConfigError::UnknownMember(id.clone()))?;
        member
            .as_node()
            .ok_or_else(|| ConfigError::NotANode(id.clone()).into())
    }

    pub fn privacy_manager(&self, id: &MemberId) -> Result<&PrivacyManager, NetworkError> {
        let member = self
            .member(id)
            .ok_or_else(|| ConfigError::UnknownMember(id.clone()))?;
        member
            .as_privacy_manager()
            .ok_or_else(|| ConfigError::NotAPrivacyManager(id.clone()).into())
    }

    pub fn signer(&self, id: &MemberId) -> Result<&SigningProxy, NetworkError> {
        let member = self
            .member(id)
            .ok_or_else(|| ConfigError::UnknownMember(id.clone()))?;
        member
            .as_signer()
            .ok_or_else(|| ConfigError::NotASigner(id.clone()).into())
    }

    pub fn verify(&self) -> NetworkVerifier<'_> {
        NetworkVerifier::new(self)
    }

    fn ensure_cold(&self) -> Result<(), NetworkError> {
        if self.started {
            Err(ConfigError::AddAfterStart.into())
        } else {
            Ok(())
        }
    }

    fn unique_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let n = self.path_counter.fetch_add(1, Ordering::Relaxed);
        self.dir
            .as_ref()
            .join(format!("{}-{:03}.{}", prefix, n, extension))
    }

    /// Adds a consensus node. Cross-references to a privacy manager or a
    /// bootnode are resolved now and captured by value.
    pub fn add_node(&mut self, config: NodeConfig) -> Result<MemberId, NetworkError> {
        self.ensure_cold()?;
        let privacy = match &config.privacy_manager {
            Some(id) => {
                let manager = self.privacy_manager(id)?;
                Some(PrivacyBinding {
                    address: manager.address(),
                    identity: manager.identity().clone(),
                })
            }
            None => None,
        };
        let bootnode = match &config.bootnode {
            Some(id) => Some(self.node(id)?.address()),
            None => None,
        };
        let address = self.subnet.allocate()?;
        let id = MemberId::new(format!("node-{}", self.members.len()));
        info!("adding consensus node {} at {}", id, address);
        self.members.push(Member::Node(ConsensusNode::new(
            id.clone(),
            address,
            config,
            privacy,
            bootnode,
            self.network.clone(),
        )));
        Ok(id)
    }

    /// Adds a privacy manager. Every previously added manager becomes a
    /// boot node of the new one, and the manager's config file is written
    /// before this returns.
    pub fn add_privacy_manager(
        &mut self,
        config: PrivacyManagerConfig,
    ) -> Result<MemberId, NetworkError> {
        self.ensure_cold()?;
        let peer_urls: Vec<String> = self
            .privacy_managers()
            .map(|manager| manager.peer_url())
            .collect();
        let address = self.subnet.allocate()?;
        let id = MemberId::new(format!("privacy-{}", self.members.len()));
        let config_path = self.unique_path("privacy", "conf");
        info!("adding privacy manager {} at {}", id, address);
        self.members.push(Member::PrivacyManager(PrivacyManager::new(
            id.clone(),
            address,
            config,
            peer_urls,
            config_path,
            self.network.clone(),
        )?));
        Ok(id)
    }

    /// Adds a signing proxy bound to an already added consensus node.
    pub fn add_signer(&mut self, config: SignerConfig) -> Result<MemberId, NetworkError> {
        self.ensure_cold()?;
        let downstream = self.node(&config.downstream)?;
        let downstream_address = downstream.address();
        let chain_id = downstream.chain_id();
        let address = self.subnet.allocate()?;
        let id = MemberId::new(format!("signer-{}", self.members.len()));
        info!(
            "adding signing proxy {} at {} for node {}",
            id, address, config.downstream
        );
        self.members.push(Member::Signer(SigningProxy::new(
            id.clone(),
            address,
            config.downstream,
            downstream_address,
            chain_id,
            self.network.clone(),
        )));
        Ok(id)
    }

    /// Starts every member in parallel, then confirms every declared
    /// connectivity pair. Returns once the whole topology is up, or with
    /// the first failure after all starts have settled.
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        if self.started {
            return Err(NetworkError::AlreadyStarted);
        }
        self.started = true;
        info!(
            "starting network {} with {} members",
            self.network.id,
            self.members.len()
        );
        let results = join_all(
            self.members
                .iter()
                .map(|member| member.start(&self.runtime, &self.clients, self.policy)),
        )
        .await;
        for result in results {
            result?;
        }
        self.await_connectivity().await?;
        info!("network {} is up", self.network.id);
        Ok(())
    }

    /// Stops every member in parallel. Safe to call on a network that never
    /// started or only partially started.
    pub async fn stop(&self) -> Result<(), NetworkError> {
        let results = join_all(self.members.iter().map(|member| member.stop(&self.runtime))).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Stops the members and releases the private network. Calling close
    /// again is a no-op.
    pub async fn close(&mut self) -> Result<(), NetworkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("closing network {}", self.network.id);
        let stopped = self.stop().await;
        let destroyed = self
            .runtime
            .destroy_network(&self.network)
            .await
            .map_err(|source| NetworkError::Provision { source });
        stopped.and(destroyed)
    }

    async fn await_connectivity(&self) -> Result<(), NetworkError> {
        let nodes: Vec<&ConsensusNode> = self.consensus_nodes().collect();
        let expected_peers = nodes.len().saturating_sub(1);
        for result in join_all(
            nodes
                .iter()
                .map(|node| node.await_peers(expected_peers, self.policy)),
        )
        .await
        {
            result?;
        }

        let managers: Vec<&PrivacyManager> = self.privacy_managers().collect();
        let mut round_trips = Vec::new();
        for sender in &managers {
            for receiver in &managers {
                if sender.id() != receiver.id() {
                    let nonce = self.uniqueifier.fetch_add(1, Ordering::Relaxed);
                    round_trips.push(sender.await_round_trip(receiver, nonce, self.policy));
                }
            }
        }
        for result in join_all(round_trips).await {
            result?;
        }

        let signers: Vec<&SigningProxy> = self.signers().collect();
        for result in join_all(
            signers
                .iter()
                .map(|signer| signer.await_downstream(self.policy)),
        )
        .await
        {
            result?;
        }
        Ok(())
    }

    fn node_clients(&self) -> Result<Vec<(MemberId, Arc<dyn NodeRpc>)>, NetworkError> {
        let nodes: Vec<&ConsensusNode> = self.consensus_nodes().collect();
        if nodes.len() < 2 {
            return Err(NetworkError::InsufficientMembers(nodes.len()));
        }
        nodes
            .into_iter()
            .map(|node| Ok((node.id().clone(), node.rpc()?)))
            .collect()
    }

    /// Waits until every consensus node returns an identical, successful
    /// receipt for `transaction`.
    pub async fn await_consensus_on_transaction_receipt(
        &self,
        transaction: &TxHash,
    ) -> Result<TransactionReceipt, NetworkError> {
        let clients = self.node_clients()?;
        let description = format!("consensus on the receipt for transaction {}", transaction);
        let receipt = wait_until_with(self.policy, &description, || {
            let clients = clients.clone();
            let transaction = transaction.clone();
            Box::pin(async move {
                let results = join_all(clients.iter().map(|(member, rpc)| {
                    let member = member.clone();
                    let rpc = Arc::clone(rpc);
                    let transaction = transaction.clone();
                    async move { (member, rpc.get_transaction_receipt(&transaction).await) }
                }))
                .await;
                let mut values = Vec::with_capacity(results.len());
                for (member, result) in results {
                    let receipt = result.map_err(|err| {
                        format!("receipt query failed on member {}: {}", member, err)
                    })?;
                    if let Some(receipt) = &receipt {
                        if !receipt.is_success() {
                            return Err(format!(
                                "receipt on member {} is not successful (status {})",
                                member, receipt.status
                            ));
                        }
                    }
                    values.push((member, receipt));
                }
                verify::all_present_and_agreed("the transaction receipt", &values)
                    .map(Clone::clone)
            })
        })
        .await?;
        Ok(receipt)
    }

    /// Waits until every consensus node returns an identical, processed
    /// record for `transaction`.
    pub async fn await_consensus_on_transaction(
        &self,
        transaction: &TxHash,
    ) -> Result<Transaction, NetworkError> {
        let clients = self.node_clients()?;
        let description = format!("consensus on transaction {}", transaction);
        let record = wait_until_with(self.policy, &description, || {
            let clients = clients.clone();
            let transaction = transaction.clone();
            Box::pin(async move {
                let results = join_all(clients.iter().map(|(member, rpc)| {
                    let member = member.clone();
                    let rpc = Arc::clone(rpc);
                    let transaction = transaction.clone();
                    async move { (member, rpc.get_transaction_by_hash(&transaction).await) }
                }))
                .await;
                let mut values = Vec::with_capacity(results.len());
                for (member, result) in results {
                    let record = result.map_err(|err| {
                        format!("transaction query failed on member {}: {}", member, err)
                    })?;
                    if let Some(record) = &record {
                        if !record.is_processed() {
                            return Err(format!(
                                "transaction is not yet in a block on member {}",
                                member
                            ));
                        }
                    }
                    values.push((member, record));
                }
                verify::all_present_and_agreed("the transaction", &values).map(Clone::clone)
            })
        })
        .await?;
        Ok(record)
    }

    /// Waits until every consensus node returns an identical, successful
    /// privacy receipt for `transaction`.
    pub async fn await_consensus_on_privacy_transaction_receipt(
        &self,
        transaction: &TxHash,
    ) -> Result<PrivacyTransactionReceipt, NetworkError> {
        let clients = self.node_clients()?;
        let description = format!(
            "consensus on the privacy receipt for transaction {}",
            transaction
        );
        let receipt = wait_until_with(self.policy, &description, || {
            let clients = clients.clone();
            let transaction = transaction.clone();
            Box::pin(async move {
                let results = join_all(clients.iter().map(|(member, rpc)| {
                    let member = member.clone();
                    let rpc = Arc::clone(rpc);
                    let transaction = transaction.clone();
                    async move {
                        (
                            member,
                            rpc.get_privacy_transaction_receipt(&transaction).await,
                        )
                    }
                }))
                .await;
                let mut values = Vec::with_capacity(results.len());
                for (member, result) in results {
                    let receipt = result.map_err(|err| {
                        format!("privacy receipt query failed on member {}: {}", member, err)
                    })?;
                    if let Some(receipt) = &receipt {
                        if !receipt.is_success() {
                            return Err(format!(
                                "privacy receipt on member {} is not successful (status {})",
                                member, receipt.status
                            ));
                        }
                    }
                    values.push((member, receipt));
                }
                verify::all_present_and_agreed("the privacy receipt", &values).map(Clone::clone)
            })
        })
        .await?;
        Ok(receipt)
    }

    /// Waits until every consensus node reports the same balance for
    /// `account`.
    pub async fn await_consensus_on_balance(&self, account: &str) -> Result<u128, NetworkError> {
        let clients = self.node_clients()?;
        let description = format!("consensus on the balance of {}", account);
        let balance = wait_until_with(self.policy, &description, || {
            let clients = clients.clone();
            let account = account.to_string();
            Box::pin(async move {
                let results = join_all(clients.iter().map(|(member, rpc)| {
                    let member = member.clone();
                    let rpc = Arc::clone(rpc);
                    let account = account.clone();
                    async move { (member, rpc.get_balance(&account).await) }
                }))
                .await;
                let mut values = Vec::with_capacity(results.len());
                for (member, result) in results {
                    let balance = result.map_err(|err| {
                        format!("balance query failed on member {}: {}", member, err)
                    })?;
                    values.push((member, Some(balance)));
                }
                verify::all_present_and_agreed("the balance", &values).map(|balance| *balance)
            })
        })
        .await?;
        Ok(balance)
    }

    /// Waits until every listed privacy manager holds an identical payload
    /// under `key`.
    pub async fn await_consensus_on_privacy_payload(
        &self,
        members: &[MemberId],
        key: &str,
    ) -> Result<String, NetworkError> {
        if members.len() < 2 {
            return Err(NetworkError::InsufficientMembers(members.len()));
        }
        let clients: Vec<(MemberId, Arc<dyn PrivacyRpc>)> = members
            .iter()
            .map(|id| Ok((id.clone(), self.privacy_manager(id)?.rpc()?)))
            .collect::<Result<_, NetworkError>>()?;
        let description = format!("an identical confidential payload under key {}", key);
        let payload = wait_until_with(self.policy, &description, || {
            let clients = clients.clone();
            let key = key.to_string();
            Box::pin(async move {
                let results = join_all(clients.iter().map(|(member, rpc)| {
                    let member = member.clone();
                    let rpc = Arc::clone(rpc);
                    let key = key.clone();
                    async move { (member, rpc.receive(&key).await) }
                }))
                .await;
                let mut values = Vec::with_capacity(results.len());
                for (member, result) in results {
                    let payload = result.map_err(|err| {
                        format!("payload fetch failed on member {}: {}", member, err)
                    })?;
                    values.push((member, payload));
                }
                verify::all_present_and_agreed("the confidential payload", &values)
                    .map(Clone::clone)
            })
        })
        .await?;
        Ok(payload)
    }
}
