// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use privnet_retrier::PollPolicy;
use privnet_swarm::{
    testing::{FakeChain, FakeClientFactory, FakeRuntime},
    Network, NetworkBuilder, NodeConfig, PrivacyKeyPair, PrivacyManagerConfig, SignerConfig,
    SubnetPool,
};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

pub const CHAIN_ID: u64 = 1337;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
});

/// Polls fast enough that negative tests exhaust their deadline in well
/// under a second.
pub fn fast_poll_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(10), Duration::from_millis(500))
}

/// Shared fixtures for one test: a fake runtime, a fake chain, and a
/// subnet pool common to every network the test builds.
pub struct SmokeTestEnvironment {
    pub runtime: Arc<FakeRuntime>,
    pub chain: Arc<FakeChain>,
    pub subnet_pool: Arc<SubnetPool>,
    key_dir: TempDir,
}

/// Member ids of the reference privacy topology.
pub struct PrivacyTopology {
    pub privacy_a: privnet_swarm::MemberId,
    pub node_a: privnet_swarm::MemberId,
    pub signer_a: privnet_swarm::MemberId,
    pub privacy_b: privnet_swarm::MemberId,
    pub node_b: privnet_swarm::MemberId,
}

impl SmokeTestEnvironment {
    pub fn new() -> Self {
        Lazy::force(&TRACING);
        Self {
            runtime: Arc::new(FakeRuntime::new()),
            chain: FakeChain::new(),
            subnet_pool: Arc::new(SubnetPool::new()),
            key_dir: TempDir::new().expect("could not create a key directory"),
        }
    }

    pub fn network_builder(&self) -> NetworkBuilder {
        Network::builder(self.runtime.clone())
            .client_factory(Arc::new(FakeClientFactory::new(self.chain.clone())))
            .subnet_pool(self.subnet_pool.clone())
            .poll_policy(fast_poll_policy())
    }

    /// Writes a fresh public/private key pair to disk and returns the
    /// paths.
    pub fn generate_key_pair(&self, name: &str) -> PrivacyKeyPair {
        let public_key = self.key_dir.path().join(format!("{}.pub", name));
        let private_key = self.key_dir.path().join(format!("{}.key", name));
        std::fs::write(&public_key, format!("{}-public-key\n", name))
            .expect("could not write public key");
        std::fs::write(&private_key, format!("{}-private-key\n", name))
            .expect("could not write private key");
        PrivacyKeyPair {
            public_key,
            private_key,
        }
    }

    /// Builds and starts the reference topology: privacy manager A, node A
    /// bound to it, a signing proxy on node A, then privacy manager B
    /// (bootstrapped through A) and node B bound to B.
    pub async fn privacy_network(&self) -> anyhow::Result<(Network, PrivacyTopology)> {
        let mut network = self.network_builder().build().await?;

        let privacy_a = network.add_privacy_manager(PrivacyManagerConfig::new(vec![
            self.generate_key_pair("alpha")
        ]))?;
        let node_a = network
            .add_node(NodeConfig::new(CHAIN_ID).with_privacy_manager(privacy_a.clone()))?;
        let signer_a = network.add_signer(SignerConfig::new(node_a.clone()))?;

        let privacy_b = network.add_privacy_manager(PrivacyManagerConfig::new(vec![
            self.generate_key_pair("beta")
        ]))?;
        let node_b = network.add_node(
            NodeConfig::new(CHAIN_ID)
                .with_privacy_manager(privacy_b.clone())
                .with_bootnode(node_a.clone()),
        )?;

        network.start().await?;
        Ok((
            network,
            PrivacyTopology {
                privacy_a,
                node_a,
                signer_a,
                privacy_b,
                node_b,
            },
        ))
    }
}
