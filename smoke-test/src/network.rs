// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::smoke_test_environment::{SmokeTestEnvironment, CHAIN_ID};
use privnet_swarm::{ConfigError, MemberState, NetworkError, NodeConfig, PrivacyManagerConfig};

#[tokio::test]
async fn start_brings_the_whole_topology_to_running() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    for member in network.members() {
        assert_eq!(member.state(), MemberState::Running, "{}", member.id());
    }
    assert_eq!(env.runtime.running_members().len(), 5);

    // The handles resolve back to their roles.
    assert_eq!(network.node(&topology.node_a)?.chain_id(), CHAIN_ID);
    assert_eq!(network.node(&topology.node_b)?.chain_id(), CHAIN_ID);
    assert_eq!(
        network.signer(&topology.signer_a)?.downstream(),
        &topology.node_a
    );
    assert_ne!(
        network.privacy_manager(&topology.privacy_a)?.identity(),
        network.privacy_manager(&topology.privacy_b)?.identity()
    );

    network.close().await?;
    for member in network.members() {
        assert_eq!(member.state(), MemberState::Stopped, "{}", member.id());
    }
    assert!(env.runtime.running_members().is_empty());
    assert_eq!(env.runtime.destroyed_networks().len(), 1);
    Ok(())
}

#[tokio::test]
async fn close_is_idempotent() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, _topology) = env.privacy_network().await?;

    network.close().await?;
    network.close().await?;
    assert_eq!(env.runtime.destroyed_networks().len(), 1);
    Ok(())
}

#[tokio::test]
async fn a_failed_launch_aborts_start_and_names_the_member() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let mut network = env.network_builder().build().await?;
    network.add_node(NodeConfig::new(CHAIN_ID))?;
    let doomed = network.add_node(NodeConfig::new(CHAIN_ID))?;
    env.runtime.fail_launch_of(doomed.as_str());

    let err = network.start().await.unwrap_err();
    match &err {
        NetworkError::Launch { member, .. } => assert_eq!(member, &doomed),
        other => panic!("unexpected error: {}", other),
    }

    // Teardown has to cope with the partial start.
    network.close().await?;
    assert!(env.runtime.running_members().is_empty());
    Ok(())
}

#[tokio::test]
async fn a_crashed_member_has_its_output_captured() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let mut network = env.network_builder().build().await?;
    let node = network.add_node(NodeConfig::new(CHAIN_ID))?;
    env.runtime.crash_on_start(node.as_str());

    let err = network.start().await.unwrap_err();
    match &err {
        NetworkError::Unhealthy { member, .. } => assert_eq!(member, &node),
        other => panic!("unexpected error: {}", other),
    }
    assert!(env
        .runtime
        .log_requests()
        .contains(&node.as_str().to_string()));

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn members_cannot_be_added_after_start() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let mut network = env.network_builder().build().await?;
    network.add_node(NodeConfig::new(CHAIN_ID))?;
    network.start().await?;

    let err = network.add_node(NodeConfig::new(CHAIN_ID)).unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Config(ConfigError::AddAfterStart)
    ));

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn a_network_starts_only_once() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let mut network = env.network_builder().build().await?;
    network.add_node(NodeConfig::new(CHAIN_ID))?;
    network.start().await?;

    assert!(matches!(
        network.start().await.unwrap_err(),
        NetworkError::AlreadyStarted
    ));

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn networks_sharing_a_pool_get_distinct_subnets() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let first = env.network_builder().build().await?;
    let second = env.network_builder().build().await?;
    assert_ne!(first.subnet().cidr(), second.subnet().cidr());
    Ok(())
}

#[tokio::test]
async fn a_privacy_manager_requires_key_material() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let mut network = env.network_builder().build().await?;
    let err = network
        .add_privacy_manager(PrivacyManagerConfig::new(Vec::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Config(ConfigError::MissingKeyPairs)
    ));
    Ok(())
}
