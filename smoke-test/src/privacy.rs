// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    smoke_test_environment::SmokeTestEnvironment,
    test_utils::SIMPLE_STORAGE_BINARY,
};
use privnet_swarm::rpc::types::strip_hex_prefix;

#[tokio::test]
async fn a_confidential_deployment_reaches_the_whole_privacy_group() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    let private_from = network
        .privacy_manager(&topology.privacy_a)?
        .identity()
        .clone();
    let private_for = vec![network
        .privacy_manager(&topology.privacy_b)?
        .identity()
        .clone()];

    // Submit through the proxy, then insist both nodes agree on every
    // observable the deployment produced.
    let transaction = network
        .signer(&topology.signer_a)?
        .deploy_contract_to_privacy_group(SIMPLE_STORAGE_BINARY, &private_from, &private_for)
        .await?;

    let receipt = network
        .verify()
        .consensus_on_transaction_receipt(&transaction)
        .await?;
    assert!(receipt.is_success());

    let marker = network.verify().consensus_on_transaction(&transaction).await?;
    assert!(marker.is_processed());

    // The marker transaction's input encodes the key the payload was
    // stored under.
    let key = String::from_utf8(hex::decode(strip_hex_prefix(&marker.input))?)?;

    let group = [topology.privacy_a.clone(), topology.privacy_b.clone()];
    let payload = network.verify().privacy_group_payload(&group, &key).await?;
    assert_eq!(payload, SIMPLE_STORAGE_BINARY);

    let payload_a = network
        .privacy_manager(&topology.privacy_a)?
        .get_payload(&key)
        .await?;
    let payload_b = network
        .privacy_manager(&topology.privacy_b)?
        .get_payload(&key)
        .await?;
    assert_eq!(payload_a, payload_b);
    assert_eq!(payload_a.as_deref(), Some(SIMPLE_STORAGE_BINARY));

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn a_payload_missing_on_one_manager_forces_a_timeout() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    env.chain.store_payload("key-under-test", "0xdeadbeef");
    env.chain
        .hide_payload_from(topology.privacy_b.as_str(), "key-under-test");

    let group = [topology.privacy_a.clone(), topology.privacy_b.clone()];
    let err = network
        .verify()
        .privacy_group_payload(&group, "key-under-test")
        .await
        .unwrap_err();
    let report = err.to_string();
    assert!(report.contains("not yet available"), "{}", report);
    assert!(report.contains(topology.privacy_b.as_str()), "{}", report);

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn privacy_managers_are_bootstrapped_through_their_predecessors() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    let manager_a = network.privacy_manager(&topology.privacy_a)?;
    let manager_b = network.privacy_manager(&topology.privacy_b)?;

    // The first manager started with no peers; the second one lists the
    // first as a boot node in its generated config file.
    let config_a = std::fs::read_to_string(manager_a.config_path())?;
    let config_b = std::fs::read_to_string(manager_b.config_path())?;
    assert!(!config_a.contains("othernodes"), "{}", config_a);
    assert!(
        config_b.contains(&format!("othernodes = [\"{}\"]", manager_a.peer_url())),
        "{}",
        config_b
    );
    assert!(config_b.contains("publickeys"), "{}", config_b);
    assert!(config_b.contains("clientport = 8888"), "{}", config_b);

    // And the launch carried the config file into the container.
    let launched = env.runtime.launched_specs();
    let spec = launched
        .iter()
        .find(|spec| spec.member == topology.privacy_b.as_str())
        .expect("privacy manager was launched");
    assert!(spec
        .binds
        .iter()
        .any(|bind| bind.target == "/etc/privacy/config.conf"));

    network.close().await?;
    Ok(())
}
