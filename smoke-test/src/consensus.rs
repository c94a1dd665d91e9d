// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    smoke_test_environment::{SmokeTestEnvironment, CHAIN_ID},
    test_utils::{random_account, sample_receipt},
};
use privnet_swarm::{NetworkError, NodeConfig, TxHash};

#[tokio::test]
async fn nodes_reach_consensus_on_a_receipt_despite_lag() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, _topology) = env.privacy_network().await?;

    // Each node misses the first few polls before the receipt shows up.
    env.chain.set_visibility_lag(3);
    let transaction = TxHash::from("0x00000000000000000000000000000000000000000000000000000000000000aa");
    env.chain
        .seed_receipt(&transaction, sample_receipt(&transaction));

    let receipt = network
        .await_consensus_on_transaction_receipt(&transaction)
        .await?;
    assert!(receipt.is_success());
    assert_eq!(receipt.transaction_hash, transaction.as_str());

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn consensus_is_undefined_below_two_nodes() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let mut network = env.network_builder().build().await?;
    network.add_node(NodeConfig::new(CHAIN_ID))?;
    network.start().await?;

    let transaction = TxHash::from("0x01");
    let err = network
        .await_consensus_on_transaction_receipt(&transaction)
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::InsufficientMembers(1)));

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn a_node_that_never_sees_the_receipt_forces_a_timeout() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    let transaction = TxHash::from("0x00000000000000000000000000000000000000000000000000000000000000bb");
    env.chain
        .seed_receipt(&transaction, sample_receipt(&transaction));
    env.chain
        .hide_receipt_from(&transaction, topology.node_b.as_str());

    let err = network
        .await_consensus_on_transaction_receipt(&transaction)
        .await
        .unwrap_err();
    let report = err.to_string();
    assert!(report.contains("not yet available"), "{}", report);
    assert!(report.contains(topology.node_b.as_str()), "{}", report);

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn hex_casing_differences_do_not_break_consensus() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    let transaction = TxHash::from("0x00000000000000000000000000000000000000000000000000000000000000cc");
    let receipt = sample_receipt(&transaction);
    env.chain.seed_receipt(&transaction, receipt.clone());

    // Same receipt, but one node renders its hex fields differently.
    let mut recased = receipt;
    recased.from = recased.from.to_uppercase().replace("0X", "0x");
    recased.block_hash = recased.block_hash.to_uppercase().replace("0X", "0x");
    recased.block_number = "0x02a".to_string();
    env.chain
        .override_receipt_on(&transaction, topology.node_b.as_str(), recased);

    network
        .await_consensus_on_transaction_receipt(&transaction)
        .await?;

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn a_diverging_success_flag_never_converges() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    let transaction = TxHash::from("0x00000000000000000000000000000000000000000000000000000000000000dd");
    let receipt = sample_receipt(&transaction);
    env.chain.seed_receipt(&transaction, receipt.clone());

    let mut failed = receipt;
    failed.status = "0x0".to_string();
    env.chain
        .override_receipt_on(&transaction, topology.node_b.as_str(), failed);

    let err = network
        .await_consensus_on_transaction_receipt(&transaction)
        .await
        .unwrap_err();
    let report = err.to_string();
    assert!(report.contains("not successful"), "{}", report);

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn nodes_reach_consensus_on_balances() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, _topology) = env.privacy_network().await?;

    let account = random_account();
    env.chain.set_balance(&account, 640_000);
    let balance = network.await_consensus_on_balance(&account).await?;
    assert_eq!(balance, 640_000);
    network.verify().consensus_on_value(&[&account]).await?;

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn a_diverging_balance_forces_a_timeout() -> anyhow::Result<()> {
    let env = SmokeTestEnvironment::new();
    let (mut network, topology) = env.privacy_network().await?;

    let account = random_account();
    env.chain.set_balance(&account, 100);
    env.chain
        .override_balance_on(topology.node_b.as_str(), &account, 99);

    let err = network
        .await_consensus_on_balance(&account)
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::Timeout(_)));

    network.close().await?;
    Ok(())
}
