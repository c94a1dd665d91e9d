// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    smoke_test_environment::SmokeTestEnvironment,
    test_utils::SIMPLE_STORAGE_BINARY,
};

#[tokio::test]
async fn the_marker_transaction_is_identical_on_every_node() -> anyhow::Result<()> {
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
    let transaction = network
        .signer(&topology.signer_a)?
        .deploy_contract_to_privacy_group(SIMPLE_STORAGE_BINARY, &private_from, &private_for)
        .await?;

    let record = network.verify().consensus_on_transaction(&transaction).await?;
    assert!(record.is_processed());
    assert_eq!(record.hash, transaction.as_str());

    network.close().await?;
    Ok(())
}

#[tokio::test]
async fn the_privacy_receipt_is_identical_on_every_node() -> anyhow::Result<()> {
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
    let transaction = network
        .signer(&topology.signer_a)?
        .deploy_contract_to_privacy_group(SIMPLE_STORAGE_BINARY, &private_from, &private_for)
        .await?;

    let receipt = network
        .verify()
        .consensus_on_privacy_transaction_receipt(&transaction)
        .await?;
    assert!(receipt.is_success());
    assert_eq!(receipt.private_from, private_from.as_str());
    assert_eq!(receipt.private_for, vec![private_for[0].as_str().to_string()]);

    network.close().await?;
    Ok(())
}
