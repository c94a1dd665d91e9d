// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use privnet_swarm::rpc::types::{TransactionReceipt, TxHash};

/// Compiled bytecode of a trivial storage contract, enough to stand in for
/// a real deployment payload.
pub const SIMPLE_STORAGE_BINARY: &str =
    "0x608060405234801561001057600080fd5b50610150806100206000396000f3fe";

pub fn random_account() -> String {
    format!("0x{:040x}", rand::random::<u128>())
}

/// A successful receipt for `transaction`, identical wherever it is
/// seeded.
pub fn sample_receipt(transaction: &TxHash) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: transaction.as_str().to_string(),
        block_hash: "0x71e75959863e5c4c0b04cbc15784e01e103ba4f3eebc145885120a319a2b0af0"
            .to_string(),
        block_number: "0x2a".to_string(),
        contract_address: None,
        from: "0xf17f52151ebef6c7334fad080c5704d77216b732".to_string(),
        to: Some("0x627306090abab3a6e1400e9345bc60c78a8bef57".to_string()),
        cumulative_gas_used: "0x5208".to_string(),
        gas_used: "0x5208".to_string(),
        status: "0x1".to_string(),
    }
}
