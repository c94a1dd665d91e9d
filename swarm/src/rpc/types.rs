// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire models shared by the per-role clients, and the normalization rules
//! used when comparing them across members.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A transaction hash as returned on the wire, `0x`-prefixed hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn new<S: Into<String>>(hash: S) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxHash {
    fn from(hash: &str) -> Self {
        Self::new(hash)
    }
}

/// Public identity of a privacy manager, the content of its public key
/// file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrivacyIdentity(String);

impl PrivacyIdentity {
    pub fn new<S: Into<String>>(identity: S) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrivacyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strips a leading `0x`/`0X` if present.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Case-insensitive comparison of hex fields, ignoring the `0x` prefix.
pub fn hex_eq(a: &str, b: &str) -> bool {
    strip_hex_prefix(a).eq_ignore_ascii_case(strip_hex_prefix(b))
}

pub fn opt_hex_eq(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => hex_eq(a, b),
        _ => false,
    }
}

/// Parses a hex quantity (`0x5208`) into its numeric value.
pub fn parse_quantity(value: &str) -> Result<u128, std::num::ParseIntError> {
    u128::from_str_radix(strip_hex_prefix(value), 16)
}

/// Compares quantity fields by numeric value, so `0x0` equals `0x00`.
/// Falls back to normalized hex comparison when a side does not parse.
pub fn quantity_eq(a: &str, b: &str) -> bool {
    match (parse_quantity(a), parse_quantity(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => hex_eq(a, b),
    }
}

const SUCCESS_STATUS: u128 = 1;

/// Receipt for a transaction that made it into a block.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: String,
    #[serde(default)]
    pub contract_address: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub cumulative_gas_used: String,
    pub gas_used: String,
    pub status: String,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        parse_quantity(&self.status) == Ok(SUCCESS_STATUS)
    }
}

/// A transaction record as reported by a node.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub gas: String,
    pub gas_price: String,
    pub input: String,
    pub nonce: String,
    pub value: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

impl Transaction {
    /// A transaction is processed once a node has placed it in a block.
    pub fn is_processed(&self) -> bool {
        self.block_hash.is_some()
    }
}

/// Receipt for the confidential leg of a privacy transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyTransactionReceipt {
    #[serde(default)]
    pub contract_address: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub output: String,
    pub status: String,
    pub private_from: String,
    pub private_for: Vec<String>,
}

impl PrivacyTransactionReceipt {
    pub fn is_success(&self) -> bool {
        parse_quantity(&self.status) == Ok(SUCCESS_STATUS)
    }
}

/// One entry of a node's connected-peer listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectedPeer {
    #[serde(default)]
    pub id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_compare_by_value() {
        assert!(quantity_eq("0x0", "0x00"));
        assert!(quantity_eq("0x5208", "0x5208"));
        assert!(!quantity_eq("0x1", "0x2"));
    }

    #[test]
    fn hex_comparison_ignores_case_and_prefix() {
        assert!(hex_eq("0xAbCd", "abcd"));
        assert!(hex_eq("0XFF", "0xff"));
        assert!(!hex_eq("0x01", "0x02"));
    }

    #[test]
    fn receipt_status_drives_success() {
        let receipt: TransactionReceipt = serde_json::from_str(
            r#"{
                "transactionHash": "0x01",
                "blockHash": "0x02",
                "blockNumber": "0x1",
                "contractAddress": null,
                "from": "0xf17f52151ebef6c7334fad080c5704d77216b732",
                "to": null,
                "cumulativeGasUsed": "0x5208",
                "gasUsed": "0x5208",
                "status": "0x1"
            }"#,
        )
        .unwrap();
        assert!(receipt.is_success());
        assert!(receipt.contract_address.is_none());

        let failed = TransactionReceipt {
            status: "0x0".to_string(),
            ..receipt
        };
        assert!(!failed.is_success());
    }

    #[test]
    fn transactions_are_processed_once_in_a_block() {
        let mut transaction: Transaction = serde_json::from_str(
            r#"{
                "hash": "0x01",
                "from": "0xf17f52151ebef6c7334fad080c5704d77216b732",
                "gas": "0x5208",
                "gasPrice": "0x3b9aca00",
                "input": "0x",
                "nonce": "0x0",
                "value": "0x0",
                "blockHash": "0x02",
                "blockNumber": "0x1"
            }"#,
        )
        .unwrap();
        assert!(transaction.is_processed());
        transaction.block_hash = None;
        assert!(!transaction.is_processed());
    }
}
