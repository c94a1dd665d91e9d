// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Agreement rules for observables fetched from multiple members.
//!
//! Agreement is structural, never identity: hex fields compare
//! case-insensitively with the `0x` prefix normalized away, quantity fields
//! compare by numeric value, and anything missing on any member keeps the
//! surrounding poll unsatisfied rather than failing it, because a lagging
//! member is indistinguishable from a diverged one until the deadline.

use crate::{
    member::MemberId,
    network::{Network, NetworkError},
    rpc::types::{
        hex_eq, opt_hex_eq, quantity_eq, PrivacyTransactionReceipt, Transaction,
        TransactionReceipt, TxHash,
    },
};

/// Structural agreement between two observations of the same observable.
pub trait Agrees {
    fn agrees(&self, other: &Self) -> bool;
}

impl Agrees for TransactionReceipt {
    fn agrees(&self, other: &Self) -> bool {
        hex_eq(&self.transaction_hash, &other.transaction_hash)
            && hex_eq(&self.block_hash, &other.block_hash)
            && quantity_eq(&self.block_number, &other.block_number)
            && opt_hex_eq(&self.contract_address, &other.contract_address)
            && hex_eq(&self.from, &other.from)
            && opt_hex_eq(&self.to, &other.to)
            && quantity_eq(&self.cumulative_gas_used, &other.cumulative_gas_used)
            && quantity_eq(&self.gas_used, &other.gas_used)
            && quantity_eq(&self.status, &other.status)
    }
}

impl Agrees for Transaction {
    fn agrees(&self, other: &Self) -> bool {
        hex_eq(&self.hash, &other.hash)
            && hex_eq(&self.from, &other.from)
            && opt_hex_eq(&self.to, &other.to)
            && quantity_eq(&self.gas, &other.gas)
            && quantity_eq(&self.gas_price, &other.gas_price)
            && hex_eq(&self.input, &other.input)
            && quantity_eq(&self.nonce, &other.nonce)
            && quantity_eq(&self.value, &other.value)
            && opt_hex_eq(&self.block_hash, &other.block_hash)
    }
}

impl Agrees for PrivacyTransactionReceipt {
    fn agrees(&self, other: &Self) -> bool {
        opt_hex_eq(&self.contract_address, &other.contract_address)
            && hex_eq(&self.from, &other.from)
            && opt_hex_eq(&self.to, &other.to)
            && hex_eq(&self.output, &other.output)
            && quantity_eq(&self.status, &other.status)
            && self.private_from == other.private_from
            && self.private_for == other.private_for
    }
}

impl Agrees for u128 {
    fn agrees(&self, other: &Self) -> bool {
        self == other
    }
}

/// Confidential payloads must be byte-identical.
impl Agrees for String {
    fn agrees(&self, other: &Self) -> bool {
        self == other
    }
}

/// Checks that every member produced a value and that all values agree
/// with the first. The `Err` string describes which member is lagging or
/// diverging, for embedding in a timeout report.
pub(crate) fn all_present_and_agreed<'a, T: Agrees>(
    what: &str,
    values: &'a [(MemberId, Option<T>)],
) -> Result<&'a T, String> {
    let mut present = Vec::with_capacity(values.len());
    for (member, value) in values {
        match value {
            Some(value) => present.push((member, value)),
            None => return Err(format!("{} not yet available on member {}", what, member)),
        }
    }
    if present.is_empty() {
        return Err(format!("{} was fetched from no members", what));
    }
    let (first_member, first) = present[0];
    for (member, value) in &present[1..] {
        if !value.agrees(first) {
            return Err(format!(
                "{} on member {} does not match member {}",
                what, member, first_member
            ));
        }
    }
    Ok(first)
}

/// Consensus checks over a running [`Network`].
pub struct NetworkVerifier<'a> {
    network: &'a Network,
}

impl<'a> NetworkVerifier<'a> {
    pub(crate) fn new(network: &'a Network) -> Self {
        Self { network }
    }

    /// All consensus nodes agree on the balance of every given account.
    pub async fn consensus_on_value(&self, accounts: &[&str]) -> Result<(), NetworkError> {
        for account in accounts {
            self.network.await_consensus_on_balance(account).await?;
        }
        Ok(())
    }

    /// All consensus nodes hold an identical, successful receipt.
    pub async fn consensus_on_transaction_receipt(
        &self,
        transaction: &TxHash,
    ) -> Result<TransactionReceipt, NetworkError> {
        self.network
            .await_consensus_on_transaction_receipt(transaction)
            .await
    }

    /// All consensus nodes hold an identical, processed transaction record.
    pub async fn consensus_on_transaction(
        &self,
        transaction: &TxHash,
    ) -> Result<Transaction, NetworkError> {
        self.network
            .await_consensus_on_transaction(transaction)
            .await
    }

    /// All consensus nodes hold an identical, successful privacy receipt.
    pub async fn consensus_on_privacy_transaction_receipt(
        &self,
        transaction: &TxHash,
    ) -> Result<PrivacyTransactionReceipt, NetworkError> {
        self.network
            .await_consensus_on_privacy_transaction_receipt(transaction)
            .await
    }

    /// The given privacy managers all hold the identical payload under
    /// `key`.
    pub async fn privacy_group_payload(
        &self,
        members: &[MemberId],
        key: &str,
    ) -> Result<String, NetworkError> {
        self.network
            .await_consensus_on_privacy_payload(members, key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: "0xABCDEF0123".to_string(),
            block_hash: "0x02".to_string(),
            block_number: "0x10".to_string(),
            contract_address: Some("0xC0FFEE".to_string()),
            from: "0xF17F52151ebEF6C7334FAD080c5704D77216b732".to_string(),
            to: None,
            cumulative_gas_used: "0x5208".to_string(),
            gas_used: "0x5208".to_string(),
            status: "0x1".to_string(),
        }
    }

    fn member(name: &str) -> MemberId {
        MemberId::new(name.to_string())
    }

    #[test]
    fn receipts_agree_across_hex_casing() {
        let a = receipt();
        let mut b = receipt();
        b.transaction_hash = "0xabcdef0123".to_string();
        b.contract_address = Some("0xc0ffee".to_string());
        b.from = b.from.to_lowercase();
        b.block_number = "0x010".to_string();
        assert!(a.agrees(&b));
    }

    #[test]
    fn receipts_disagree_on_the_success_flag() {
        let a = receipt();
        let mut b = receipt();
        b.status = "0x0".to_string();
        assert!(!a.agrees(&b));
    }

    #[test]
    fn a_missing_value_reads_as_not_yet_available() {
        let values = vec![
            (member("node-0"), Some(receipt())),
            (member("node-1"), None),
        ];
        let err = all_present_and_agreed("the receipt", &values).unwrap_err();
        assert!(err.contains("node-1"));
        assert!(err.contains("not yet available"));
    }

    #[test]
    fn a_diverging_member_is_named() {
        let mut diverged = receipt();
        diverged.block_hash = "0x99".to_string();
        let values = vec![
            (member("node-0"), Some(receipt())),
            (member("node-1"), Some(diverged)),
        ];
        let err = all_present_and_agreed("the receipt", &values).unwrap_err();
        assert!(err.contains("node-1"));
        assert!(err.contains("does not match"));
    }

    #[test]
    fn agreement_holds_for_identical_observations() {
        let values = vec![
            (member("node-0"), Some(receipt())),
            (member("node-1"), Some(receipt())),
        ];
        let agreed = all_present_and_agreed("the receipt", &values).unwrap();
        assert!(agreed.is_success());
    }
}
