// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! A single in-memory "chain" observed through per-member fake clients.
//!
//! The chain holds one true value per observable and models distributed
//! lag on top: each member sees a seeded value only after a configurable
//! number of fetches, can be given a diverging override, or can be made to
//! never see it at all.

use crate::rpc::{
    types::{
        strip_hex_prefix, PrivacyIdentity, PrivacyTransactionReceipt, Transaction,
        TransactionReceipt, TxHash,
    },
    ClientFactory, NodeRpc, PrivacyRpc, RpcError, SignerRpc,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

const DEPLOYER_ACCOUNT: &str = "0xf17f52151ebef6c7334fad080c5704d77216b732";
const PRIVACY_PRECOMPILE: &str = "0x000000000000000000000000000000000000007e";
const CONTRACT_ADDRESS: &str = "0x42699a7612a82f1d9c36148af9c77354759b210b";

/// One observable plus the per-member view of it.
struct Observed<T> {
    value: T,
    delays: HashMap<String, u32>,
    overrides: HashMap<String, T>,
    hidden: HashSet<String>,
}

impl<T: Clone> Observed<T> {
    fn new(value: T, lag: u32, members: &[String]) -> Self {
        Self {
            value,
            delays: members.iter().map(|member| (member.clone(), lag)).collect(),
            overrides: HashMap::new(),
            hidden: HashSet::new(),
        }
    }

    fn fetch(&mut self, member: &str) -> Option<T> {
        if self.hidden.contains(member) {
            return None;
        }
        if let Some(remaining) = self.delays.get_mut(member) {
            if *remaining > 0 {
                *remaining -= 1;
                return None;
            }
        }
        Some(
            self.overrides
                .get(member)
                .cloned()
                .unwrap_or_else(|| self.value.clone()),
        )
    }
}

#[derive(Default)]
struct ChainState {
    nodes: Vec<String>,
    receipts: HashMap<String, Observed<TransactionReceipt>>,
    transactions: HashMap<String, Observed<Transaction>>,
    privacy_receipts: HashMap<String, Observed<PrivacyTransactionReceipt>>,
    balances: HashMap<String, u128>,
    balance_overrides: HashMap<(String, String), u128>,
    payloads: HashMap<String, String>,
    payload_delays: HashMap<(String, String), u32>,
    payload_hidden: HashSet<(String, String)>,
    peer_count: Option<usize>,
    next_sequence: u64,
}

fn hash_key(hash: &TxHash) -> String {
    strip_hex_prefix(hash.as_str()).to_lowercase()
}

/// Shared ledger state behind every fake client.
pub struct FakeChain {
    state: Mutex<ChainState>,
    visibility_lag: AtomicU32,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            visibility_lag: AtomicU32::new(1),
        }
    }
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of fetches each member misses before a freshly written
    /// observable becomes visible to it.
    pub fn set_visibility_lag(&self, polls: u32) {
        self.visibility_lag.store(polls, Ordering::Relaxed);
    }

    fn lag(&self) -> u32 {
        self.visibility_lag.load(Ordering::Relaxed)
    }

    fn register_node(&self, member: &str) {
        let mut state = self.state.lock().unwrap();
        if !state.nodes.iter().any(|node| node == member) {
            state.nodes.push(member.to_string());
        }
    }

    pub fn set_peer_count(&self, peers: usize) {
        self.state.lock().unwrap().peer_count = Some(peers);
    }

    pub fn seed_receipt(&self, transaction: &TxHash, receipt: TransactionReceipt) {
        let lag = self.lag();
        let mut state = self.state.lock().unwrap();
        let nodes = state.nodes.clone();
        state
            .receipts
            .insert(hash_key(transaction), Observed::new(receipt, lag, &nodes));
    }

    /// Replaces what one member sees for a seeded receipt.
    pub fn override_receipt_on(
        &self,
        transaction: &TxHash,
        member: &str,
        receipt: TransactionReceipt,
    ) {
        let mut state = self.state.lock().unwrap();
        if let Some(observed) = state.receipts.get_mut(&hash_key(transaction)) {
            observed.overrides.insert(member.to_string(), receipt);
        }
    }

    /// The given member never sees a receipt for this transaction.
    pub fn hide_receipt_from(&self, transaction: &TxHash, member: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(observed) = state.receipts.get_mut(&hash_key(transaction)) {
            observed.hidden.insert(member.to_string());
        }
    }

    pub fn seed_transaction(&self, transaction: &TxHash, record: Transaction) {
        let lag = self.lag();
        let mut state = self.state.lock().unwrap();
        let nodes = state.nodes.clone();
        state
            .transactions
            .insert(hash_key(transaction), Observed::new(record, lag, &nodes));
    }

    pub fn set_balance(&self, account: &str, value: u128) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(account.to_lowercase(), value);
    }

    /// One member reports a diverging balance for the account.
    pub fn override_balance_on(&self, member: &str, account: &str, value: u128) {
        self.state
            .lock()
            .unwrap()
            .balance_overrides
            .insert((member.to_string(), account.to_lowercase()), value);
    }

    pub fn store_payload(&self, key: &str, payload: &str) {
        self.state
            .lock()
            .unwrap()
            .payloads
            .insert(key.to_string(), payload.to_string());
    }

    pub fn delay_payload_on(&self, member: &str, key: &str, polls: u32) {
        self.state
            .lock()
            .unwrap()
            .payload_delays
            .insert((member.to_string(), key.to_string()), polls);
    }

    /// The given manager never sees the payload under `key`.
    pub fn hide_payload_from(&self, member: &str, key: &str) {
        self.state
            .lock()
            .unwrap()
            .payload_hidden
            .insert((member.to_string(), key.to_string()));
    }

    /// Records a confidential contract deployment the way a signing proxy
    /// would: a successful marker receipt, the marker transaction whose
    /// input encodes the payload key, the privacy receipt, and the stored
    /// payload itself.
    fn deploy(
        &self,
        private_from: &PrivacyIdentity,
        private_for: &[PrivacyIdentity],
        binary: &str,
    ) -> TxHash {
        let lag = self.lag();
        let mut state = self.state.lock().unwrap();
        let n = state.next_sequence;
        state.next_sequence += 1;

        let transaction = TxHash::new(format!("0x{:064x}", n + 1));
        let block_hash = format!("0x{:064x}", 0xb10c_0000_u64 + n);
        let block_number = format!("0x{:x}", n + 1);
        let payload_key = format!("payload-{}", n);
        let nodes = state.nodes.clone();

        state
            .payloads
            .insert(payload_key.clone(), binary.to_string());

        let receipt = TransactionReceipt {
            transaction_hash: transaction.as_str().to_string(),
            block_hash: block_hash.clone(),
            block_number: block_number.clone(),
            contract_address: Some(CONTRACT_ADDRESS.to_string()),
            from: DEPLOYER_ACCOUNT.to_string(),
            to: Some(PRIVACY_PRECOMPILE.to_string()),
            cumulative_gas_used: "0x5208".to_string(),
            gas_used: "0x5208".to_string(),
            status: "0x1".to_string(),
        };
        state.receipts.insert(
            hash_key(&transaction),
            Observed::new(receipt, lag, &nodes),
        );

        let record = Transaction {
            hash: transaction.as_str().to_string(),
            from: DEPLOYER_ACCOUNT.to_string(),
            to: Some(PRIVACY_PRECOMPILE.to_string()),
            gas: "0x5208".to_string(),
            gas_price: "0x3b9aca00".to_string(),
            input: format!("0x{}", hex::encode(payload_key.as_bytes())),
            nonce: format!("0x{:x}", n),
            value: "0x0".to_string(),
            block_hash: Some(block_hash),
            block_number: Some(block_number),
        };
        state
            .transactions
            .insert(hash_key(&transaction), Observed::new(record, lag, &nodes));

        let privacy_receipt = PrivacyTransactionReceipt {
            contract_address: Some(CONTRACT_ADDRESS.to_string()),
            from: DEPLOYER_ACCOUNT.to_string(),
            to: None,
            output: format!("0x{}", hex::encode(binary.as_bytes())),
            status: "0x1".to_string(),
            private_from: private_from.as_str().to_string(),
            private_for: private_for
                .iter()
                .map(|identity| identity.as_str().to_string())
                .collect(),
        };
        state.privacy_receipts.insert(
            hash_key(&transaction),
            Observed::new(privacy_receipt, lag, &nodes),
        );

        transaction
    }
}

/// Extracts the member name from a `fake://member:port` endpoint.
fn member_of(endpoint: &str) -> String {
    endpoint
        .trim_start_matches("fake://")
        .split(':')
        .next()
        .unwrap_or(endpoint)
        .to_string()
}

struct FakeNodeRpc {
    chain: Arc<FakeChain>,
    member: String,
}

#[async_trait]
impl NodeRpc for FakeNodeRpc {
    async fn get_transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let mut state = self.chain.state.lock().unwrap();
        Ok(state
            .receipts
            .get_mut(&hash_key(hash))
            .and_then(|observed| observed.fetch(&self.member)))
    }

    async fn get_transaction_by_hash(
        &self,
        hash: &TxHash,
    ) -> Result<Option<Transaction>, RpcError> {
        let mut state = self.chain.state.lock().unwrap();
        Ok(state
            .transactions
            .get_mut(&hash_key(hash))
            .and_then(|observed| observed.fetch(&self.member)))
    }

    async fn get_balance(&self, account: &str) -> Result<u128, RpcError> {
        let state = self.chain.state.lock().unwrap();
        let account = account.to_lowercase();
        if let Some(value) = state
            .balance_overrides
            .get(&(self.member.clone(), account.clone()))
        {
            return Ok(*value);
        }
        Ok(state.balances.get(&account).copied().unwrap_or(0))
    }

    async fn get_privacy_transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<PrivacyTransactionReceipt>, RpcError> {
        let mut state = self.chain.state.lock().unwrap();
        Ok(state
            .privacy_receipts
            .get_mut(&hash_key(hash))
            .and_then(|observed| observed.fetch(&self.member)))
    }

    async fn connected_peers(&self) -> Result<usize, RpcError> {
        let state = self.chain.state.lock().unwrap();
        if let Some(peers) = state.peer_count {
            return Ok(peers);
        }
        Ok(state.nodes.len().saturating_sub(1))
    }
}

struct FakePrivacyRpc {
    chain: Arc<FakeChain>,
    member: String,
}

#[async_trait]
impl PrivacyRpc for FakePrivacyRpc {
    async fn send(&self, _to: &PrivacyIdentity, payload: &str) -> Result<String, RpcError> {
        let mut state = self.chain.state.lock().unwrap();
        let n = state.next_sequence;
        state.next_sequence += 1;
        let key = format!("key-{}", n);
        state.payloads.insert(key.clone(), payload.to_string());
        Ok(key)
    }

    async fn receive(&self, key: &str) -> Result<Option<String>, RpcError> {
        let mut state = self.chain.state.lock().unwrap();
        let slot = (self.member.clone(), key.to_string());
        if state.payload_hidden.contains(&slot) {
            return Ok(None);
        }
        if let Some(remaining) = state.payload_delays.get_mut(&slot) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.payloads.get(key).cloned())
    }
}

struct FakeSignerRpc {
    chain: Arc<FakeChain>,
}

#[async_trait]
impl SignerRpc for FakeSignerRpc {
    async fn deploy_contract_to_privacy_group(
        &self,
        binary: &str,
        private_from: &PrivacyIdentity,
        private_for: &[PrivacyIdentity],
    ) -> Result<TxHash, RpcError> {
        Ok(self.chain.deploy(private_from, private_for, binary))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.chain.state.lock().unwrap().next_sequence)
    }
}

/// [`ClientFactory`] whose clients read and write a shared [`FakeChain`].
pub struct FakeClientFactory {
    chain: Arc<FakeChain>,
}

impl FakeClientFactory {
    pub fn new(chain: Arc<FakeChain>) -> Self {
        Self { chain }
    }
}

impl ClientFactory for FakeClientFactory {
    fn node(&self, endpoint: &str) -> Arc<dyn NodeRpc> {
        let member = member_of(endpoint);
        self.chain.register_node(&member);
        Arc::new(FakeNodeRpc {
            chain: Arc::clone(&self.chain),
            member,
        })
    }

    fn privacy(&self, endpoint: &str, _identity: PrivacyIdentity) -> Arc<dyn PrivacyRpc> {
        Arc::new(FakePrivacyRpc {
            chain: Arc::clone(&self.chain),
            member: member_of(endpoint),
        })
    }

    fn signer(&self, _endpoint: &str) -> Arc<dyn SignerRpc> {
        Arc::new(FakeSignerRpc {
            chain: Arc::clone(&self.chain),
        })
    }
}
