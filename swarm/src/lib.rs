// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Orchestration of ephemeral private blockchain networks for end-to-end
//! tests: consensus nodes, privacy transaction managers, and signing
//! proxies launched as managed processes on one private network, plus the
//! polling verifiers that confirm they converge on identical state.

pub mod member;
pub mod network;
pub mod node;
pub mod privacy;
pub mod process;
pub mod rpc;
pub mod runtime;
pub mod signer;
pub mod subnet;
pub mod verify;

#[cfg(feature = "testing")]
pub mod testing;

pub use member::{ConfigError, Member, MemberId, MemberState};
pub use network::{Network, NetworkBuilder, NetworkError};
pub use node::{ConsensusNode, NodeConfig};
pub use privacy::{PrivacyKeyPair, PrivacyManager, PrivacyManagerConfig};
pub use rpc::types::TxHash;
pub use signer::{SignerConfig, SigningProxy};
pub use subnet::{Subnet, SubnetError, SubnetPool};
pub use verify::NetworkVerifier;
