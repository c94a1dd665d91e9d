// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network identity allocation for test networks.
//!
//! A [`SubnetPool`] hands each network its own /24 block under
//! `172.20.0.0/16`; a [`Subnet`] hands each member of that network a host
//! address inside the block. Selection is a plain shared counter: nothing
//! probes the host's network layer for blocks that are genuinely in use, so
//! concurrently running networks that share a pool never collide with each
//! other, but collisions with unrelated processes remain possible.

use std::{
    net::Ipv4Addr,
    sync::atomic::{AtomicU16, Ordering},
};
use thiserror::Error;

const BLOCK_PREFIX: (u8, u8) = (172, 20);
const FIRST_HOST: u16 = 2;
const LAST_HOST: u16 = 254;

#[derive(Debug, Error)]
pub enum SubnetError {
    #[error("subnet 172.20.{third_octet}.0/24 is exhausted: host addresses 2..=254 are all taken")]
    Exhausted { third_octet: u8 },
    #[error("no unused /24 blocks remain under 172.20.0.0/16")]
    PoolExhausted,
}

/// Shared allocator of /24 blocks, one per concurrently running network.
///
/// Share a single pool between networks that must coexist inside one
/// process; two pools will both start handing out `172.20.0.0/24`.
#[derive(Debug, Default)]
pub struct SubnetPool {
    next_third_octet: AtomicU16,
}

impl SubnetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_subnet(&self) -> Result<Subnet, SubnetError> {
        let octet = self.next_third_octet.fetch_add(1, Ordering::Relaxed);
        if octet > u16::from(u8::MAX) {
            return Err(SubnetError::PoolExhausted);
        }
        Ok(Subnet::new(octet as u8))
    }
}

/// Host address allocator for one /24 block.
///
/// Addresses come out strictly increasing, starting at `.2` (`.0` and `.1`
/// are reserved), and are never handed out twice, even after the member
/// that held one is gone.
#[derive(Debug)]
pub struct Subnet {
    third_octet: u8,
    next_host: AtomicU16,
}

impl Subnet {
    pub fn new(third_octet: u8) -> Self {
        Self {
            third_octet,
            next_host: AtomicU16::new(FIRST_HOST),
        }
    }

    /// Hands out the next unused host address in this block.
    pub fn allocate(&self) -> Result<Ipv4Addr, SubnetError> {
        let host = self.next_host.fetch_add(1, Ordering::Relaxed);
        if host > LAST_HOST {
            return Err(SubnetError::Exhausted {
                third_octet: self.third_octet,
            });
        }
        Ok(Ipv4Addr::new(
            BLOCK_PREFIX.0,
            BLOCK_PREFIX.1,
            self.third_octet,
            host as u8,
        ))
    }

    pub fn cidr(&self) -> String {
        format!(
            "{}.{}.{}.0/24",
            BLOCK_PREFIX.0, BLOCK_PREFIX.1, self.third_octet
        )
    }

    pub fn third_octet(&self) -> u8 {
        self.third_octet
    }
}
