// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process stand-ins for the external collaborators, for tests that
//! exercise the orchestration core without containers or live nodes.

mod chain;
mod runtime;

pub use chain::{FakeChain, FakeClientFactory};
pub use runtime::FakeRuntime;
