// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod consensus;

#[cfg(test)]
mod network;

#[cfg(test)]
mod privacy;

#[cfg(test)]
mod smoke_test_environment;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod transaction;
