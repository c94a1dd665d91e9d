// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Boundary to the process/container runtime that actually hosts members.
//!
//! The orchestration core never talks to an operating system or a container
//! daemon directly; everything it needs from one is behind
//! [`ContainerRuntime`]. The in-tree implementation is
//! [`crate::process::LocalProcessRuntime`]; tests substitute a fake.

use async_trait::async_trait;
use std::{io, net::Ipv4Addr, path::PathBuf};
use thiserror::Error;

/// An isolated private network that members join with static addresses.
#[derive(Clone, Debug)]
pub struct NetworkHandle {
    pub id: String,
    pub cidr: String,
}

/// Opaque token for one launched member process.
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    pub id: String,
}

/// A host file made visible to the process at a fixed target path.
#[derive(Clone, Debug)]
pub struct FileBind {
    pub source: PathBuf,
    pub target: String,
}

/// HTTP probe the runtime answers once the process is ready to serve.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    pub port: u16,
    pub path: String,
    pub status: u16,
}

/// Everything needed to bring one member process up.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// Member identifier, carried through for diagnostics.
    pub member: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub binds: Vec<FileBind>,
    pub network: NetworkHandle,
    pub address: Ipv4Addr,
    pub ports: Vec<u16>,
    pub readiness: HttpProbe,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("io failure: {0}")]
    Io(#[from] io::Error),
    #[error("unknown process handle: {0}")]
    UnknownProcess(String),
    #[error("port {port} is not exposed by process {process}")]
    UnexposedPort { process: String, port: u16 },
    #[error("{0}")]
    Runtime(String),
}

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("process is not running")]
    NotRunning,
    #[error("process exited: {0}")]
    Crashed(String),
    #[error("liveness probe failed: {0}")]
    Probe(String),
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates an isolated private network covering `cidr`.
    async fn create_network(&self, cidr: &str) -> Result<NetworkHandle, RuntimeError>;

    /// Destroys a network previously created by this runtime. Destroying a
    /// network that is already gone is not an error.
    async fn destroy_network(&self, network: &NetworkHandle) -> Result<(), RuntimeError>;

    /// Launches a member process. The returned handle stays valid until
    /// [`ContainerRuntime::stop`] is called with it.
    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle, RuntimeError>;

    /// One liveness observation: `Ok` once the readiness probe answers,
    /// [`HealthCheckError::Crashed`] if the process exited, and
    /// [`HealthCheckError::Probe`] while it is still coming up.
    async fn health_check(&self, process: &ProcessHandle) -> Result<(), HealthCheckError>;

    /// Recent output of the process, for post-mortem diagnostics.
    async fn logs(&self, process: &ProcessHandle) -> Result<String, RuntimeError>;

    /// Stops the process. Stopping an already stopped process is not an
    /// error.
    async fn stop(&self, process: &ProcessHandle) -> Result<(), RuntimeError>;

    /// Client-reachable base URL for one of the process's exposed ports.
    fn endpoint(&self, process: &ProcessHandle, port: u16) -> Result<String, RuntimeError>;
}
