// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! One participant process of a test network.
//!
//! Roles are variants, not a hierarchy: a [`Member`] is a consensus node, a
//! privacy manager, or a signing proxy, and the shared capability surface
//! is id, address, lifecycle, and a role-specific connectivity check.
//! Role-specific queries live on the variant types.

use crate::{
    network::NetworkError,
    node::ConsensusNode,
    privacy::PrivacyManager,
    runtime::{ContainerRuntime, HealthCheckError, ProcessHandle},
    signer::SigningProxy,
};
use privnet_retrier::{wait_until_with, PollPolicy};
use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing::error;

/// Stable identifier of a member within its network.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberId(String);

impl MemberId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberState {
    Configured,
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a privacy manager requires at least one key pair")]
    MissingKeyPairs,
    #[error("could not read key file {path}: {source}")]
    UnreadableKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown member: {0}")]
    UnknownMember(MemberId),
    #[error("member {0} is not a consensus node")]
    NotANode(MemberId),
    #[error("member {0} is not a privacy manager")]
    NotAPrivacyManager(MemberId),
    #[error("member {0} is not a signing proxy")]
    NotASigner(MemberId),
    #[error("members cannot be added after the network has started")]
    AddAfterStart,
}

/// Lifecycle state and process handle shared by all member variants.
///
/// The address a member holds never changes; this cell tracks only what
/// happens to the process behind it. A member that has been stopped is
/// spent and cannot be started again.
pub(crate) struct ProcessCell {
    state: Mutex<MemberState>,
    handle: Mutex<Option<ProcessHandle>>,
}

impl ProcessCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MemberState::Configured),
            handle: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> MemberState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn begin_start(&self, member: &MemberId) -> Result<(), NetworkError> {
        let mut state = self.state.lock().unwrap();
        match *state {
            MemberState::Configured => {
                *state = MemberState::Starting;
                Ok(())
            }
            other => Err(NetworkError::Lifecycle {
                member: member.clone(),
                state: other,
            }),
        }
    }

    pub(crate) fn abort_start(&self) {
        *self.state.lock().unwrap() = MemberState::Stopped;
    }

    pub(crate) fn mark_running(&self, handle: ProcessHandle) {
        *self.handle.lock().unwrap() = Some(handle);
        *self.state.lock().unwrap() = MemberState::Running;
    }

    /// Enters the stopping state and surrenders the process handle, if any.
    /// Returns `None` when there is nothing to stop, which makes stop
    /// idempotent.
    pub(crate) fn begin_stop(&self) -> Option<ProcessHandle> {
        let mut state = self.state.lock().unwrap();
        match *state {
            MemberState::Running | MemberState::Starting => {
                *state = MemberState::Stopping;
                self.handle.lock().unwrap().take()
            }
            MemberState::Configured => {
                *state = MemberState::Stopped;
                None
            }
            MemberState::Stopping | MemberState::Stopped => None,
        }
    }

    pub(crate) fn mark_stopped(&self) {
        *self.state.lock().unwrap() = MemberState::Stopped;
    }
}

/// Polls the runtime's liveness observation until the process is ready.
///
/// A crash or a missing process aborts immediately with the member's
/// captured output; only "not ready yet" probe failures are retried.
pub(crate) async fn await_process_health(
    runtime: &Arc<dyn ContainerRuntime>,
    handle: &ProcessHandle,
    member: &MemberId,
    policy: PollPolicy,
) -> Result<(), NetworkError> {
    let description = format!("member {} to pass its liveness probe", member);
    let outcome = wait_until_with(policy, &description, || {
        let runtime = Arc::clone(runtime);
        let handle = handle.clone();
        Box::pin(async move {
            match runtime.health_check(&handle).await {
                Ok(()) => Ok(Ok(())),
                Err(fatal @ HealthCheckError::Crashed(_))
                | Err(fatal @ HealthCheckError::NotRunning) => Ok(Err(fatal)),
                Err(not_ready) => Err(not_ready),
            }
        })
    })
    .await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(cause)) => {
            match runtime.logs(handle).await {
                Ok(logs) => error!(
                    "member {} failed during startup: {}; output:\n{}",
                    member, cause, logs
                ),
                Err(err) => error!(
                    "member {} failed during startup: {}; logs unavailable: {}",
                    member, cause, err
                ),
            }
            Err(NetworkError::Unhealthy {
                member: member.clone(),
                cause,
            })
        }
        Err(timeout) => {
            if let Ok(logs) = runtime.logs(handle).await {
                error!(
                    "member {} missed its liveness deadline; output:\n{}",
                    member, logs
                );
            }
            Err(NetworkError::Timeout(timeout))
        }
    }
}

/// Single launch path for all member variants: transition into `Starting`,
/// launch the spec, poll liveness, and resolve the member's RPC endpoint.
/// Any failure stops the half-started process and retires the member.
pub(crate) async fn start_member_process(
    runtime: &Arc<dyn ContainerRuntime>,
    cell: &ProcessCell,
    member: &MemberId,
    spec: crate::runtime::LaunchSpec,
    rpc_port: u16,
    policy: PollPolicy,
) -> Result<(ProcessHandle, String), NetworkError> {
    cell.begin_start(member)?;
    let handle = match runtime.launch(spec).await {
        Ok(handle) => handle,
        Err(source) => {
            cell.abort_start();
            return Err(NetworkError::Launch {
                member: member.clone(),
                source,
            });
        }
    };
    if let Err(err) = await_process_health(runtime, &handle, member, policy).await {
        let _ = runtime.stop(&handle).await;
        cell.abort_start();
        return Err(err);
    }
    match runtime.endpoint(&handle, rpc_port) {
        Ok(endpoint) => Ok((handle, endpoint)),
        Err(source) => {
            let _ = runtime.stop(&handle).await;
            cell.abort_start();
            Err(NetworkError::Runtime {
                member: member.clone(),
                source,
            })
        }
    }
}

/// Stops the process behind `cell`, tolerating members that never started.
pub(crate) async fn stop_process(
    runtime: &Arc<dyn ContainerRuntime>,
    cell: &ProcessCell,
    member: &MemberId,
) -> Result<(), NetworkError> {
    if let Some(handle) = cell.begin_stop() {
        runtime
            .stop(&handle)
            .await
            .map_err(|source| NetworkError::Runtime {
                member: member.clone(),
                source,
            })?;
    }
    cell.mark_stopped();
    Ok(())
}

/// One member of the network.
pub enum Member {
    Node(ConsensusNode),
    PrivacyManager(PrivacyManager),
    Signer(SigningProxy),
}

impl Member {
    pub fn id(&self) -> &MemberId {
        match self {
            Member::Node(node) => node.id(),
            Member::PrivacyManager(manager) => manager.id(),
            Member::Signer(signer) => signer.id(),
        }
    }

    pub fn address(&self) -> std::net::Ipv4Addr {
        match self {
            Member::Node(node) => node.address(),
            Member::PrivacyManager(manager) => manager.address(),
            Member::Signer(signer) => signer.address(),
        }
    }

    pub fn state(&self) -> MemberState {
        match self {
            Member::Node(node) => node.state(),
            Member::PrivacyManager(manager) => manager.state(),
            Member::Signer(signer) => signer.state(),
        }
    }

    pub fn as_node(&self) -> Option<&ConsensusNode> {
        match self {
            Member::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_privacy_manager(&self) -> Option<&PrivacyManager> {
        match self {
            Member::PrivacyManager(manager) => Some(manager),
            _ => None,
        }
    }

    pub fn as_signer(&self) -> Option<&SigningProxy> {
        match self {
            Member::Signer(signer) => Some(signer),
            _ => None,
        }
    }

    pub(crate) async fn start(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
        clients: &Arc<dyn crate::rpc::ClientFactory>,
        policy: PollPolicy,
    ) -> Result<(), NetworkError> {
        match self {
            Member::Node(node) => node.start(runtime, clients, policy).await,
            Member::PrivacyManager(manager) => manager.start(runtime, clients, policy).await,
            Member::Signer(signer) => signer.start(runtime, clients, policy).await,
        }
    }

    pub(crate) async fn stop(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
    ) -> Result<(), NetworkError> {
        match self {
            Member::Node(node) => node.stop(runtime).await,
            Member::PrivacyManager(manager) => manager.stop(runtime).await,
            Member::Signer(signer) => signer.stop(runtime).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> MemberId {
        MemberId::new("node-0".to_string())
    }

    #[test]
    fn a_member_starts_only_from_configured() {
        let cell = ProcessCell::new();
        assert_eq!(cell.state(), MemberState::Configured);
        cell.begin_start(&member()).unwrap();
        assert_eq!(cell.state(), MemberState::Starting);

        // Starting again without an intervening stop is refused.
        let err = cell.begin_start(&member()).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Lifecycle {
                state: MemberState::Starting,
                ..
            }
        ));
    }

    #[test]
    fn stop_is_idempotent_and_members_are_not_reusable() {
        let cell = ProcessCell::new();
        cell.begin_start(&member()).unwrap();
        cell.mark_running(ProcessHandle {
            id: "p-0".to_string(),
        });

        let handle = cell.begin_stop();
        assert!(handle.is_some());
        cell.mark_stopped();
        assert_eq!(cell.state(), MemberState::Stopped);

        // Second stop finds nothing to do.
        assert!(cell.begin_stop().is_none());

        // No restart after stop.
        cell.begin_start(&member()).unwrap_err();
    }

    #[test]
    fn stopping_an_unstarted_member_just_retires_it() {
        let cell = ProcessCell::new();
        assert!(cell.begin_stop().is_none());
        assert_eq!(cell.state(), MemberState::Stopped);
    }
}
