// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::runtime::{
    ContainerRuntime, HealthCheckError, LaunchSpec, NetworkHandle, ProcessHandle, RuntimeError,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Mutex,
    },
};

struct FakeProcess {
    member: String,
    ports: Vec<u16>,
    polls_remaining: u32,
    crashed: bool,
    running: bool,
}

#[derive(Default)]
struct RuntimeState {
    processes: HashMap<String, FakeProcess>,
    networks: HashMap<String, String>,
    destroyed: Vec<String>,
    launches: Vec<LaunchSpec>,
    fail_launch: HashSet<String>,
    crash_after_launch: HashSet<String>,
    log_requests: Vec<String>,
}

/// [`ContainerRuntime`] that launches nothing.
///
/// Every process becomes ready after a configurable number of liveness
/// polls, individual members can be made to fail launch or crash, and
/// every launch spec and log request is recorded for assertions.
pub struct FakeRuntime {
    readiness_polls: AtomicU32,
    next_id: AtomicU64,
    state: Mutex<RuntimeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            readiness_polls: AtomicU32::new(2),
            next_id: AtomicU64::new(0),
            state: Mutex::new(RuntimeState::default()),
        }
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of liveness polls each process fails before reporting ready.
    pub fn set_readiness_polls(&self, polls: u32) {
        self.readiness_polls.store(polls, Ordering::Relaxed);
    }

    /// Makes `launch` fail for the given member.
    pub fn fail_launch_of(&self, member: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_launch
            .insert(member.to_string());
    }

    /// Makes the given member's process launch and then immediately exit.
    pub fn crash_on_start(&self, member: &str) {
        self.state
            .lock()
            .unwrap()
            .crash_after_launch
            .insert(member.to_string());
    }

    pub fn launched_specs(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn is_running(&self, member: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .processes
            .values()
            .any(|process| process.member == member && process.running)
    }

    pub fn running_members(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .processes
            .values()
            .filter(|process| process.running)
            .map(|process| process.member.clone())
            .collect()
    }

    pub fn destroyed_networks(&self) -> Vec<String> {
        self.state.lock().unwrap().destroyed.clone()
    }

    /// Members whose logs were fetched, in request order.
    pub fn log_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().log_requests.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_network(&self, cidr: &str) -> Result<NetworkHandle, RuntimeError> {
        let id = format!("fake-net-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state
            .lock()
            .unwrap()
            .networks
            .insert(id.clone(), cidr.to_string());
        Ok(NetworkHandle {
            id,
            cidr: cidr.to_string(),
        })
    }

    async fn destroy_network(&self, network: &NetworkHandle) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.networks.remove(&network.id);
        state.destroyed.push(network.id.clone());
        Ok(())
    }

    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let polls = self.readiness_polls.load(Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        if state.fail_launch.contains(&spec.member) {
            return Err(RuntimeError::Runtime(format!(
                "image {} is unavailable",
                spec.image
            )));
        }
        let crashed = state.crash_after_launch.contains(&spec.member);
        state.processes.insert(
            id.clone(),
            FakeProcess {
                member: spec.member.clone(),
                ports: spec.ports.clone(),
                polls_remaining: polls,
                crashed,
                running: true,
            },
        );
        state.launches.push(spec);
        Ok(ProcessHandle { id })
    }

    async fn health_check(&self, process: &ProcessHandle) -> Result<(), HealthCheckError> {
        let mut state = self.state.lock().unwrap();
        let entry = match state.processes.get_mut(&process.id) {
            Some(entry) => entry,
            None => return Err(HealthCheckError::NotRunning),
        };
        if !entry.running {
            return Err(HealthCheckError::NotRunning);
        }
        if entry.crashed {
            return Err(HealthCheckError::Crashed("exit status: 1".to_string()));
        }
        if entry.polls_remaining > 0 {
            entry.polls_remaining -= 1;
            return Err(HealthCheckError::Probe("connection refused".to_string()));
        }
        Ok(())
    }

    async fn logs(&self, process: &ProcessHandle) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let member = state
            .processes
            .get(&process.id)
            .map(|entry| entry.member.clone())
            .ok_or_else(|| RuntimeError::UnknownProcess(process.id.clone()))?;
        state.log_requests.push(member.clone());
        Ok(format!("captured output of {}", member))
    }

    async fn stop(&self, process: &ProcessHandle) -> Result<(), RuntimeError> {
        if let Some(entry) = self.state.lock().unwrap().processes.get_mut(&process.id) {
            entry.running = false;
        }
        Ok(())
    }

    fn endpoint(&self, process: &ProcessHandle, port: u16) -> Result<String, RuntimeError> {
        let state = self.state.lock().unwrap();
        let entry = state
            .processes
            .get(&process.id)
            .ok_or_else(|| RuntimeError::UnknownProcess(process.id.clone()))?;
        if entry.ports.contains(&port) {
            Ok(format!("fake://{}:{}", entry.member, port))
        } else {
            Err(RuntimeError::UnexposedPort {
                process: process.id.clone(),
                port,
            })
        }
    }
}
