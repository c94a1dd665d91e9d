// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! [`ContainerRuntime`] backed by plain operating system processes.
//!
//! Each launch spawns the spec's image name as a local binary with stdout
//! and stderr redirected to a per-member log file. There is no network
//! namespace locally, so exposed ports are remapped to unique localhost
//! ports and the assigned address, port map, and file bindings are handed
//! to the binary through `PRIVNET_*` environment variables.

use crate::runtime::{
    ContainerRuntime, HealthCheckError, LaunchSpec, NetworkHandle, ProcessHandle, RuntimeError,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command},
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Mutex,
    },
};
use tracing::{info, warn};

const FIRST_MAPPED_PORT: u16 = 34000;

#[derive(Debug)]
struct Process(Child);

impl Drop for Process {
    fn drop(&mut self) {
        // The child may have exited on its own; only reap it otherwise.
        match self.0.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                let _ = self.0.kill();
                let _ = self.0.wait();
            }
        }
    }
}

struct LocalProcess {
    process: Process,
    log_path: PathBuf,
    ports: HashMap<u16, u16>,
    probe_url: String,
    probe_status: u16,
}

/// Launches members as local OS processes under a shared log directory.
pub struct LocalProcessRuntime {
    log_dir: PathBuf,
    http: reqwest::Client,
    next_id: AtomicU64,
    next_port: AtomicU16,
    processes: Mutex<HashMap<String, LocalProcess>>,
    networks: Mutex<HashSet<String>>,
}

impl LocalProcessRuntime {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self, RuntimeError> {
        std::fs::create_dir_all(log_dir.as_ref())?;
        Ok(Self {
            log_dir: log_dir.as_ref().to_path_buf(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(0),
            next_port: AtomicU16::new(FIRST_MAPPED_PORT),
            processes: Mutex::new(HashMap::new()),
            networks: Mutex::new(HashSet::new()),
        })
    }
}

#[async_trait]
impl ContainerRuntime for LocalProcessRuntime {
    async fn create_network(&self, cidr: &str) -> Result<NetworkHandle, RuntimeError> {
        let id = format!("local-net-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.networks.lock().unwrap().insert(id.clone());
        info!("created local network {} for {}", id, cidr);
        Ok(NetworkHandle {
            id,
            cidr: cidr.to_string(),
        })
    }

    async fn destroy_network(&self, network: &NetworkHandle) -> Result<(), RuntimeError> {
        self.networks.lock().unwrap().remove(&network.id);
        Ok(())
    }

    async fn launch(&self, spec: LaunchSpec) -> Result<ProcessHandle, RuntimeError> {
        let id = format!(
            "{}-{}",
            spec.member,
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );
        let log_path = self.log_dir.join(format!("{}.log", id));
        let log_file = File::create(&log_path)?;

        let mut command = Command::new(&spec.image);
        command.args(&spec.command);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.env("PRIVNET_ADDRESS", spec.address.to_string());
        command.env("PRIVNET_NETWORK", &spec.network.cidr);

        let mut ports = HashMap::new();
        for port in &spec.ports {
            let mapped = self.next_port.fetch_add(1, Ordering::Relaxed);
            ports.insert(*port, mapped);
            command.env(format!("PRIVNET_PORT_{}", port), mapped.to_string());
        }
        for (index, bind) in spec.binds.iter().enumerate() {
            command.env(
                format!("PRIVNET_FILE_{}", index),
                format!("{}:{}", bind.source.display(), bind.target),
            );
        }
        command
            .stdout(log_file.try_clone()?)
            .stderr(log_file);

        let child = command.spawn().map_err(|source| RuntimeError::Spawn {
            program: spec.image.clone(),
            source,
        })?;

        let probe_port = *ports
            .get(&spec.readiness.port)
            .ok_or(RuntimeError::UnexposedPort {
                process: id.clone(),
                port: spec.readiness.port,
            })?;
        let probe_url = format!("http://127.0.0.1:{}{}", probe_port, spec.readiness.path);

        info!(
            "launched {} as pid {} (logs at {})",
            id,
            child.id(),
            log_path.display()
        );
        self.processes.lock().unwrap().insert(
            id.clone(),
            LocalProcess {
                process: Process(child),
                log_path,
                ports,
                probe_url,
                probe_status: spec.readiness.status,
            },
        );
        Ok(ProcessHandle { id })
    }

    async fn health_check(&self, process: &ProcessHandle) -> Result<(), HealthCheckError> {
        let (url, expected) = {
            let mut processes = self.processes.lock().unwrap();
            let entry = match processes.get_mut(&process.id) {
                Some(entry) => entry,
                None => return Err(HealthCheckError::NotRunning),
            };
            match entry.process.0.try_wait() {
                Ok(Some(status)) => return Err(HealthCheckError::Crashed(status.to_string())),
                Ok(None) => {}
                Err(err) => return Err(HealthCheckError::Probe(err.to_string())),
            }
            (entry.probe_url.clone(), entry.probe_status)
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| HealthCheckError::Probe(err.to_string()))?;
        if response.status().as_u16() == expected {
            Ok(())
        } else {
            Err(HealthCheckError::Probe(format!(
                "{} answered {} (want {})",
                url,
                response.status(),
                expected
            )))
        }
    }

    async fn logs(&self, process: &ProcessHandle) -> Result<String, RuntimeError> {
        let log_path = {
            let processes = self.processes.lock().unwrap();
            processes
                .get(&process.id)
                .ok_or_else(|| RuntimeError::UnknownProcess(process.id.clone()))?
                .log_path
                .clone()
        };
        let mut contents = String::new();
        File::open(&log_path)?.read_to_string(&mut contents)?;
        Ok(contents)
    }

    async fn stop(&self, process: &ProcessHandle) -> Result<(), RuntimeError> {
        let entry = self.processes.lock().unwrap().remove(&process.id);
        match entry {
            // Dropping the wrapper kills and reaps the child.
            Some(entry) => {
                drop(entry);
                info!("stopped {}", process.id);
            }
            None => warn!("stop of unknown process {} ignored", process.id),
        }
        Ok(())
    }

    fn endpoint(&self, process: &ProcessHandle, port: u16) -> Result<String, RuntimeError> {
        let processes = self.processes.lock().unwrap();
        let entry = processes
            .get(&process.id)
            .ok_or_else(|| RuntimeError::UnknownProcess(process.id.clone()))?;
        let mapped = entry
            .ports
            .get(&port)
            .ok_or_else(|| RuntimeError::UnexposedPort {
                process: process.id.clone(),
                port,
            })?;
        Ok(format!("http://127.0.0.1:{}", mapped))
    }
}
