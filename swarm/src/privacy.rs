// Copyright (c) The Privnet Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Privacy transaction manager members.
//!
//! A privacy manager is the only role with durable configuration: its
//! key/value config file is written to a unique path under the network
//! directory when the member is added, before anything starts.

use crate::{
    member::{start_member_process, stop_process, MemberId, MemberState, ProcessCell},
    network::NetworkError,
    rpc::{types::PrivacyIdentity, ClientFactory, PrivacyRpc},
    runtime::{ContainerRuntime, FileBind, HttpProbe, LaunchSpec, NetworkHandle},
};
use privnet_retrier::{wait_until_with, PollPolicy};
use std::{
    fs,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info};

const PRIVACY_IMAGE: &str = "privnet/enclave:latest";
pub(crate) const CLIENT_PORT: u16 = 8888;
pub(crate) const PEER_PORT: u16 = 8080;
const UPCHECK_PATH: &str = "/upcheck";
const ALIVE_STATUS: u16 = 200;
const CONTAINER_CONFIG_FILE: &str = "/etc/privacy/config.conf";
const CONTAINER_KEY_DIRECTORY: &str = "/opt/privacy";

/// One public/private key pair held by a privacy manager, as paths to the
/// key files on the host.
#[derive(Clone, Debug)]
pub struct PrivacyKeyPair {
    pub public_key: PathBuf,
    pub private_key: PathBuf,
}

/// Immutable configuration of a privacy manager. At least one key pair is
/// mandatory; the first pair's public key is the manager's identity.
#[derive(Clone, Debug)]
pub struct PrivacyManagerConfig {
    pub key_pairs: Vec<PrivacyKeyPair>,
}

impl PrivacyManagerConfig {
    pub fn new(key_pairs: Vec<PrivacyKeyPair>) -> Self {
        Self { key_pairs }
    }
}

pub struct PrivacyManager {
    id: MemberId,
    address: Ipv4Addr,
    key_pairs: Vec<PrivacyKeyPair>,
    identity: PrivacyIdentity,
    config_path: PathBuf,
    network: NetworkHandle,
    cell: ProcessCell,
    rpc: Mutex<Option<Arc<dyn PrivacyRpc>>>,
}

impl PrivacyManager {
    /// Builds the member and materializes its config file. Fails fast on an
    /// empty key list or unreadable key material.
    pub(crate) fn new(
        id: MemberId,
        address: Ipv4Addr,
        config: PrivacyManagerConfig,
        peer_urls: Vec<String>,
        config_path: PathBuf,
        network: NetworkHandle,
    ) -> Result<Self, NetworkError> {
        if config.key_pairs.is_empty() {
            return Err(crate::member::ConfigError::MissingKeyPairs.into());
        }
        let identity = read_identity(&config.key_pairs[0].public_key)?;
        let manager = Self {
            id,
            address,
            key_pairs: config.key_pairs,
            identity,
            config_path,
            network,
            cell: ProcessCell::new(),
            rpc: Mutex::new(None),
        };
        manager.write_config_file(&peer_urls)?;
        Ok(manager)
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn state(&self) -> MemberState {
        self.cell.state()
    }

    /// Public identity other members address payloads to.
    pub fn identity(&self) -> &PrivacyIdentity {
        &self.identity
    }

    /// Peer-to-peer URL other managers list as a boot node.
    pub fn peer_url(&self) -> String {
        format!("http://{}:{}", self.address, PEER_PORT)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The manager's bound query client. Available once the member is
    /// running.
    pub fn rpc(&self) -> Result<Arc<dyn PrivacyRpc>, NetworkError> {
        self.rpc
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| NetworkError::NotStarted {
                member: self.id.clone(),
            })
    }

    /// Fetches a stored payload by receipt key.
    pub async fn get_payload(&self, key: &str) -> Result<Option<String>, NetworkError> {
        self.rpc()?
            .receive(key)
            .await
            .map_err(|source| NetworkError::Rpc {
                member: self.id.clone(),
                source,
            })
    }

    fn container_key_path(key_file: &Path) -> String {
        let name = key_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", CONTAINER_KEY_DIRECTORY, name)
    }

    fn write_config_file(&self, peer_urls: &[String]) -> Result<(), NetworkError> {
        let mut content = String::new();
        content.push_str(&format!(
            "nodeurl = \"http://{}:{}\"\n",
            self.address, PEER_PORT
        ));
        content.push_str(&format!(
            "clienturl = \"http://{}:{}\"\n",
            self.address, CLIENT_PORT
        ));
        content.push_str(&format!("nodeport = {}\n", PEER_PORT));
        content.push_str(&format!("clientport = {}\n", CLIENT_PORT));
        content.push_str(&format!(
            "publickeys = [{}]\n",
            flatten(self.key_pairs.iter().map(|pair| Self::container_key_path(&pair.public_key)))
        ));
        content.push_str(&format!(
            "privatekeys = [{}]\n",
            flatten(self.key_pairs.iter().map(|pair| Self::container_key_path(&pair.private_key)))
        ));
        content.push_str("nodenetworkinterface = \"0.0.0.0\"\n");
        content.push_str("clientnetworkinterface = \"0.0.0.0\"\n");
        if !peer_urls.is_empty() {
            content.push_str(&format!(
                "othernodes = [{}]\n",
                flatten(peer_urls.iter().cloned())
            ));
        }
        debug!(
            "writing privacy manager config for {} to {}:\n{}",
            self.id,
            self.config_path.display(),
            content
        );
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    fn launch_spec(&self) -> LaunchSpec {
        let mut binds = vec![FileBind {
            source: self.config_path.clone(),
            target: CONTAINER_CONFIG_FILE.to_string(),
        }];
        for pair in &self.key_pairs {
            binds.push(FileBind {
                source: pair.public_key.clone(),
                target: Self::container_key_path(&pair.public_key),
            });
            binds.push(FileBind {
                source: pair.private_key.clone(),
                target: Self::container_key_path(&pair.private_key),
            });
        }
        LaunchSpec {
            member: self.id.to_string(),
            image: PRIVACY_IMAGE.to_string(),
            command: vec![CONTAINER_CONFIG_FILE.to_string()],
            env: Vec::new(),
            binds,
            network: self.network.clone(),
            address: self.address,
            ports: vec![CLIENT_PORT, PEER_PORT],
            readiness: HttpProbe {
                port: CLIENT_PORT,
                path: UPCHECK_PATH.to_string(),
                status: ALIVE_STATUS,
            },
        }
    }

    pub(crate) async fn start(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
        clients: &Arc<dyn ClientFactory>,
        policy: PollPolicy,
    ) -> Result<(), NetworkError> {
        info!("starting privacy manager {} at {}", self.id, self.address);
        let (handle, endpoint) = start_member_process(
            runtime,
            &self.cell,
            &self.id,
            self.launch_spec(),
            CLIENT_PORT,
            policy,
        )
        .await?;
        *self.rpc.lock().unwrap() = Some(clients.privacy(&endpoint, self.identity.clone()));
        self.cell.mark_running(handle);
        info!("privacy manager {} is running", self.id);
        Ok(())
    }

    pub(crate) async fn stop(
        &self,
        runtime: &Arc<dyn ContainerRuntime>,
    ) -> Result<(), NetworkError> {
        stop_process(runtime, &self.cell, &self.id).await
    }

    /// Round-trips a uniqueified payload to `peer` and back. The pair is
    /// connected once the fetched content matches what was sent.
    pub(crate) async fn await_round_trip(
        &self,
        peer: &PrivacyManager,
        nonce: u64,
        policy: PollPolicy,
    ) -> Result<(), NetworkError> {
        let sender = self.rpc()?;
        let receiver = peer.rpc()?;
        let to = peer.identity().clone();
        let payload = format!("connectivity probe {}", nonce);
        let description = format!(
            "privacy managers {} and {} to exchange a payload",
            self.id, peer.id
        );
        wait_until_with(policy, &description, || {
            let sender = Arc::clone(&sender);
            let receiver = Arc::clone(&receiver);
            let to = to.clone();
            let payload = payload.clone();
            Box::pin(async move {
                let key = sender
                    .send(&to, &payload)
                    .await
                    .map_err(|err| format!("send failed: {}", err))?;
                match receiver
                    .receive(&key)
                    .await
                    .map_err(|err| format!("receive failed: {}", err))?
                {
                    Some(received) if received == payload => Ok(()),
                    Some(received) => Err(format!(
                        "fetched payload {:?} does not match sent payload {:?}",
                        received, payload
                    )),
                    None => Err(format!("payload with key {} not yet available", key)),
                }
            })
        })
        .await?;
        Ok(())
    }
}

fn flatten<I: Iterator<Item = String>>(values: I) -> String {
    values
        .map(|value| format!("\"{}\"", value))
        .collect::<Vec<_>>()
        .join(",")
}

fn read_identity(path: &Path) -> Result<PrivacyIdentity, NetworkError> {
    let content =
        fs::read_to_string(path).map_err(|source| crate::member::ConfigError::UnreadableKey {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(PrivacyIdentity::new(content.trim().to_string()))
}
