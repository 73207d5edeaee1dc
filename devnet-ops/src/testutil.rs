//! Test doubles shared by the unit tests.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    compatibility::CompatibilityOracle,
    errors::{Error, Result},
    host::{Cloud, Host},
    remote::{RemoteCommand, RemoteExecutor},
    staking::{Deployer, ValidatorIntent},
};

pub fn hosts(n: usize) -> Vec<Host> {
    (1..=n)
        .map(|i| {
            Host::new(
                Cloud::Aws,
                &format!("i-{i}"),
                &format!("10.0.0.{i}"),
                "ubuntu",
                "/tmp/k.pem",
            )
            .with_node_id(&format!("NodeID-{i}"))
        })
        .collect()
}

pub fn unreachable(host: &Host) -> Error {
    Error::Transport {
        host: host.id().to_string(),
        message: "connection refused".to_string(),
    }
}

type Responder = dyn Fn(&Host, &RemoteCommand) -> Result<Value> + Send + Sync;

/// Answers every command through a closure and records what it ran.
pub struct FnExecutor {
    responder: Box<Responder>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FnExecutor {
    pub fn new<F>(f: F) -> Arc<Self>
    where
        F: Fn(&Host, &RemoteCommand) -> Result<Value> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(f),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self, cmd_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c == cmd_name)
            .count()
    }
}

#[async_trait]
impl RemoteExecutor for FnExecutor {
    async fn execute(&self, host: &Host, cmd: &RemoteCommand) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((host.id().to_string(), cmd.name().to_string()));
        (self.responder)(host, cmd)
    }
}

/// A healthy node whose subnet status comes from `sync`.
pub fn node_reply(host: &Host, cmd: &RemoteCommand, sync: &str) -> Result<Value> {
    Ok(match cmd {
        RemoteCommand::CheckHealthy => json!({"result": {"healthy": true}}),
        RemoteCommand::CheckBootstrapped => json!({"result": {"isBootstrapped": true}}),
        RemoteCommand::GetNodeId => {
            json!({"result": {"nodeID": host.node_id.clone().unwrap_or_default()}})
        }
        RemoteCommand::GetNodeVersion => json!({"result": {
            "vmVersions": {"platform": "v1.10.11", "avm": "v1.10.11", "evm": "v0.12.5"},
            "rpcProtocolVersion": "28"
        }}),
        RemoteCommand::SubnetSyncStatus { .. } => json!({"result": {"status": sync}}),
        _ => json!({"result": {"output": "ok"}}),
    })
}

/// Records every issued transaction and tracks validator sets in memory.
#[derive(Default)]
pub struct MockDeployer {
    pub min_stake: u64,
    pub balance: u64,
    pub primary: Mutex<BTreeSet<String>>,
    pub subnet: Mutex<BTreeMap<String, BTreeSet<String>>>,
    /// Node IDs whose transactions fail.
    pub failing: BTreeSet<String>,
    pub primary_intents: Mutex<Vec<ValidatorIntent>>,
    pub subnet_intents: Mutex<Vec<ValidatorIntent>>,
    pub funded_with: Mutex<Vec<u64>>,
}

impl MockDeployer {
    pub fn new(min_stake: u64, balance: u64) -> Self {
        Self {
            min_stake,
            balance,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn get_min_stake(&self) -> Result<u64> {
        Ok(self.min_stake)
    }

    async fn balance(&self) -> Result<u64> {
        Ok(self.balance)
    }

    async fn ensure_funded(&self, required: u64) -> Result<()> {
        self.funded_with.lock().unwrap().push(required);
        if self.balance < required {
            return Err(Error::Precondition {
                message: format!("insufficient balance {} < {required}", self.balance),
            });
        }
        Ok(())
    }

    async fn is_primary_validator(&self, node_id: &str) -> Result<bool> {
        Ok(self.primary.lock().unwrap().contains(node_id))
    }

    async fn is_subnet_validator(&self, subnet_id: &str, node_id: &str) -> Result<bool> {
        Ok(self
            .subnet
            .lock()
            .unwrap()
            .get(subnet_id)
            .map(|s| s.contains(node_id))
            .unwrap_or(false))
    }

    async fn add_primary_validator(&self, intent: &ValidatorIntent) -> Result<String> {
        if self.failing.contains(&intent.node_id) {
            return Err(Error::Transaction {
                host: intent.node_id.clone(),
                message: "insufficient funds".to_string(),
            });
        }
        self.primary_intents.lock().unwrap().push(intent.clone());
        self.primary.lock().unwrap().insert(intent.node_id.clone());
        Ok(format!("tx-primary-{}", intent.node_id))
    }

    async fn add_subnet_validator(&self, subnet_id: &str, intent: &ValidatorIntent) -> Result<String> {
        if self.failing.contains(&intent.node_id) {
            return Err(Error::Transaction {
                host: intent.node_id.clone(),
                message: "insufficient funds".to_string(),
            });
        }
        self.subnet_intents.lock().unwrap().push(intent.clone());
        self.subnet
            .lock()
            .unwrap()
            .entry(subnet_id.to_string())
            .or_default()
            .insert(intent.node_id.clone());
        Ok(format!("tx-subnet-{}", intent.node_id))
    }
}

/// Fixed release catalog: every VM release speaks rpc 28.
pub struct StaticOracle {
    pub clients: Vec<String>,
    pub latest_client: String,
    pub latest_vm: String,
}

#[async_trait]
impl CompatibilityOracle for StaticOracle {
    async fn compatible_client_versions(&self, _rpc_version: u32) -> Result<Vec<String>> {
        Ok(self.clients.clone())
    }
    async fn latest_client_version(&self) -> Result<String> {
        Ok(self.latest_client.clone())
    }
    async fn latest_vm_version(&self) -> Result<String> {
        Ok(self.latest_vm.clone())
    }
    async fn vm_rpc_version(&self, _vm_version: &str) -> Result<u32> {
        Ok(28)
    }
}

pub fn test_oracle(clients: Vec<&str>) -> Arc<dyn CompatibilityOracle> {
    Arc::new(StaticOracle {
        clients: clients.iter().map(|c| c.to_string()).collect(),
        latest_client: clients.last().map(|c| c.to_string()).unwrap_or_default(),
        latest_vm: "v0.5.6".to_string(),
    })
}
