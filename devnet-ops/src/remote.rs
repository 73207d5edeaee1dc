use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::{Error, Result},
    host::Host,
};

/// VM name of the platform chain in "info.getNodeVersion" replies.
pub const PLATFORM_VM_NAME: &str = "platform";
pub const EVM_VM_NAME: &str = "evm";
pub const AVM_VM_NAME: &str = "avm";

/// Named operations a host can run.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    CheckHealthy,
    CheckBootstrapped,
    GetNodeId,
    GetNodeVersion,
    SubnetSyncStatus {
        blockchain_id: String,
    },
    TrackSubnet {
        subnet_id: String,
        vm_id: String,
        subnet_name: String,
    },
    /// Writes the genesis and node config, then restarts the node.
    SetupNode {
        genesis: String,
        node_config: String,
    },
    UpgradeAvalancheGo {
        version: String,
    },
    UpgradeVm {
        vm_id: String,
        version: String,
    },
}

/// JSON-RPC request issued against the node's local API.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JsonRpcCall {
    pub path: &'static str,
    pub body: String,
}

impl RemoteCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::CheckHealthy => "check-healthy",
            RemoteCommand::CheckBootstrapped => "check-bootstrapped",
            RemoteCommand::GetNodeId => "get-node-id",
            RemoteCommand::GetNodeVersion => "get-node-version",
            RemoteCommand::SubnetSyncStatus { .. } => "subnet-sync-status",
            RemoteCommand::TrackSubnet { .. } => "track-subnet",
            RemoteCommand::SetupNode { .. } => "setup-node",
            RemoteCommand::UpgradeAvalancheGo { .. } => "upgrade-avalanchego",
            RemoteCommand::UpgradeVm { .. } => "upgrade-vm",
        }
    }

    /// Returns the JSON-RPC call for query commands, None for script commands.
    pub fn json_rpc(&self) -> Option<JsonRpcCall> {
        let (path, method, params) = match self {
            RemoteCommand::CheckHealthy => (
                "/ext/health",
                "health.health",
                serde_json::json!({ "tags": ["P"] }),
            ),
            RemoteCommand::CheckBootstrapped => (
                "/ext/info",
                "info.isBootstrapped",
                serde_json::json!({ "chain": "X" }),
            ),
            RemoteCommand::GetNodeId => ("/ext/info", "info.getNodeID", serde_json::json!({})),
            RemoteCommand::GetNodeVersion => {
                ("/ext/info", "info.getNodeVersion", serde_json::json!({}))
            }
            RemoteCommand::SubnetSyncStatus { blockchain_id } => (
                "/ext/bc/P",
                "platform.getBlockchainStatus",
                serde_json::json!({ "blockchainID": blockchain_id }),
            ),
            _ => return None,
        };
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        Some(JsonRpcCall {
            path,
            body: body.to_string(),
        })
    }
}

/// Runs a named operation on one host and returns its raw JSON reply.
/// Per-request timeouts are the executor's concern.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, host: &Host, cmd: &RemoteCommand) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

fn decode<T: DeserializeOwned>(host: &Host, raw: &Value) -> Result<T> {
    let reply: Reply<T> = serde_json::from_value(raw.clone()).map_err(|e| Error::Decode {
        host: host.id().to_string(),
        message: format!("failed to decode reply {raw} ({e})"),
    })?;
    if let Some(err) = reply.error {
        return Err(Error::Decode {
            host: host.id().to_string(),
            message: format!("remote error {} ({})", err.code, err.message),
        });
    }
    reply.result.ok_or_else(|| Error::Decode {
        host: host.id().to_string(),
        message: format!("reply has no result {raw}"),
    })
}

#[derive(Debug, Deserialize)]
struct HealthResult {
    healthy: bool,
}

#[derive(Debug, Deserialize)]
struct BootstrappedResult {
    #[serde(rename = "isBootstrapped")]
    is_bootstrapped: bool,
}

#[derive(Debug, Deserialize)]
struct NodeIdResult {
    #[serde(rename = "nodeID")]
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct NodeVersionResult {
    #[serde(rename = "vmVersions", default)]
    vm_versions: BTreeMap<String, String>,
    #[serde(rename = "rpcProtocolVersion", default)]
    rpc_protocol_version: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    status: String,
}

pub fn parse_healthy(host: &Host, raw: &Value) -> Result<bool> {
    decode::<HealthResult>(host, raw).map(|r| r.healthy)
}

pub fn parse_bootstrapped(host: &Host, raw: &Value) -> Result<bool> {
    decode::<BootstrappedResult>(host, raw).map(|r| r.is_bootstrapped)
}

pub fn parse_node_id(host: &Host, raw: &Value) -> Result<String> {
    decode::<NodeIdResult>(host, raw).map(|r| r.node_id)
}

/// Versions reported by "info.getNodeVersion".
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
pub struct NodeVersion {
    pub vm_versions: BTreeMap<String, String>,
    pub rpc_protocol_version: Option<u32>,
}

impl NodeVersion {
    /// Version of the node client itself.
    pub fn client_version(&self) -> Option<&str> {
        self.vm_versions.get(PLATFORM_VM_NAME).map(|s| s.as_str())
    }

    /// Entries for subnet VMs, keyed by VM ID.
    pub fn subnet_vms(&self) -> BTreeMap<String, String> {
        self.vm_versions
            .iter()
            .filter(|(name, _)| {
                let name = name.as_str();
                name != PLATFORM_VM_NAME && name != EVM_VM_NAME && name != AVM_VM_NAME
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn parse_node_version(host: &Host, raw: &Value) -> Result<NodeVersion> {
    let r = decode::<NodeVersionResult>(host, raw)?;
    // avalanchego encodes uint32 fields as JSON strings
    let rpc_protocol_version = match r.rpc_protocol_version {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(
            n.as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| Error::Decode {
                    host: host.id().to_string(),
                    message: format!("rpcProtocolVersion {n} out of range"),
                })?,
        ),
        Some(Value::String(s)) => Some(s.parse::<u32>().map_err(|e| Error::Decode {
            host: host.id().to_string(),
            message: format!("invalid rpcProtocolVersion '{s}' ({e})"),
        })?),
        Some(other) => {
            return Err(Error::Decode {
                host: host.id().to_string(),
                message: format!("invalid rpcProtocolVersion {other}"),
            })
        }
    };
    Ok(NodeVersion {
        vm_versions: r.vm_versions,
        rpc_protocol_version,
    })
}

/// Subnet sync state of a node.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SubnetSyncStatus {
    NotSynced,
    /// Caught up with the subnet and tracking it, not yet a validator.
    Syncing,
    /// Already validating the subnet.
    Validating,
    Unknown,
}

impl SubnetSyncStatus {
    /// Decodes the "platform.getBlockchainStatus" status value.
    /// Unrecognized values are rejected instead of read as not synced.
    pub fn decode(status: &str) -> std::result::Result<Self, String> {
        match status.to_ascii_lowercase().as_str() {
            "syncing" => Ok(SubnetSyncStatus::Syncing),
            "validating" => Ok(SubnetSyncStatus::Validating),
            "created" | "preferred" => Ok(SubnetSyncStatus::NotSynced),
            "unknown" => Ok(SubnetSyncStatus::Unknown),
            other => Err(format!("unrecognized blockchain status '{other}'")),
        }
    }
}

pub fn parse_subnet_sync_status(host: &Host, raw: &Value) -> Result<SubnetSyncStatus> {
    let r = decode::<StatusResult>(host, raw)?;
    SubnetSyncStatus::decode(&r.status).map_err(|message| Error::Decode {
        host: host.id().to_string(),
        message,
    })
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- remote::test_parse_replies --exact --show-output
#[test]
fn test_parse_replies() {
    use crate::host::Cloud;
    use serde_json::json;

    let host = Host::new(Cloud::Aws, "i-1", "10.0.0.1", "ubuntu", "/tmp/k.pem");

    assert!(parse_healthy(&host, &json!({"result": {"healthy": true}})).unwrap());
    assert!(!parse_bootstrapped(&host, &json!({"result": {"isBootstrapped": false}})).unwrap());
    assert_eq!(
        parse_node_id(&host, &json!({"result": {"nodeID": "NodeID-abc"}})).unwrap(),
        "NodeID-abc"
    );

    let v = parse_node_version(
        &host,
        &json!({"result": {
            "vmVersions": {
                "avm": "v1.10.12",
                "evm": "v0.12.5",
                "n8Anw9kErmgk7KHviddYtecCmziLZTphDwfL1V2DfnFjWZXbE": "v0.5.6",
                "platform": "v1.10.12"
            },
            "rpcProtocolVersion": "28"
        }}),
    )
    .unwrap();
    assert_eq!(v.client_version(), Some("v1.10.12"));
    assert_eq!(v.rpc_protocol_version, Some(28));
    assert_eq!(v.subnet_vms().len(), 1);

    let numeric = |n: Value| {
        parse_node_version(
            &host,
            &json!({"result": {"vmVersions": {}, "rpcProtocolVersion": n}}),
        )
    };
    assert_eq!(numeric(json!(28)).unwrap().rpc_protocol_version, Some(28));
    assert!(matches!(numeric(json!(4_294_967_324_u64)), Err(Error::Decode { .. })));
    assert!(matches!(numeric(json!(-1)), Err(Error::Decode { .. })));

    assert_eq!(
        parse_subnet_sync_status(&host, &json!({"result": {"status": "validating"}})).unwrap(),
        SubnetSyncStatus::Validating
    );
    assert_eq!(
        parse_subnet_sync_status(&host, &json!({"result": {"status": "Syncing"}})).unwrap(),
        SubnetSyncStatus::Syncing
    );
    assert!(matches!(
        parse_subnet_sync_status(&host, &json!({"result": {"status": "bogus"}})),
        Err(Error::Decode { .. })
    ));

    let err = parse_healthy(
        &host,
        &json!({"error": {"code": -32000, "message": "health check failed"}}),
    )
    .unwrap_err();
    assert!(err.to_string().contains("health check failed"));
    assert!(parse_healthy(&host, &json!({"result": {}})).is_err());
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- remote::test_json_rpc --exact --show-output
#[test]
fn test_json_rpc() {
    let call = RemoteCommand::SubnetSyncStatus {
        blockchain_id: "2ebCneCbwthjQ1rYT41nhd7M76Hc6YmosMAQrTFhBq8qeqh6tt".to_string(),
    }
    .json_rpc()
    .unwrap();
    assert_eq!(call.path, "/ext/bc/P");
    let body: Value = serde_json::from_str(&call.body).unwrap();
    assert_eq!(body["method"], "platform.getBlockchainStatus");
    assert_eq!(
        body["params"]["blockchainID"],
        "2ebCneCbwthjQ1rYT41nhd7M76Hc6YmosMAQrTFhBq8qeqh6tt"
    );

    assert_eq!(RemoteCommand::CheckHealthy.json_rpc().unwrap().path, "/ext/health");
    assert!(RemoteCommand::UpgradeAvalancheGo {
        version: "v1.10.12".to_string()
    }
    .json_rpc()
    .is_none());
}
