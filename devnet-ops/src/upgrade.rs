use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    checks,
    compatibility::CompatibilityOracle,
    errors::{Error, Result},
    host::Host,
    node_results::fan_out,
    remote::{NodeVersion, RemoteCommand, RemoteExecutor},
};

/// Latest releases and the client versions able to run the latest VM.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ReleaseCatalog {
    pub latest_client: String,
    pub latest_vm: String,
    /// RPC protocol version of the latest VM release.
    pub rpc_version: u32,
    /// Newest client that speaks `rpc_version`.
    pub latest_compatible_client: String,
}

impl ReleaseCatalog {
    pub async fn fetch(oracle: &Arc<dyn CompatibilityOracle>) -> Result<Self> {
        let latest_client = oracle.latest_client_version().await?;
        let latest_vm = oracle.latest_vm_version().await?;
        let rpc_version = oracle.vm_rpc_version(&latest_vm).await?;
        let compatible = oracle.compatible_client_versions(rpc_version).await?;
        let latest_compatible_client = if compatible.contains(&latest_client) {
            latest_client.clone()
        } else {
            oracle.latest_client_version_for_rpc(rpc_version).await?
        };
        log::info!(
            "latest client {latest_client}, latest VM {latest_vm} (rpc {rpc_version}), client for subnet hosts {latest_compatible_client}"
        );
        Ok(Self {
            latest_client,
            latest_vm,
            rpc_version,
            latest_compatible_client,
        })
    }
}

/// What one host needs to reach the latest compatible releases.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct UpgradeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avalanchego_version_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_vm_version_target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vm_ids_to_upgrade: Vec<String>,
}

impl UpgradeInfo {
    pub fn is_empty(&self) -> bool {
        self.avalanchego_version_target.is_none() && self.vm_ids_to_upgrade.is_empty()
    }
}

/// Compares installed versions against the catalog.
///
/// A host running subnet VMs is held to the newest client that can run the
/// latest VM, which may be older than the latest client release.
pub fn compute_upgrade_info(version: &NodeVersion, catalog: &ReleaseCatalog) -> UpgradeInfo {
    let subnet_vms = version.subnet_vms();
    let mut info = UpgradeInfo::default();

    for (vm_id, vm_version) in subnet_vms.iter() {
        if vm_version != &catalog.latest_vm {
            info.vm_ids_to_upgrade.push(vm_id.clone());
        }
    }
    if !info.vm_ids_to_upgrade.is_empty() {
        info.subnet_vm_version_target = Some(catalog.latest_vm.clone());
    }

    let target_client = if subnet_vms.is_empty() {
        &catalog.latest_client
    } else {
        &catalog.latest_compatible_client
    };
    if version.client_version() != Some(target_client.as_str()) {
        info.avalanchego_version_target = Some(target_client.clone());
    }
    info
}

/// Plans upgrades for every host. Hosts whose versions cannot be read fail
/// the whole plan.
pub async fn plan_upgrades(
    exec: &Arc<dyn RemoteExecutor>,
    catalog: &ReleaseCatalog,
    hosts: &[Host],
) -> Result<BTreeMap<String, UpgradeInfo>> {
    let versions = checks::node_versions(exec, hosts)
        .await
        .into_result("failed to get avalanchego version for node(s)")?;
    Ok(versions
        .iter()
        .map(|(host, v)| (host.clone(), compute_upgrade_info(v, catalog)))
        .collect())
}

/// Applies a plan: client first, then each subnet VM, per host in parallel.
pub async fn upgrade_cluster(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    plan: &BTreeMap<String, UpgradeInfo>,
) -> Result<Vec<String>> {
    let targets: Vec<Host> = hosts
        .iter()
        .filter(|h| plan.get(h.id()).map(|i| !i.is_empty()).unwrap_or(false))
        .cloned()
        .collect();
    if targets.is_empty() {
        log::info!("all node(s) are up to date");
        return Ok(Vec::new());
    }

    let plan = Arc::new(plan.clone());
    let exec = Arc::clone(exec);
    let results = fan_out(&targets, move |host| {
        let exec = Arc::clone(&exec);
        let plan = Arc::clone(&plan);
        async move {
            let info = plan.get(host.id()).cloned().ok_or_else(|| Error::Other {
                message: format!("no upgrade plan for '{}'", host.id()),
            })?;
            if let Some(version) = info.avalanchego_version_target.clone() {
                log::info!("upgrading avalanchego of {} to {version}", host.id());
                exec.execute(&host, &RemoteCommand::UpgradeAvalancheGo { version })
                    .await?;
            }
            if let Some(version) = info.subnet_vm_version_target.clone() {
                for vm_id in info.vm_ids_to_upgrade.iter() {
                    log::info!("upgrading VM {vm_id} of {} to {version}", host.id());
                    exec.execute(
                        &host,
                        &RemoteCommand::UpgradeVm {
                            vm_id: vm_id.clone(),
                            version: version.clone(),
                        },
                    )
                    .await?;
                }
            }
            Ok(host.id().to_string())
        }
    })
    .await;
    let upgraded = results.into_result("failed to upgrade node(s)")?;
    Ok(upgraded.into_keys().collect())
}

#[cfg(test)]
fn catalog() -> ReleaseCatalog {
    ReleaseCatalog {
        latest_client: "v1.10.12".to_string(),
        latest_vm: "v0.5.6".to_string(),
        rpc_version: 28,
        latest_compatible_client: "v1.10.11".to_string(),
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- upgrade::test_compute_upgrade_info --exact --show-output
#[test]
fn test_compute_upgrade_info() {
    let version = |entries: &[(&str, &str)]| NodeVersion {
        vm_versions: entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        rpc_protocol_version: Some(28),
    };

    // no subnet VM, plain client upgrade
    let info = compute_upgrade_info(&version(&[("platform", "v1.10.9"), ("evm", "v0.12.5")]), &catalog());
    assert_eq!(info.avalanchego_version_target.as_deref(), Some("v1.10.12"));
    assert!(info.vm_ids_to_upgrade.is_empty());

    // subnet host is held at the compatible client and gets its VM upgraded
    let info = compute_upgrade_info(
        &version(&[("platform", "v1.10.9"), ("srEX", "v0.5.5"), ("avm", "v1.10.9")]),
        &catalog(),
    );
    assert_eq!(info.avalanchego_version_target.as_deref(), Some("v1.10.11"));
    assert_eq!(info.subnet_vm_version_target.as_deref(), Some("v0.5.6"));
    assert_eq!(info.vm_ids_to_upgrade, vec!["srEX".to_string()]);

    let info = compute_upgrade_info(&version(&[("platform", "v1.10.11"), ("srEX", "v0.5.6")]), &catalog());
    assert!(info.is_empty());
    assert_eq!(serde_json::to_string(&info).unwrap(), "{}");
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- upgrade::test_upgrade_cluster --exact --show-output
#[tokio::test]
async fn test_upgrade_cluster() {
    use crate::testutil::{hosts, node_reply, test_oracle, unreachable, FnExecutor};
    use serde_json::json;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    // node_reply reports v1.10.11 and no subnet VM; i-3 runs an old VM
    let hosts = hosts(3);
    let fake = FnExecutor::new(|host, cmd| match cmd {
        RemoteCommand::GetNodeVersion if host.id() == "i-3" => Ok(json!({"result": {
            "vmVersions": {"platform": "v1.10.11", "srEX": "v0.5.5"},
            "rpcProtocolVersion": "28"
        }})),
        RemoteCommand::UpgradeVm { .. } if host.id() == "i-3" => Err(unreachable(host)),
        _ => node_reply(host, cmd, "syncing"),
    });
    let exec: Arc<dyn RemoteExecutor> = fake.clone();

    let oracle = test_oracle(vec!["v1.10.10", "v1.10.11"]);
    let catalog = ReleaseCatalog::fetch(&oracle).await.unwrap();
    assert_eq!(catalog.latest_compatible_client, "v1.10.11");

    let plan = plan_upgrades(&exec, &catalog, &hosts).await.unwrap();
    assert!(plan["i-1"].is_empty());
    assert_eq!(plan["i-3"].vm_ids_to_upgrade, vec!["srEX".to_string()]);
    assert!(plan["i-3"].avalanchego_version_target.is_none());

    let err = upgrade_cluster(&exec, &hosts, &plan).await.unwrap_err();
    assert_eq!(err.failed_hosts(), vec!["i-3".to_string()]);
    assert_eq!(fake.count("upgrade-avalanchego"), 0);
    assert_eq!(fake.count("upgrade-vm"), 1);

    let mut up_to_date = plan.clone();
    up_to_date.insert("i-3".to_string(), UpgradeInfo::default());
    assert!(upgrade_cluster(&exec, &hosts, &up_to_date).await.unwrap().is_empty());
}
