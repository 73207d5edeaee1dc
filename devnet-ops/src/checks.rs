use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    compatibility::CompatibilityOracle,
    errors::{Error, Result},
    host::Host,
    node_results::{fan_out, NodeResults},
    remote::{
        parse_bootstrapped, parse_healthy, parse_node_id, parse_node_version,
        parse_subnet_sync_status, NodeVersion, RemoteCommand, RemoteExecutor, SubnetSyncStatus,
    },
};

type Parser<T> = fn(&Host, &Value) -> Result<T>;

/// Runs one remote command on every host and decodes each reply.
pub async fn query<T>(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    cmd: RemoteCommand,
    parse: Parser<T>,
) -> NodeResults<T>
where
    T: Clone + Send + 'static,
{
    let exec = Arc::clone(exec);
    fan_out(hosts, move |host| {
        let exec = Arc::clone(&exec);
        let cmd = cmd.clone();
        async move {
            let raw = exec.execute(&host, &cmd).await?;
            parse(&host, &raw)
        }
    })
    .await
}

/// Full snapshot of one boolean check across hosts.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
pub struct Classified {
    pub ready: Vec<String>,
    pub not_ready: Vec<String>,
    /// Hosts whose state could not be determined, with the cause.
    pub failed: BTreeMap<String, String>,
}

impl Classified {
    fn from_results(results: NodeResults<bool>) -> Self {
        let mut c = Classified::default();
        for (host, e) in results.error_host_map() {
            c.failed.insert(host, e.to_string());
        }
        for (host, ok) in results.result_map() {
            if ok {
                c.ready.push(host);
            } else {
                c.not_ready.push(host);
            }
        }
        c
    }

    /// Returns the not-ready hosts, or a batch error if any host could not be checked.
    pub fn into_not_ready(self, message: &str) -> Result<Vec<String>> {
        if !self.failed.is_empty() {
            return Err(Error::Batch {
                message: message.to_string(),
                failed: self.failed,
            });
        }
        Ok(self.not_ready)
    }
}

pub async fn classify_health(exec: &Arc<dyn RemoteExecutor>, hosts: &[Host]) -> Classified {
    Classified::from_results(query(exec, hosts, RemoteCommand::CheckHealthy, parse_healthy).await)
}

/// Returns the hosts that report unhealthy.
pub async fn unhealthy_hosts(exec: &Arc<dyn RemoteExecutor>, hosts: &[Host]) -> Result<Vec<String>> {
    classify_health(exec, hosts)
        .await
        .into_not_ready("failed to get health status for node(s)")
}

pub async fn check_hosts_are_healthy(exec: &Arc<dyn RemoteExecutor>, hosts: &[Host]) -> Result<()> {
    log::info!("checking health of {} node(s)", hosts.len());
    let unhealthy = unhealthy_hosts(exec, hosts).await?;
    if !unhealthy.is_empty() {
        return Err(Error::NotReady {
            message: format!(
                "node(s) {:?} are not healthy, please check the issue and try again later",
                unhealthy
            ),
            hosts: unhealthy,
        });
    }
    Ok(())
}

pub async fn classify_bootstrap(exec: &Arc<dyn RemoteExecutor>, hosts: &[Host]) -> Classified {
    Classified::from_results(
        query(exec, hosts, RemoteCommand::CheckBootstrapped, parse_bootstrapped).await,
    )
}

/// Returns the hosts not yet bootstrapped on the primary network.
pub async fn not_bootstrapped_hosts(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
) -> Result<Vec<String>> {
    classify_bootstrap(exec, hosts)
        .await
        .into_not_ready("failed to get bootstrap status for node(s)")
}

pub async fn check_hosts_are_bootstrapped(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
) -> Result<()> {
    log::info!("checking bootstrap status of {} node(s)", hosts.len());
    let pending = not_bootstrapped_hosts(exec, hosts).await?;
    if !pending.is_empty() {
        return Err(Error::NotReady {
            message: format!(
                "node(s) {:?} are not bootstrapped yet, please try again later",
                pending
            ),
            hosts: pending,
        });
    }
    Ok(())
}

/// Hosts grouped by subnet sync state.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
pub struct SyncBuckets {
    /// Any status other than syncing/validating.
    pub not_synced: Vec<String>,
    /// Caught up and tracking, not yet validating.
    pub synced: Vec<String>,
    pub validating: Vec<String>,
}

impl SyncBuckets {
    pub fn from_statuses(statuses: &BTreeMap<String, SubnetSyncStatus>) -> Self {
        let mut b = SyncBuckets::default();
        for (host, status) in statuses.iter() {
            match status {
                SubnetSyncStatus::Syncing => b.synced.push(host.clone()),
                SubnetSyncStatus::Validating => b.validating.push(host.clone()),
                SubnetSyncStatus::NotSynced | SubnetSyncStatus::Unknown => {
                    b.not_synced.push(host.clone())
                }
            }
        }
        b
    }
}

pub async fn subnet_sync_statuses(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    blockchain_id: &str,
) -> NodeResults<SubnetSyncStatus> {
    query(
        exec,
        hosts,
        RemoteCommand::SubnetSyncStatus {
            blockchain_id: blockchain_id.to_string(),
        },
        parse_subnet_sync_status,
    )
    .await
}

pub async fn subnet_sync_buckets(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    blockchain_id: &str,
) -> Result<SyncBuckets> {
    let statuses = subnet_sync_statuses(exec, hosts, blockchain_id)
        .await
        .into_result("failed to get subnet sync status for node(s)")?;
    Ok(SyncBuckets::from_statuses(&statuses))
}

/// Collects node IDs, failing the whole call if any host cannot answer.
pub async fn node_ids(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
) -> Result<BTreeMap<String, String>> {
    query(exec, hosts, RemoteCommand::GetNodeId, parse_node_id)
        .await
        .into_result("failed to get node id for node(s)")
}

pub async fn node_versions(exec: &Arc<dyn RemoteExecutor>, hosts: &[Host]) -> NodeResults<NodeVersion> {
    query(exec, hosts, RemoteCommand::GetNodeVersion, parse_node_version).await
}

/// Client versions that cannot run the subnet VM.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
pub struct RpcCompatibility {
    pub incompatible: Vec<String>,
    /// Accepted client versions, for diagnostics.
    pub compatible_versions: Vec<String>,
    /// Client version reported by each host.
    pub client_versions: BTreeMap<String, String>,
    /// Subnet VM versions reported by each host.
    pub subnet_vms: BTreeMap<String, BTreeMap<String, String>>,
}

pub async fn rpc_compatibility(
    exec: &Arc<dyn RemoteExecutor>,
    oracle: &Arc<dyn CompatibilityOracle>,
    hosts: &[Host],
    rpc_version: u32,
) -> Result<RpcCompatibility> {
    let versions = node_versions(exec, hosts)
        .await
        .into_result("failed to get avalanchego version for node(s)")?;
    let compatible_versions = oracle.compatible_client_versions(rpc_version).await?;

    let mut report = RpcCompatibility {
        compatible_versions,
        ..Default::default()
    };
    for (host, version) in versions {
        let client = version.client_version().unwrap_or_default().to_string();
        if !report.compatible_versions.contains(&client) {
            report.incompatible.push(host.clone());
        }
        let vms = version.subnet_vms();
        if !vms.is_empty() {
            report.subnet_vms.insert(host.clone(), vms);
        }
        report.client_versions.insert(host, client);
    }
    Ok(report)
}

pub async fn check_hosts_are_rpc_compatible(
    exec: &Arc<dyn RemoteExecutor>,
    oracle: &Arc<dyn CompatibilityOracle>,
    hosts: &[Host],
    rpc_version: u32,
) -> Result<()> {
    log::info!("checking rpc compatibility of {} node(s) for rpc version {rpc_version}", hosts.len());
    let report = rpc_compatibility(exec, oracle, hosts, rpc_version).await?;
    if !report.incompatible.is_empty() {
        let details: Vec<String> = report
            .incompatible
            .iter()
            .map(|h| {
                format!(
                    "{h} ({})",
                    report.client_versions.get(h).cloned().unwrap_or_default()
                )
            })
            .collect();
        return Err(Error::Precondition {
            message: format!(
                "node(s) {} are not compatible with rpc version {rpc_version}, compatible avalanchego versions are {:?}",
                details.join(", "),
                report.compatible_versions
            ),
        });
    }
    Ok(())
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- checks::test_health_with_unreachable_host --exact --show-output
#[tokio::test]
async fn test_health_with_unreachable_host() {
    use crate::testutil::{hosts, node_reply, unreachable, FnExecutor};

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let hosts = hosts(3);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| {
        if host.id() == "i-3" {
            return Err(unreachable(host));
        }
        node_reply(host, cmd, "syncing")
    });

    let first = classify_health(&exec, &hosts).await;
    assert_eq!(first.ready, vec!["i-1".to_string(), "i-2".to_string()]);
    assert!(first.not_ready.is_empty());
    assert_eq!(first.failed.keys().cloned().collect::<Vec<_>>(), vec!["i-3".to_string()]);

    // same remote state, same classification
    let second = classify_health(&exec, &hosts).await;
    assert_eq!(first, second);

    let err = check_hosts_are_healthy(&exec, &hosts).await.unwrap_err();
    assert!(matches!(err, Error::Batch { .. }));
    assert_eq!(err.failed_hosts(), vec!["i-3".to_string()]);
    assert!(!err.is_not_ready());
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- checks::test_not_bootstrapped --exact --show-output
#[tokio::test]
async fn test_not_bootstrapped() {
    use crate::testutil::{hosts, node_reply, FnExecutor};
    use serde_json::json;

    let hosts = hosts(3);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| match cmd {
        RemoteCommand::CheckBootstrapped if host.id() == "i-2" => {
            Ok(json!({"result": {"isBootstrapped": false}}))
        }
        _ => node_reply(host, cmd, "syncing"),
    });

    let pending = not_bootstrapped_hosts(&exec, &hosts).await.unwrap();
    assert_eq!(pending, vec!["i-2".to_string()]);
    assert_eq!(pending, not_bootstrapped_hosts(&exec, &hosts).await.unwrap());

    let err = check_hosts_are_bootstrapped(&exec, &hosts).await.unwrap_err();
    assert!(err.is_not_ready());
    assert!(err.to_string().contains("not bootstrapped yet"));
    assert_eq!(err.failed_hosts(), vec!["i-2".to_string()]);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- checks::test_sync_buckets --exact --show-output
#[tokio::test]
async fn test_sync_buckets() {
    use crate::testutil::{hosts, node_reply, FnExecutor};

    let hosts = hosts(3);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| {
        let status = match host.id() {
            "i-1" => "validating",
            "i-2" => "syncing",
            _ => "created",
        };
        node_reply(host, cmd, status)
    });

    let b = subnet_sync_buckets(&exec, &hosts, "chain").await.unwrap();
    assert_eq!(b.validating, vec!["i-1".to_string()]);
    assert_eq!(b.synced, vec!["i-2".to_string()]);
    assert_eq!(b.not_synced, vec!["i-3".to_string()]);

    let bad: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| node_reply(host, cmd, "weird"));
    let err = subnet_sync_buckets(&bad, &hosts, "chain").await.unwrap_err();
    assert_eq!(err.failed_hosts().len(), 3);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- checks::test_rpc_compatibility --exact --show-output
#[tokio::test]
async fn test_rpc_compatibility() {
    use crate::testutil::{hosts, node_reply, FnExecutor};
    use async_trait::async_trait;
    use serde_json::json;

    struct Oracle;

    #[async_trait]
    impl CompatibilityOracle for Oracle {
        async fn compatible_client_versions(&self, rpc_version: u32) -> Result<Vec<String>> {
            assert_eq!(rpc_version, 28);
            Ok(vec!["v1.10.10".to_string(), "v1.10.11".to_string()])
        }
        async fn latest_client_version(&self) -> Result<String> {
            Ok("v1.10.11".to_string())
        }
        async fn latest_vm_version(&self) -> Result<String> {
            Ok("v0.5.6".to_string())
        }
        async fn vm_rpc_version(&self, _vm_version: &str) -> Result<u32> {
            Ok(28)
        }
    }

    let hosts = hosts(2);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| match cmd {
        RemoteCommand::GetNodeVersion if host.id() == "i-2" => Ok(json!({"result": {
            "vmVersions": {"platform": "v1.10.9", "srEX": "v0.5.5"}
        }})),
        _ => node_reply(host, cmd, "syncing"),
    });
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(Oracle);

    let report = rpc_compatibility(&exec, &oracle, &hosts, 28).await.unwrap();
    assert_eq!(report.incompatible, vec!["i-2".to_string()]);
    assert_eq!(report.compatible_versions.len(), 2);
    assert_eq!(report.subnet_vms.get("i-2").unwrap().get("srEX").unwrap(), "v0.5.5");

    let err = check_hosts_are_rpc_compatible(&exec, &oracle, &hosts, 28)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Precondition { .. }));
    assert!(err.to_string().contains("i-2 (v1.10.9)"));

    assert!(check_hosts_are_rpc_compatible(&exec, &oracle, &hosts[..1], 28)
        .await
        .is_ok());
}
