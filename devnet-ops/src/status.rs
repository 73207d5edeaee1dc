use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    checks::{self, Classified},
    cluster::ClusterConfig,
    host::{Host, Role},
    remote::{parse_node_id, RemoteCommand, RemoteExecutor, SubnetSyncStatus},
};

/// One row of the status report. Unknown fields stay None and the cause
/// is kept in `errors`.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct HostStatus {
    pub host_id: String,
    pub role: Role,
    pub ip: String,
    pub node_id: Option<String>,
    pub bootstrapped: Option<bool>,
    pub healthy: Option<bool>,
    pub client_version: Option<String>,
    pub subnet_sync: Option<SubnetSyncStatus>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ClusterStatus {
    pub cluster: String,
    pub network: String,
    pub subnet: Option<String>,
    pub hosts: Vec<HostStatus>,
}

impl ClusterStatus {
    /// Hosts that are not bootstrapped, not healthy, or could not be read.
    pub fn not_ready(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|h| {
                h.role != Role::Monitor
                    && (!h.errors.is_empty()
                        || h.bootstrapped != Some(true)
                        || h.healthy != Some(true))
            })
            .map(|h| h.host_id.clone())
            .collect()
    }
}

fn opt<T: fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cluster '{}' ({})", self.cluster, self.network)?;
        for h in self.hosts.iter() {
            write!(
                f,
                "{} {} {} node={} bootstrapped={} healthy={} version={}",
                h.host_id,
                h.role,
                h.ip,
                opt(&h.node_id),
                opt(&h.bootstrapped),
                opt(&h.healthy),
                opt(&h.client_version),
            )?;
            if let Some(subnet) = &self.subnet {
                let sync = h
                    .subnet_sync
                    .map(|s| format!("{s:?}"))
                    .unwrap_or_else(|| "-".to_string());
                write!(f, " {subnet}={sync}")?;
            }
            if !h.errors.is_empty() {
                write!(f, " errors=[{}]", h.errors.join("; "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn flag(c: &Classified, host_id: &str) -> Option<bool> {
    if c.ready.iter().any(|h| h == host_id) {
        Some(true)
    } else if c.not_ready.iter().any(|h| h == host_id) {
        Some(false)
    } else {
        None
    }
}

/// Snapshot of every node host. Never aborts because of one host; per-host
/// failures land in that host's row.
pub async fn cluster_status(
    exec: &Arc<dyn RemoteExecutor>,
    cluster: &ClusterConfig,
    subnet: Option<(&str, &str)>,
) -> ClusterStatus {
    let hosts: Vec<Host> = cluster.node_hosts();
    log::info!("collecting status of {} node(s) in '{}'", hosts.len(), cluster.name);

    let bootstrap = checks::classify_bootstrap(exec, &hosts).await;
    let health = checks::classify_health(exec, &hosts).await;
    let ids = checks::query(exec, &hosts, RemoteCommand::GetNodeId, parse_node_id).await;
    let versions = checks::node_versions(exec, &hosts).await;
    let syncs = match subnet {
        Some((_, blockchain_id)) => Some(checks::subnet_sync_statuses(exec, &hosts, blockchain_id).await),
        None => None,
    };

    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut note = |host: String, e: String| errors.entry(host).or_default().push(e);
    for (host, e) in bootstrap.failed.iter() {
        note(host.clone(), format!("bootstrap: {e}"));
    }
    for (host, e) in health.failed.iter() {
        note(host.clone(), format!("health: {e}"));
    }
    for (host, e) in ids.error_host_map() {
        note(host, format!("node id: {e}"));
    }
    for (host, e) in versions.error_host_map() {
        note(host, format!("version: {e}"));
    }
    if let Some(syncs) = &syncs {
        for (host, e) in syncs.error_host_map() {
            note(host, format!("subnet: {e}"));
        }
    }

    let ids = ids.result_map();
    let versions = versions.result_map();
    let syncs = syncs.map(|s| s.result_map()).unwrap_or_default();
    let rows = cluster
        .hosts
        .iter()
        .map(|h| {
            let id = h.id();
            HostStatus {
                host_id: id.to_string(),
                role: h.role,
                ip: h.ip.clone(),
                node_id: ids.get(id).cloned().or_else(|| h.node_id.clone()),
                bootstrapped: flag(&bootstrap, id),
                healthy: flag(&health, id),
                client_version: versions
                    .get(id)
                    .and_then(|v| v.client_version().map(|s| s.to_string())),
                subnet_sync: syncs.get(id).copied(),
                errors: errors.get(id).cloned().unwrap_or_default(),
            }
        })
        .collect();

    ClusterStatus {
        cluster: cluster.name.clone(),
        network: cluster.network.name(),
        subnet: subnet.map(|(name, _)| name.to_string()),
        hosts: rows,
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- status::test_cluster_status --exact --show-output
#[tokio::test]
async fn test_cluster_status() {
    use crate::{
        cluster::Network,
        testutil::{hosts, node_reply, unreachable, FnExecutor},
    };
    use serde_json::json;

    let mut hosts = hosts(4);
    hosts[3].role = Role::Monitor;
    let cluster = ClusterConfig::new("c1", Network::devnet(1338, "http://10.0.0.1:9650"), hosts);

    let fake = FnExecutor::new(|host, cmd| match (host.id(), cmd) {
        ("i-2", _) => Err(unreachable(host)),
        ("i-3", RemoteCommand::CheckHealthy) => Ok(json!({"result": {"healthy": false}})),
        ("i-3", RemoteCommand::SubnetSyncStatus { .. }) => node_reply(host, cmd, "validating"),
        _ => node_reply(host, cmd, "syncing"),
    });
    let exec: Arc<dyn RemoteExecutor> = fake.clone();

    let status = cluster_status(&exec, &cluster, Some(("mysubnet", "chain-1"))).await;
    assert_eq!(status.hosts.len(), 4);
    assert_eq!(status.network, "network-1338");
    assert_eq!(fake.count("check-healthy"), 3);

    let row = |id: &str| status.hosts.iter().find(|h| h.host_id == id).unwrap().clone();
    assert_eq!(row("i-1").healthy, Some(true));
    assert_eq!(row("i-1").subnet_sync, Some(SubnetSyncStatus::Syncing));
    assert_eq!(row("i-1").client_version.as_deref(), Some("v1.10.11"));
    assert_eq!(row("i-2").healthy, None);
    assert_eq!(row("i-2").errors.len(), 5);
    // node id falls back to the cluster config
    assert_eq!(row("i-2").node_id.as_deref(), Some("NodeID-2"));
    assert_eq!(row("i-3").healthy, Some(false));
    assert_eq!(row("i-3").subnet_sync, Some(SubnetSyncStatus::Validating));
    assert_eq!(row("i-4").role, Role::Monitor);
    assert!(row("i-4").bootstrapped.is_none());

    assert_eq!(status.not_ready(), vec!["i-2".to_string(), "i-3".to_string()]);
    let rendered = status.to_string();
    assert!(rendered.contains("i-3 validator 10.0.0.3"));
    assert!(rendered.contains("mysubnet=Validating"));
}
