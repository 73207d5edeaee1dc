use std::sync::Arc;

use crate::{
    checks::{self, SyncBuckets},
    cluster::ClusterConfig,
    compatibility::CompatibilityOracle,
    errors::Result,
    host::Host,
    node_results::fan_out,
    poll::{wait_for, PollConfig},
    remote::{RemoteCommand, RemoteExecutor},
    subnet::{resolve_vm_id, SubnetSpec},
};

/// Makes every host track the subnet, after re-checking that each one is
/// bootstrapped, healthy and able to run the subnet VM.
///
/// The subnet is recorded in the cluster config only when every host
/// accepted the change. Returns the IDs of the hosts now tracking it.
pub async fn sync_subnet(
    exec: &Arc<dyn RemoteExecutor>,
    oracle: &Arc<dyn CompatibilityOracle>,
    cluster: &mut ClusterConfig,
    hosts: &[Host],
    spec: &SubnetSpec,
) -> Result<Vec<String>> {
    let deployment = spec.deployment(&cluster.network)?.clone();
    let vm_id = resolve_vm_id(spec)?;

    checks::check_hosts_are_bootstrapped(exec, hosts).await?;
    checks::check_hosts_are_healthy(exec, hosts).await?;
    checks::check_hosts_are_rpc_compatible(exec, oracle, hosts, spec.rpc_version).await?;

    log::info!(
        "tracking subnet '{}' ({}) on {} node(s)",
        spec.name,
        deployment.subnet_id,
        hosts.len()
    );
    let cmd = RemoteCommand::TrackSubnet {
        subnet_id: deployment.subnet_id.clone(),
        vm_id,
        subnet_name: spec.name.clone(),
    };
    let exec = Arc::clone(exec);
    let tracked = fan_out(hosts, move |host| {
        let exec = Arc::clone(&exec);
        let cmd = cmd.clone();
        async move {
            exec.execute(&host, &cmd).await?;
            Ok(host.id().to_string())
        }
    })
    .await
    .into_result("failed to track subnet for node(s)")?;

    cluster.track_subnet(&spec.name);
    Ok(tracked.into_keys().collect())
}

/// Waits until every host reports the subnet as synced or validating.
pub async fn wait_for_subnet_sync(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    blockchain_id: &str,
    cfg: PollConfig,
) -> Result<SyncBuckets> {
    wait_for(
        "waiting for subnet sync",
        cfg,
        || checks::subnet_sync_buckets(exec, hosts, blockchain_id),
        |b: &SyncBuckets| b.not_synced.clone(),
    )
    .await
}

/// Waits until every host reports itself as a subnet validator.
pub async fn wait_for_subnet_validators(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    blockchain_id: &str,
    cfg: PollConfig,
) -> Result<SyncBuckets> {
    wait_for(
        "waiting for subnet validators",
        cfg,
        || checks::subnet_sync_buckets(exec, hosts, blockchain_id),
        |b: &SyncBuckets| {
            b.not_synced
                .iter()
                .chain(b.synced.iter())
                .cloned()
                .collect()
        },
    )
    .await
}

/// Waits until every host reports healthy.
pub async fn wait_for_healthy(
    exec: &Arc<dyn RemoteExecutor>,
    hosts: &[Host],
    cfg: PollConfig,
) -> Result<Vec<String>> {
    wait_for(
        "waiting for healthy nodes",
        cfg,
        || checks::unhealthy_hosts(exec, hosts),
        |unhealthy: &Vec<String>| unhealthy.clone(),
    )
    .await
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- sync::test_sync_subnet --exact --show-output
#[tokio::test]
async fn test_sync_subnet() {
    use crate::{
        cluster::Network,
        subnet::{test_spec, SubnetDeployment},
        testutil::{hosts, node_reply, unreachable, FnExecutor},
    };

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let network = Network::devnet(1338, "http://10.0.0.1:9650");
    let mut cluster = ClusterConfig::new("c1", network.clone(), hosts(3));
    let oracle = crate::testutil::test_oracle(vec!["v1.10.11"]);

    let mut spec = test_spec("mysubnet");
    let hosts = cluster.validator_hosts();
    let fake = FnExecutor::new(|host, cmd| node_reply(host, cmd, "syncing"));
    let exec: Arc<dyn RemoteExecutor> = fake.clone();

    // not deployed yet
    assert!(sync_subnet(&exec, &oracle, &mut cluster, &hosts, &spec).await.is_err());
    assert_eq!(fake.count("check-bootstrapped"), 0);

    spec.deployments.insert(
        network.name(),
        SubnetDeployment {
            subnet_id: "subnet-1".to_string(),
            blockchain_id: "chain-1".to_string(),
        },
    );
    let tracked = sync_subnet(&exec, &oracle, &mut cluster, &hosts, &spec)
        .await
        .unwrap();
    assert_eq!(tracked, vec!["i-1", "i-2", "i-3"]);
    assert_eq!(fake.count("track-subnet"), 3);
    assert_eq!(cluster.subnets, vec!["mysubnet".to_string()]);

    // incompatible client version aborts before tracking
    let old = crate::testutil::test_oracle(vec!["v1.10.9"]);
    let err = sync_subnet(&exec, &old, &mut cluster, &hosts, &spec)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not compatible"));
    assert_eq!(fake.count("track-subnet"), 3);

    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| match cmd {
        RemoteCommand::TrackSubnet { .. } if host.id() == "i-3" => Err(unreachable(host)),
        _ => node_reply(host, cmd, "syncing"),
    });
    let mut other = ClusterConfig::new("c2", network, hosts.clone());
    let err = sync_subnet(&exec, &oracle, &mut other, &hosts, &spec)
        .await
        .unwrap_err();
    assert_eq!(err.failed_hosts(), vec!["i-3".to_string()]);
    assert!(other.subnets.is_empty());
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- sync::test_wait_for_subnet --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_wait_for_subnet() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::testutil::{hosts, node_reply, FnExecutor};
    use tokio::time::Duration;

    let hosts = hosts(2);
    let counter = Arc::new(AtomicUsize::new(0));
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(move |host, cmd| {
        let round = if host.id() == "i-1" {
            counter.fetch_add(1, Ordering::SeqCst)
        } else {
            counter.load(Ordering::SeqCst)
        };
        // i-2 catches up on the third round
        let status = match (host.id(), round) {
            ("i-2", r) if r < 3 => "created",
            _ => "syncing",
        };
        node_reply(host, cmd, status)
    });

    let cfg = PollConfig::new(Duration::from_secs(10), Duration::from_secs(60));
    let buckets = wait_for_subnet_sync(&exec, &hosts, "chain-1", cfg).await.unwrap();
    assert_eq!(buckets.synced.len(), 2);

    // nobody validates, so the wait times out naming both hosts
    let err = wait_for_subnet_validators(&exec, &hosts, "chain-1", cfg)
        .await
        .unwrap_err();
    assert!(err.is_not_ready());
    assert_eq!(err.failed_hosts(), vec!["i-1".to_string(), "i-2".to_string()]);

    assert!(wait_for_healthy(&exec, &hosts, cfg).await.unwrap().is_empty());
}
