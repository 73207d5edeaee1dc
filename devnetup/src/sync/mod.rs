use std::{io, sync::Arc};

use clap::{Arg, Command};
use devnet_ops::{
    compatibility::{CompatibilityOracle, GithubOracle},
    sync::{sync_subnet, wait_for_subnet_sync},
    validator::SubnetTarget,
};
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "sync";

/// Defines "sync" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub subnets_dir: String,
    pub cluster_name: String,
    pub subnet_name: String,
    pub nodes: String,
    pub poll_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Makes cluster nodes track a deployed subnet and waits for them to sync")
        .arg(common::log_level_arg())
        .arg(common::skip_prompt_arg())
        .arg(common::clusters_file_arg())
        .arg(common::subnets_dir_arg())
        .arg(
            Arg::new("CLUSTER")
                .help("Sets the cluster name")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("SUBNET")
                .help("Sets the subnet name")
                .required(true)
                .index(2),
        )
        .arg(common::nodes_arg())
        .args(common::poll_args())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (clusters, mut cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let spec = common::subnet_store(&opts.subnets_dir).load(&opts.subnet_name)?;
    let target = SubnetTarget::from_spec(&spec, &cluster.network)?;

    let nodes = common::split_ids(&opts.nodes);
    let hosts = if nodes.is_empty() {
        cluster.node_hosts()
    } else {
        cluster.filter_hosts(&nodes)?
    };
    common::print_hosts(&hosts);

    let proceed = common::confirm(
        opts.skip_prompt,
        format!("No, I am not ready to sync subnet '{}'", spec.name),
        format!(
            "Yes, let's sync {} node(s) to subnet '{}' (blockchain {})",
            hosts.len(),
            spec.name,
            target.blockchain_id
        ),
    )?;
    if !proceed {
        return Ok(());
    }

    common::step("tracking subnet")?;
    let exec = common::executor();
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(GithubOracle::new()?);
    let tracked = sync_subnet(&exec, &oracle, &mut cluster, &hosts, &spec).await?;
    common::save_cluster(&clusters_file, clusters, cluster)?;
    log::info!("{} node(s) now track subnet '{}'", tracked.len(), spec.name);

    common::step("waiting for subnet sync")?;
    let poll = common::poll_config(opts.poll_interval_seconds, opts.poll_timeout_seconds);
    wait_for_subnet_sync(&exec, &hosts, &target.blockchain_id, poll).await?;

    println!("{} node(s) synced to subnet '{}'", hosts.len(), spec.name);
    Ok(())
}
