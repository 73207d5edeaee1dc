use std::{io, sync::Arc};

use clap::{Arg, Command};
use devnet_ops::{
    compatibility::{CompatibilityOracle, GithubOracle},
    upgrade::{plan_upgrades, upgrade_cluster, ReleaseCatalog},
};
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "upgrade";

/// Defines "upgrade" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub cluster_name: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Upgrades avalanchego and subnet VMs on every node to the latest compatible releases")
        .arg(common::log_level_arg())
        .arg(common::skip_prompt_arg())
        .arg(common::clusters_file_arg())
        .arg(
            Arg::new("CLUSTER")
                .help("Sets the cluster name")
                .required(true)
                .index(1),
        )
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (_, cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let hosts = cluster.node_hosts();

    common::step("checking latest releases")?;
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(GithubOracle::new()?);
    let catalog = ReleaseCatalog::fetch(&oracle).await?;
    let exec = common::executor();
    let plan = plan_upgrades(&exec, &catalog, &hosts).await?;

    let pending: Vec<&String> = plan
        .iter()
        .filter(|(_, info)| !info.is_empty())
        .map(|(host_id, _)| host_id)
        .collect();
    if pending.is_empty() {
        println!("all {} node(s) are up to date", hosts.len());
        return Ok(());
    }
    for (host_id, info) in plan.iter().filter(|(_, info)| !info.is_empty()) {
        let mut parts = Vec::new();
        if let Some(v) = &info.avalanchego_version_target {
            parts.push(format!("avalanchego -> {v}"));
        }
        if let Some(v) = &info.subnet_vm_version_target {
            parts.push(format!("{} -> {v}", info.vm_ids_to_upgrade.join(",")));
        }
        println!("{host_id}: {}", parts.join(", "));
    }

    let proceed = common::confirm(
        opts.skip_prompt,
        "No, I am not ready to upgrade".to_string(),
        format!("Yes, let's upgrade {} node(s)", pending.len()),
    )?;
    if !proceed {
        return Ok(());
    }

    common::step("upgrading nodes")?;
    let upgraded = upgrade_cluster(&exec, &hosts, &plan).await?;
    println!("upgraded {} node(s)", upgraded.len());
    Ok(())
}
