use std::io;

use clap::{Arg, Command};
use devnet_ops::provision::Inventory;
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "refresh-ips";

/// Defines "refresh-ips" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub cluster_name: String,
    pub inventory_file_path: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Re-reads the inventory and records hosts whose IP changed")
        .arg(common::log_level_arg())
        .arg(common::skip_prompt_arg())
        .arg(common::clusters_file_arg())
        .arg(
            Arg::new("CLUSTER")
                .help("Sets the cluster name")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("INVENTORY_FILE_PATH")
                .long("inventory-file-path")
                .help("Sets the YAML inventory of provisioned hosts")
                .required(true)
                .num_args(1),
        )
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (clusters, mut cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let inventory = Inventory::load(&opts.inventory_file_path)?;

    let moved = cluster.refresh_ips(&inventory.hosts)?;
    if moved.is_empty() {
        println!("no host of cluster '{}' changed IP", cluster.name);
        return Ok(());
    }
    let hosts: Vec<_> = cluster
        .hosts
        .iter()
        .filter(|h| moved.iter().any(|id| id == h.id()))
        .cloned()
        .collect();
    common::print_hosts(&hosts);

    let proceed = common::confirm(
        opts.skip_prompt,
        format!("No, keep the old IPs of cluster '{}'", cluster.name),
        format!("Yes, let's record {} new IP(s)", moved.len()),
    )?;
    if !proceed {
        return Ok(());
    }

    let name = cluster.name.clone();
    common::save_cluster(&clusters_file, clusters, cluster)?;
    println!("updated {} IP(s) of cluster '{name}'", moved.len());
    Ok(())
}
