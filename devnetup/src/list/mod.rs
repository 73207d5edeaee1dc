use std::io;

use clap::Command;
use devnet_ops::cluster::ClustersConfig;
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "list";

/// Defines "list" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub clusters_file_path: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Lists saved clusters and their hosts")
        .arg(common::log_level_arg())
        .arg(common::clusters_file_arg())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let clusters = ClustersConfig::load_or_default(&clusters_file)?;
    if clusters.clusters.is_empty() {
        println!("no clusters in {clusters_file}");
        return Ok(());
    }

    for (name, cluster) in clusters.clusters.iter() {
        println!(
            "\n{name} ({}, {} host(s), endpoint {})",
            cluster.network.name(),
            cluster.hosts.len(),
            cluster.network.endpoint
        );
        if !cluster.subnets.is_empty() {
            println!("subnets: {}", cluster.subnets.join(", "));
        }
        common::print_hosts(&cluster.hosts);
    }
    Ok(())
}
