use std::io;

use clap::{Arg, Command};
use devnet_ops::{errors::Error, status::cluster_status, validator::SubnetTarget};
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "status";

/// Defines "status" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub clusters_file_path: String,
    pub subnets_dir: String,
    pub cluster_name: String,
    pub subnet_name: String,
    pub json: bool,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Prints bootstrap, health, version and subnet sync state of every node")
        .arg(common::log_level_arg())
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
                .long("subnet")
                .help("Also reports sync state of this deployed subnet")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("JSON")
                .long("json")
                .help("Prints the report in JSON")
                .required(false)
                .num_args(0),
        )
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (_, cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let target = if opts.subnet_name.is_empty() {
        None
    } else {
        let spec = common::subnet_store(&opts.subnets_dir).load(&opts.subnet_name)?;
        Some(SubnetTarget::from_spec(&spec, &cluster.network)?)
    };

    let exec = common::executor();
    let status = cluster_status(
        &exec,
        &cluster,
        target
            .as_ref()
            .map(|t| (t.name.as_str(), t.blockchain_id.as_str())),
    )
    .await;

    if opts.json {
        let s = serde_json::to_string_pretty(&status).map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("failed to serialize status ({e})"),
            )
        })?;
        println!("{s}");
    } else {
        print!("{status}");
    }

    let not_ready = status.not_ready();
    if !not_ready.is_empty() {
        return Err(Error::NotReady {
            message: format!("node(s) not ready: {}", not_ready.join(", ")),
            hosts: not_ready,
        }
        .into());
    }
    Ok(())
}
