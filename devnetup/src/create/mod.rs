use std::io;

use clap::{value_parser, Arg, Command};
use devnet_ops::{
    cluster::{ClusterConfig, ClustersConfig, Network, DEFAULT_DEVNET_NETWORK_ID},
    provision::{setup_devnet, CreateRequest, GenesisKeys, HostProvisioner, InventoryProvisioner},
    sync::wait_for_healthy,
    wallet::now_unix,
    wiz::devnet_endpoint,
};
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "create";

/// Defines "create" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub cluster_name: String,
    pub inventory_file_path: String,
    pub validators: usize,
    pub api_nodes: usize,
    pub network_id: u32,
    pub key: String,
    pub poll_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Creates a devnet from inventory hosts with a fresh genesis")
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
        .arg(
            Arg::new("VALIDATORS")
                .long("validators")
                .help("Sets the number of validator hosts")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("5"),
        )
        .arg(
            Arg::new("API_NODES")
                .long("api-nodes")
                .help("Sets the number of API hosts")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("NETWORK_ID")
                .long("network-id")
                .help("Sets the devnet network ID")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u32))
                .default_value("1338"),
        )
        .arg(
            Arg::new("KEY")
                .long("key")
                .help("Sets the hot key funded in genesis (private key in hex format)")
                .required(true)
                .num_args(1),
        )
        .args(common::poll_args())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let mut clusters = ClustersConfig::load_or_default(&clusters_file)?;
    if clusters.exists(&opts.cluster_name) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("cluster '{}' already exists in {clusters_file}", opts.cluster_name),
        ));
    }

    let network_id = if opts.network_id == 0 {
        DEFAULT_DEVNET_NETWORK_ID
    } else {
        opts.network_id
    };
    let keys = GenesisKeys::from_key_hex(&opts.key, network_id)?;
    let provisioner = InventoryProvisioner {
        inventory_path: opts.inventory_file_path.clone(),
    };
    let request = CreateRequest {
        validators: opts.validators,
        api_nodes: opts.api_nodes,
    };
    let hosts = provisioner
        .create_hosts(&opts.cluster_name, &request)
        .await?;
    common::print_hosts(&hosts);

    let proceed = common::confirm(
        opts.skip_prompt,
        format!("No, I am not ready to create devnet '{}'", opts.cluster_name),
        format!(
            "Yes, let's create devnet '{}' (network id {network_id}, genesis funded to {})",
            opts.cluster_name, keys.wallet_addr
        ),
    )?;
    if !proceed {
        return Ok(());
    }

    common::step(&format!("setting up {} node(s)", hosts.len()))?;
    let endpoint = devnet_endpoint(&hosts)?;
    let cluster = ClusterConfig::new(
        &opts.cluster_name,
        Network::devnet(network_id, &endpoint),
        hosts,
    );
    cluster.validate()?;

    let exec = common::executor();
    setup_devnet(&exec, network_id, &keys, &cluster.hosts, now_unix()).await?;
    clusters.upsert(cluster.clone());
    clusters.sync(&clusters_file)?;

    common::step("waiting for healthy nodes")?;
    let poll = common::poll_config(opts.poll_interval_seconds, opts.poll_timeout_seconds);
    wait_for_healthy(&exec, &cluster.node_hosts(), poll).await?;

    println!("devnet '{}' is up at {endpoint}", opts.cluster_name);
    Ok(())
}
