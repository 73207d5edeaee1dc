use std::{
    io,
    sync::{atomic::AtomicBool, Arc},
};

use clap::{value_parser, Arg, Command};
use devnet_ops::{
    cluster::{ClustersConfig, DEFAULT_DEVNET_NETWORK_ID},
    compatibility::GithubOracle,
    provision::{CreateRequest, GenesisKeys, InventoryProvisioner},
    subnet::SubnetSpec,
    validator::{ValidateParams, DEFAULT_SUBNET_WEIGHT},
    wallet::WalletConnector,
    wiz::{Collaborators, Wiz, WizRequest},
};
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "wiz";

/// Defines "wiz" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub subnets_dir: String,
    pub cluster_name: String,
    pub subnet_name: String,
    pub subnet_template_file_path: String,
    pub force_subnet_create: bool,
    pub inventory_file_path: String,
    pub validators: usize,
    pub api_nodes: usize,
    pub network_id: u32,
    pub key: String,
    pub weight: u64,
    pub poll_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Creates a devnet and makes it validate a subnet in one run (re-run to resume)")
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
                .help("Sets the subnet name (devnet only when omitted)")
                .required(false)
                .index(2),
        )
        .arg(
            Arg::new("SUBNET_TEMPLATE_FILE_PATH")
                .long("subnet-template-file-path")
                .help("Sets the subnet definition used when none is saved yet")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("FORCE_SUBNET_CREATE")
                .long("force-subnet-create")
                .help("Recreates the subnet definition from the template")
                .required(false)
                .num_args(0),
        )
        .arg(
            Arg::new("INVENTORY_FILE_PATH")
                .long("inventory-file-path")
                .help("Sets the YAML inventory used when the cluster does not exist yet")
                .required(false)
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
        .arg(common::key_arg())
        .arg(
            Arg::new("WEIGHT")
                .long("weight")
                .help("Sets the subnet validator weight")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("20"),
        )
        .args(common::poll_args())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let clusters = ClustersConfig::load_or_default(&clusters_file)?;
    let create = if clusters.exists(&opts.cluster_name) {
        log::info!("reusing existing cluster '{}'", opts.cluster_name);
        None
    } else if opts.inventory_file_path.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "cluster '{}' does not exist and no inventory was given",
                opts.cluster_name
            ),
        ));
    } else {
        Some(CreateRequest {
            validators: opts.validators,
            api_nodes: opts.api_nodes,
        })
    };

    let network_id = match clusters.get(&opts.cluster_name) {
        Ok(c) => c.network.id,
        Err(_) if opts.network_id == 0 => DEFAULT_DEVNET_NETWORK_ID,
        Err(_) => opts.network_id,
    };
    let genesis_keys = GenesisKeys::from_key_hex(&opts.key, network_id)?;
    let subnet_template = if opts.subnet_template_file_path.is_empty() {
        None
    } else {
        Some(SubnetSpec::load(&opts.subnet_template_file_path)?)
    };
    let subnet_name = if opts.subnet_name.is_empty() {
        None
    } else {
        Some(opts.subnet_name.clone())
    };

    let proceed = common::confirm(
        opts.skip_prompt,
        format!("No, I am not ready to run wiz for '{}'", opts.cluster_name),
        format!(
            "Yes, let's {} devnet '{}' (network id {network_id}){}",
            if create.is_some() { "create" } else { "reuse" },
            opts.cluster_name,
            subnet_name
                .as_ref()
                .map(|s| format!(" and make it validate subnet '{s}'"))
                .unwrap_or_default()
        ),
    )?;
    if !proceed {
        return Ok(());
    }

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))?;

    let poll = common::poll_config(opts.poll_interval_seconds, opts.poll_timeout_seconds);
    let request = WizRequest {
        cluster_name: opts.cluster_name.clone(),
        subnet_name,
        force_subnet_create: opts.force_subnet_create,
        subnet_template,
        create,
        network_id,
        genesis_keys,
        validate: ValidateParams {
            subnet_weight: if opts.weight == 0 {
                DEFAULT_SUBNET_WEIGHT
            } else {
                opts.weight
            },
            ..Default::default()
        },
        health_poll: poll,
        sync_poll: poll,
        validate_poll: poll,
    };
    let wiz = Wiz::new(
        Collaborators {
            exec: common::executor(),
            provisioner: Arc::new(InventoryProvisioner {
                inventory_path: opts.inventory_file_path.clone(),
            }),
            connector: Arc::new(WalletConnector::new(&opts.key)),
            oracle: Arc::new(GithubOracle::new()?),
            subnets: common::subnet_store(&opts.subnets_dir),
            clusters_file,
        },
        term,
    );

    common::step("running wiz")?;
    let outcome = wiz.run(&request).await?;

    println!(
        "\ndevnet '{}' is up at {}",
        outcome.cluster.name, outcome.cluster.network.endpoint
    );
    if let Some(spec) = &outcome.subnet {
        println!("subnet '{}' is validated by:", spec.name);
    }
    if let Some(report) = &outcome.registration {
        crate::validate::print_report(report)?;
    }
    common::print_hosts(&outcome.cluster.hosts);
    Ok(())
}
