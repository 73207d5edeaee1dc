use std::{io, sync::Arc};

use clap::{value_parser, Arg, Command};
use devnet_ops::{
    compatibility::{CompatibilityOracle, GithubOracle},
    sync::wait_for_subnet_validators,
    validator::{Registrar, SubnetTarget, ValidateParams, DEFAULT_SUBNET_WEIGHT},
    wallet::WalletConnector,
    wiz::Connector,
};
use serde::{Deserialize, Serialize};

use crate::common;

pub const NAME: &str = "subnet";

/// Defines "validate subnet" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub subnets_dir: String,
    pub cluster_name: String,
    pub subnet_name: String,
    pub key: String,
    pub weight: u64,
    pub nodes: String,
    pub poll_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Adds synced cluster validator hosts as validators of a subnet")
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
        .arg(common::nodes_arg())
        .args(common::poll_args())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (_, cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let spec = common::subnet_store(&opts.subnets_dir).load(&opts.subnet_name)?;
    let target = SubnetTarget::from_spec(&spec, &cluster.network)?;

    let nodes = common::split_ids(&opts.nodes);
    let hosts = if nodes.is_empty() {
        cluster.validator_hosts()
    } else {
        cluster.filter_hosts(&nodes)?
    };
    common::print_hosts(&hosts);

    let params = ValidateParams {
        subnet_weight: if opts.weight == 0 {
            DEFAULT_SUBNET_WEIGHT
        } else {
            opts.weight
        },
        ..Default::default()
    };

    let proceed = common::confirm(
        opts.skip_prompt,
        format!("No, I am not ready to add validators to subnet '{}'", spec.name),
        format!(
            "Yes, let's add {} node(s) to subnet '{}' ({}) with weight {}",
            hosts.len(),
            spec.name,
            target.subnet_id,
            params.subnet_weight
        ),
    )?;
    if !proceed {
        return Ok(());
    }

    common::step("adding subnet validators")?;
    let exec = common::executor();
    let (deployer, _) = WalletConnector::new(&opts.key)
        .connect(&cluster.network)
        .await?;
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(GithubOracle::new()?);
    let registrar = Registrar::new(Arc::clone(&exec), deployer, oracle, cluster.network.clone());
    let report = registrar.validate_subnet(&hosts, &target, &params).await?;

    super::print_report(&report)?;
    let report = report.into_result("failed to add subnet validator(s)")?;

    // only hosts registered or already validating are expected to flip
    let done: Vec<String> = report
        .added
        .keys()
        .chain(report.skipped.keys())
        .cloned()
        .collect();
    if done.is_empty() {
        return Ok(());
    }
    let done_hosts = cluster.filter_hosts(&done)?;

    common::step("waiting for subnet validators")?;
    let poll = common::poll_config(opts.poll_interval_seconds, opts.poll_timeout_seconds);
    wait_for_subnet_validators(&exec, &done_hosts, &target.blockchain_id, poll).await?;
    println!("{} node(s) are validating subnet '{}'", done_hosts.len(), spec.name);
    Ok(())
}
