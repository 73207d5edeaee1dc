use std::{io, sync::Arc};

use clap::{value_parser, Arg, Command};
use devnet_ops::{
    cluster::NANO_AVAX_PER_AVAX,
    compatibility::{CompatibilityOracle, GithubOracle},
    validator::{Registrar, ValidateParams},
    wallet::WalletConnector,
    wiz::Connector,
};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::common;

pub const NAME: &str = "primary";

/// Defines "validate primary" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,
    pub skip_prompt: bool,
    pub clusters_file_path: String,
    pub cluster_name: String,
    pub key: String,
    /// Network minimum when zero.
    pub stake_in_avax: u64,
    /// Staggered network default when zero.
    pub duration_hours: u64,
    /// Now plus the network lead time when zero.
    pub start_time: u64,
    pub nodes: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Adds cluster validator hosts as primary network validators")
        .arg(common::log_level_arg())
        .arg(common::skip_prompt_arg())
        .arg(common::clusters_file_arg())
        .arg(
            Arg::new("CLUSTER")
                .help("Sets the cluster name")
                .required(true)
                .index(1),
        )
        .arg(common::key_arg())
        .arg(
            Arg::new("STAKE_IN_AVAX")
                .long("stake-in-avax")
                .help("Sets the staking amount in P-chain AVAX (not in nAVAX), defaults to the network minimum")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("DURATION_HOURS")
                .long("duration-hours")
                .help("Sets the validation period in hours, applied to every node without staggering")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("START_TIME")
                .long("start-time")
                .help("Sets the validation start in unix seconds")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(common::nodes_arg())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (_, cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let nodes = common::split_ids(&opts.nodes);
    let hosts = if nodes.is_empty() {
        cluster.validator_hosts()
    } else {
        cluster.filter_hosts(&nodes)?
    };
    common::print_hosts(&hosts);

    let params = ValidateParams {
        stake: (opts.stake_in_avax > 0).then(|| opts.stake_in_avax * NANO_AVAX_PER_AVAX),
        start_time: (opts.start_time > 0).then_some(opts.start_time),
        duration: (opts.duration_hours > 0).then(|| Duration::from_secs(opts.duration_hours * 3600)),
        ..Default::default()
    };

    let proceed = common::confirm(
        opts.skip_prompt,
        "No, I am not ready to add primary network validators".to_string(),
        format!(
            "Yes, let's add {} node(s) as primary network validators on {}",
            hosts.len(),
            cluster.network.name()
        ),
    )?;
    if !proceed {
        return Ok(());
    }

    common::step("adding primary network validators")?;
    let (deployer, _) = WalletConnector::new(&opts.key)
        .connect(&cluster.network)
        .await?;
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(GithubOracle::new()?);
    let registrar = Registrar::new(common::executor(), deployer, oracle, cluster.network.clone());
    let report = registrar.validate_primary(&hosts, &params).await?;

    super::print_report(&report)?;
    report.into_result("failed to add primary network validator(s)")?;
    Ok(())
}
