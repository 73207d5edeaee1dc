use std::io;

use clap::{Arg, Command};
use devnet_ops::{
    checks,
    compatibility::{CompatibilityOracle, GithubOracle},
    subnet::SubnetSpec,
    wallet::WalletConnector,
    wiz::Connector,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::common;

pub const NAME: &str = "deploy";

/// Defines "deploy" option.
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
    pub key: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Creates the subnet and its blockchain on the cluster's network")
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
        .arg(common::key_arg())
}

pub async fn execute(opts: Flags) -> io::Result<()> {
    common::init_logger(&opts.log_level);

    let clusters_file = common::clusters_file_or_default(&opts.clusters_file_path);
    let (_, cluster) = common::load_cluster(&clusters_file, &opts.cluster_name)?;
    let store = common::subnet_store(&opts.subnets_dir);

    let template = if opts.subnet_template_file_path.is_empty() {
        None
    } else {
        Some(SubnetSpec::load(&opts.subnet_template_file_path)?)
    };
    let (mut spec, _) =
        store.create_or_reuse(&opts.subnet_name, opts.force_subnet_create, template.as_ref())?;

    let network_name = cluster.network.name();
    if let Some(d) = spec.deployments.get(&network_name) {
        println!(
            "subnet '{}' is already deployed on {network_name} (subnet {}, blockchain {})",
            spec.name, d.subnet_id, d.blockchain_id
        );
        return Ok(());
    }

    common::step("checking subnet compatibility")?;
    let exec = common::executor();
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(GithubOracle::new()?);
    checks::check_hosts_are_rpc_compatible(&exec, &oracle, &cluster.node_hosts(), spec.rpc_version)
        .await?;

    let proceed = common::confirm(
        opts.skip_prompt,
        format!("No, I am not ready to deploy subnet '{}'", spec.name),
        format!(
            "Yes, let's deploy subnet '{}' (VM {}) on {network_name} via {}",
            spec.name, spec.vm_version, cluster.network.endpoint
        ),
    )?;
    if !proceed {
        return Ok(());
    }

    common::step("creating the subnet and blockchain")?;
    let (_, subnet_deployer) = WalletConnector::new(&opts.key)
        .connect(&cluster.network)
        .await?;
    let deployment = subnet_deployer.deploy(&spec).await?;
    println!(
        "deployed subnet '{}' (subnet {}, blockchain {})",
        spec.name, deployment.subnet_id, deployment.blockchain_id
    );
    spec.deployments.insert(network_name, deployment);
    store.sync(&spec)?;
    Ok(())
}
