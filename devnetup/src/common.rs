use std::{
    io::{self, stdout},
    sync::Arc,
};

use clap::{value_parser, Arg};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use devnet_ops::{
    cluster::{self, ClusterConfig, ClustersConfig},
    host::Host,
    poll::PollConfig,
    remote::RemoteExecutor,
    ssh::SshExecutor,
    subnet::SubnetStore,
};
use dialoguer::{theme::ColorfulTheme, Select};
use tokio::time::Duration;

pub fn log_level_arg() -> Arg {
    Arg::new("LOG_LEVEL")
        .long("log-level")
        .short('l')
        .help("Sets the log level")
        .required(false)
        .num_args(1)
        .value_parser(["debug", "info"])
        .default_value("info")
}

pub fn skip_prompt_arg() -> Arg {
    Arg::new("SKIP_PROMPT")
        .long("skip-prompt")
        .short('s')
        .help("Skips prompt mode")
        .required(false)
        .num_args(0)
}

pub fn clusters_file_arg() -> Arg {
    Arg::new("CLUSTERS_FILE_PATH")
        .long("clusters-file-path")
        .help("Sets the clusters file path (defaults to the home directory)")
        .required(false)
        .num_args(1)
}

pub fn subnets_dir_arg() -> Arg {
    Arg::new("SUBNETS_DIR")
        .long("subnets-dir")
        .help("Sets the directory of subnet definitions (defaults to the home directory)")
        .required(false)
        .num_args(1)
}

pub fn key_arg() -> Arg {
    Arg::new("KEY")
        .long("key")
        .help("Sets the hot key to pay with (private key in hex format)")
        .required(true)
        .num_args(1)
}

pub fn nodes_arg() -> Arg {
    Arg::new("NODES")
        .long("nodes")
        .help("Sets the comma-separated host IDs to act on (defaults to every validator)")
        .required(false)
        .num_args(1)
}

pub fn poll_args() -> Vec<Arg> {
    vec![
        Arg::new("POLL_INTERVAL_SECONDS")
            .long("poll-interval-seconds")
            .help("Sets the interval between state checks")
            .required(false)
            .num_args(1)
            .value_parser(value_parser!(u64))
            .default_value("10"),
        Arg::new("POLL_TIMEOUT_SECONDS")
            .long("poll-timeout-seconds")
            .help("Sets how long to wait for nodes to converge")
            .required(false)
            .num_args(1)
            .value_parser(value_parser!(u64))
            .default_value("60"),
    ]
}

pub fn poll_config(interval_seconds: u64, timeout_seconds: u64) -> PollConfig {
    PollConfig::new(
        Duration::from_secs(interval_seconds),
        Duration::from_secs(timeout_seconds),
    )
}

pub fn split_ids(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

pub fn clusters_file_or_default(p: &str) -> String {
    if p.is_empty() {
        cluster::default_file_path()
    } else {
        p.to_string()
    }
}

pub fn subnet_store(dir: &str) -> SubnetStore {
    if dir.is_empty() {
        SubnetStore::new(&SubnetStore::default_dir())
    } else {
        SubnetStore::new(dir)
    }
}

pub fn init_logger(log_level: &str) {
    // ref. <https://github.com/env-logger-rs/env_logger/issues/47>
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );
}

pub fn step(msg: &str) -> io::Result<()> {
    execute!(
        stdout(),
        SetForegroundColor(Color::Green),
        Print(format!("\n\n\nSTEP: {msg}\n\n")),
        ResetColor
    )
}

/// Returns true if the operator chose to proceed.
pub fn confirm(skip_prompt: bool, no: String, yes: String) -> io::Result<bool> {
    if skip_prompt {
        return Ok(true);
    }
    println!();
    let options = &[no, yes];
    let selected = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select your option")
        .items(&options[..])
        .default(0)
        .interact()?;
    Ok(selected == 1)
}

pub fn load_cluster(clusters_file: &str, name: &str) -> io::Result<(ClustersConfig, ClusterConfig)> {
    let clusters = ClustersConfig::load(clusters_file)?;
    clusters.validate()?;
    let cluster = clusters.get(name)?.clone();
    Ok((clusters, cluster))
}

pub fn save_cluster(clusters_file: &str, mut clusters: ClustersConfig, cluster: ClusterConfig) -> io::Result<()> {
    clusters.upsert(cluster);
    clusters.sync(clusters_file)
}

pub fn executor() -> Arc<dyn RemoteExecutor> {
    Arc::new(SshExecutor::default())
}

pub fn print_hosts(hosts: &[Host]) {
    for h in hosts.iter() {
        println!(
            "{} ({}, {}, {})",
            h.id(),
            h.role,
            h.ip,
            h.node_id.clone().unwrap_or_default()
        );
    }
}

/// RUST_LOG=debug cargo test --package devnetup --bin devnetup -- common::test_save_cluster --exact --show-output
#[test]
fn test_save_cluster() {
    use devnet_ops::{
        cluster::Network,
        host::{Cloud, Role},
    };

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let clusters_file = dir.path().join("clusters.yaml").display().to_string();

    // nothing saved yet
    assert!(load_cluster(&clusters_file, "c1").is_err());

    let hosts = vec![
        Host::new(Cloud::Aws, "i-1", "10.0.0.1", "ubuntu", "/tmp/k.pem"),
        Host::new(Cloud::Aws, "i-2", "10.0.0.2", "ubuntu", "/tmp/k.pem").with_role(Role::Api),
    ];
    let cluster = ClusterConfig::new("c1", Network::devnet(1338, "http://10.0.0.2:9650"), hosts);
    let clusters = ClustersConfig::load_or_default(&clusters_file).unwrap();
    save_cluster(&clusters_file, clusters, cluster.clone()).unwrap();

    let (clusters, mut loaded) = load_cluster(&clusters_file, "c1").unwrap();
    assert_eq!(loaded, cluster);

    loaded.track_subnet("mysubnet");
    save_cluster(&clusters_file, clusters, loaded).unwrap();
    let (clusters, loaded) = load_cluster(&clusters_file, "c1").unwrap();
    assert_eq!(clusters.clusters.len(), 1);
    assert_eq!(loaded.subnets, vec!["mysubnet".to_string()]);

    assert_eq!(split_ids(" i-1,,i-2 ,"), vec!["i-1".to_string(), "i-2".to_string()]);
    assert_eq!(clusters_file_or_default(&clusters_file), clusters_file);
}
