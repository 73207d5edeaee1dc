mod common;
mod create;
mod deploy;
mod list;
mod refresh_ips;
mod status;
mod sync;
mod upgrade;
mod validate;
mod wiz;

use std::io::{self, stdout};

use clap::{crate_version, ArgMatches, Command};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};

const APP_NAME: &str = "devnetup";

fn string(m: &ArgMatches, id: &str) -> String {
    m.get_one::<String>(id).cloned().unwrap_or_default()
}

fn log_level(m: &ArgMatches) -> String {
    m.get_one::<String>("LOG_LEVEL")
        .cloned()
        .unwrap_or_else(|| String::from("info"))
}

fn poll_interval(m: &ArgMatches) -> u64 {
    m.get_one::<u64>("POLL_INTERVAL_SECONDS").copied().unwrap_or(10)
}

fn poll_timeout(m: &ArgMatches) -> u64 {
    m.get_one::<u64>("POLL_TIMEOUT_SECONDS").copied().unwrap_or(60)
}

fn command() -> Command {
    Command::new(APP_NAME)
        .version(crate_version!())
        .about("Devnet and subnet validator provisioning over SSH")
        .subcommands(vec![
            create::command(),
            deploy::command(),
            sync::command(),
            validate::command(),
            status::command(),
            wiz::command(),
            upgrade::command(),
            refresh_ips::command(),
            list::command(),
        ])
        .subcommand_required(true)
}

/// Every subcommand is safe to re-run; completed steps are detected and skipped.
#[tokio::main]
async fn main() {
    let matches = command().get_matches();

    let res = match matches.subcommand() {
        Some((create::NAME, sub_matches)) => {
            create::execute(create::Flags {
                log_level: log_level(sub_matches),
                skip_prompt: sub_matches.get_flag("SKIP_PROMPT"),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                cluster_name: string(sub_matches, "CLUSTER"),
                inventory_file_path: string(sub_matches, "INVENTORY_FILE_PATH"),
                validators: sub_matches.get_one::<usize>("VALIDATORS").copied().unwrap_or(5),
                api_nodes: sub_matches.get_one::<usize>("API_NODES").copied().unwrap_or(0),
                network_id: sub_matches.get_one::<u32>("NETWORK_ID").copied().unwrap_or(0),
                key: string(sub_matches, "KEY"),
                poll_interval_seconds: poll_interval(sub_matches),
                poll_timeout_seconds: poll_timeout(sub_matches),
            })
            .await
        }

        Some((deploy::NAME, sub_matches)) => {
            deploy::execute(deploy::Flags {
                log_level: log_level(sub_matches),
                skip_prompt: sub_matches.get_flag("SKIP_PROMPT"),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                subnets_dir: string(sub_matches, "SUBNETS_DIR"),
                cluster_name: string(sub_matches, "CLUSTER"),
                subnet_name: string(sub_matches, "SUBNET"),
                subnet_template_file_path: string(sub_matches, "SUBNET_TEMPLATE_FILE_PATH"),
                force_subnet_create: sub_matches.get_flag("FORCE_SUBNET_CREATE"),
                key: string(sub_matches, "KEY"),
            })
            .await
        }

        Some((sync::NAME, sub_matches)) => {
            sync::execute(sync::Flags {
                log_level: log_level(sub_matches),
                skip_prompt: sub_matches.get_flag("SKIP_PROMPT"),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                subnets_dir: string(sub_matches, "SUBNETS_DIR"),
                cluster_name: string(sub_matches, "CLUSTER"),
                subnet_name: string(sub_matches, "SUBNET"),
                nodes: string(sub_matches, "NODES"),
                poll_interval_seconds: poll_interval(sub_matches),
                poll_timeout_seconds: poll_timeout(sub_matches),
            })
            .await
        }

        Some((validate::NAME, sub_matches)) => match sub_matches.subcommand() {
            Some((validate::primary::NAME, sub_sub_matches)) => {
                validate::primary::execute(validate::primary::Flags {
                    log_level: log_level(sub_sub_matches),
                    skip_prompt: sub_sub_matches.get_flag("SKIP_PROMPT"),
                    clusters_file_path: string(sub_sub_matches, "CLUSTERS_FILE_PATH"),
                    cluster_name: string(sub_sub_matches, "CLUSTER"),
                    key: string(sub_sub_matches, "KEY"),
                    stake_in_avax: sub_sub_matches
                        .get_one::<u64>("STAKE_IN_AVAX")
                        .copied()
                        .unwrap_or(0),
                    duration_hours: sub_sub_matches
                        .get_one::<u64>("DURATION_HOURS")
                        .copied()
                        .unwrap_or(0),
                    start_time: sub_sub_matches
                        .get_one::<u64>("START_TIME")
                        .copied()
                        .unwrap_or(0),
                    nodes: string(sub_sub_matches, "NODES"),
                })
                .await
            }
            Some((validate::subnet::NAME, sub_sub_matches)) => {
                validate::subnet::execute(validate::subnet::Flags {
                    log_level: log_level(sub_sub_matches),
                    skip_prompt: sub_sub_matches.get_flag("SKIP_PROMPT"),
                    clusters_file_path: string(sub_sub_matches, "CLUSTERS_FILE_PATH"),
                    subnets_dir: string(sub_sub_matches, "SUBNETS_DIR"),
                    cluster_name: string(sub_sub_matches, "CLUSTER"),
                    subnet_name: string(sub_sub_matches, "SUBNET"),
                    key: string(sub_sub_matches, "KEY"),
                    weight: sub_sub_matches
                        .get_one::<u64>("WEIGHT")
                        .copied()
                        .unwrap_or(0),
                    nodes: string(sub_sub_matches, "NODES"),
                    poll_interval_seconds: poll_interval(sub_sub_matches),
                    poll_timeout_seconds: poll_timeout(sub_sub_matches),
                })
                .await
            }
            _ => unreachable!("unknown validate subcommand"),
        },

        Some((status::NAME, sub_matches)) => {
            status::execute(status::Flags {
                log_level: log_level(sub_matches),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                subnets_dir: string(sub_matches, "SUBNETS_DIR"),
                cluster_name: string(sub_matches, "CLUSTER"),
                subnet_name: string(sub_matches, "SUBNET"),
                json: sub_matches.get_flag("JSON"),
            })
            .await
        }

        Some((wiz::NAME, sub_matches)) => {
            wiz::execute(wiz::Flags {
                log_level: log_level(sub_matches),
                skip_prompt: sub_matches.get_flag("SKIP_PROMPT"),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                subnets_dir: string(sub_matches, "SUBNETS_DIR"),
                cluster_name: string(sub_matches, "CLUSTER"),
                subnet_name: string(sub_matches, "SUBNET"),
                subnet_template_file_path: string(sub_matches, "SUBNET_TEMPLATE_FILE_PATH"),
                force_subnet_create: sub_matches.get_flag("FORCE_SUBNET_CREATE"),
                inventory_file_path: string(sub_matches, "INVENTORY_FILE_PATH"),
                validators: sub_matches.get_one::<usize>("VALIDATORS").copied().unwrap_or(5),
                api_nodes: sub_matches.get_one::<usize>("API_NODES").copied().unwrap_or(0),
                network_id: sub_matches.get_one::<u32>("NETWORK_ID").copied().unwrap_or(0),
                key: string(sub_matches, "KEY"),
                weight: sub_matches.get_one::<u64>("WEIGHT").copied().unwrap_or(0),
                poll_interval_seconds: poll_interval(sub_matches),
                poll_timeout_seconds: poll_timeout(sub_matches),
            })
            .await
        }

        Some((upgrade::NAME, sub_matches)) => {
            upgrade::execute(upgrade::Flags {
                log_level: log_level(sub_matches),
                skip_prompt: sub_matches.get_flag("SKIP_PROMPT"),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                cluster_name: string(sub_matches, "CLUSTER"),
            })
            .await
        }

        Some((refresh_ips::NAME, sub_matches)) => {
            refresh_ips::execute(refresh_ips::Flags {
                log_level: log_level(sub_matches),
                skip_prompt: sub_matches.get_flag("SKIP_PROMPT"),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
                cluster_name: string(sub_matches, "CLUSTER"),
                inventory_file_path: string(sub_matches, "INVENTORY_FILE_PATH"),
            })
            .await
        }

        Some((list::NAME, sub_matches)) => {
            list::execute(list::Flags {
                log_level: log_level(sub_matches),
                clusters_file_path: string(sub_matches, "CLUSTERS_FILE_PATH"),
            })
            .await
        }

        _ => unreachable!("unknown subcommand"),
    };

    if let Err(e) = res {
        fail(&e);
        std::process::exit(1);
    }
}

fn fail(e: &io::Error) {
    let _ = execute!(
        stdout(),
        SetForegroundColor(Color::Red),
        Print(format!("\n\nFAILED: {e}\n")),
        ResetColor
    );
}

/// RUST_LOG=debug cargo test --package devnetup --bin devnetup -- test_command --exact --show-output
#[test]
fn test_command() {
    command().debug_assert();

    let m = command()
        .try_get_matches_from([
            APP_NAME,
            "validate",
            "subnet",
            "mycluster",
            "mysubnet",
            "--key",
            "0x56289e99c94b6912bfc12adc093c9b51124f0dc54ac7a766b2bc5ccf558d8027",
            "--nodes",
            "i-1, i-2",
        ])
        .unwrap();
    let (name, sub) = m.subcommand().unwrap();
    assert_eq!(name, validate::NAME);
    let (name, sub) = sub.subcommand().unwrap();
    assert_eq!(name, validate::subnet::NAME);
    assert_eq!(string(sub, "CLUSTER"), "mycluster");
    assert_eq!(sub.get_one::<u64>("WEIGHT").copied(), Some(20));
    assert_eq!(poll_timeout(sub), 60);
    assert_eq!(
        common::split_ids(&string(sub, "NODES")),
        vec!["i-1".to_string(), "i-2".to_string()]
    );

    let m = command()
        .try_get_matches_from([
            APP_NAME,
            "refresh-ips",
            "mycluster",
            "--inventory-file-path",
            "/tmp/inventory.yaml",
        ])
        .unwrap();
    let (name, sub) = m.subcommand().unwrap();
    assert_eq!(name, refresh_ips::NAME);
    assert_eq!(string(sub, "INVENTORY_FILE_PATH"), "/tmp/inventory.yaml");

    // the key is mandatory for anything that signs
    assert!(command()
        .try_get_matches_from([APP_NAME, "validate", "primary", "mycluster"])
        .is_err());
}
