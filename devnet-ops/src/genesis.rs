use std::{collections::BTreeMap, fs};

use avalanche_types::{
    avalanchego::{
        config as avalanchego_config,
        genesis::{self as avalanchego_genesis, Allocation, LockedAmount, Staker},
    },
    coreth::genesis as coreth_genesis,
};

use crate::{
    errors::{Error, Result},
    host::Host,
};

/// Genesis stakers take a 100% delegation fee.
pub const INITIAL_STAKER_DELEGATION_FEE: u32 = 1_000_000;
/// Locked allocations unlock one year after genesis.
pub const LOCKTIME_START_DELTA_SECS: u64 = 365 * 24 * 3600;

pub const ALLOCATION_ETH_ADDRESS: &str = "0xb3d82b1367d362de99ab59a658165aff520cbd4d";

pub const CONFIG_DIR: &str = "/home/ubuntu/.avalanchego/configs";

/// Builds the genesis with every validator host as an initial staker.
/// API hosts carry no stake and are skipped.
pub fn generate_genesis(
    network_id: u32,
    wallet_addr: &str,
    staking_addr: &str,
    hosts: &[Host],
    start_time: u64,
) -> Result<avalanchego_genesis::Genesis> {
    let mut initial_stakers = Vec::new();
    for host in hosts.iter().filter(|h| h.is_validator()) {
        let node_id = host.node_id.clone().ok_or_else(|| Error::Precondition {
            message: format!("host '{}' has no node id for genesis", host.id()),
        })?;
        initial_stakers.push(Staker {
            node_id: Some(node_id),
            reward_address: Some(wallet_addr.to_string()),
            delegation_fee: Some(INITIAL_STAKER_DELEGATION_FEE),
        });
    }
    if initial_stakers.is_empty() {
        return Err(Error::Precondition {
            message: "devnet genesis needs at least one validator host".to_string(),
        });
    }

    let locktime = start_time + LOCKTIME_START_DELTA_SECS;
    Ok(avalanchego_genesis::Genesis {
        network_id,
        allocations: Some(vec![
            Allocation {
                avax_addr: Some(wallet_addr.to_string()),
                eth_addr: Some(ALLOCATION_ETH_ADDRESS.to_string()),
                initial_amount: Some(avalanchego_genesis::DEFAULT_INITIAL_AMOUNT_X_CHAIN),
                unlock_schedule: Some(vec![
                    LockedAmount {
                        amount: Some(20_000_000_000_000_000),
                        locktime: None,
                    },
                    LockedAmount {
                        amount: Some(10_000_000_000_000_000),
                        locktime: Some(locktime),
                    },
                ]),
            },
            Allocation {
                avax_addr: Some(staking_addr.to_string()),
                eth_addr: Some(ALLOCATION_ETH_ADDRESS.to_string()),
                initial_amount: Some(0),
                unlock_schedule: Some(vec![LockedAmount {
                    amount: Some(10_000_000_000_000_000),
                    locktime: Some(locktime),
                }]),
            },
        ]),
        start_time: Some(start_time),
        initial_stake_duration: Some(avalanchego_genesis::DEFAULT_INITIAL_STAKE_DURATION),
        initial_stake_duration_offset: Some(
            avalanchego_genesis::DEFAULT_INITIAL_STAKE_DURATION_OFFSET,
        ),
        initial_staked_funds: Some(vec![staking_addr.to_string()]),
        initial_stakers: Some(initial_stakers),
        c_chain_genesis: coreth_genesis::Genesis::default(),
        message: Some("devnet".to_string()),
    })
}

/// Genesis file contents as avalanchego reads them (C-chain genesis
/// embedded as a string).
pub fn encode_genesis(genesis: &avalanchego_genesis::Genesis) -> Result<String> {
    let tmp_path = random_manager::tmp_path(10, Some(".json"))?;
    genesis.sync(&tmp_path)?;
    let d = fs::read_to_string(&tmp_path);
    fs::remove_file(&tmp_path)?;
    Ok(d?)
}

/// Builds one node config per host. Validators come first and each one
/// bootstraps from the validators before it; API hosts bootstrap from all.
pub fn generate_node_configs(
    network_id: u32,
    hosts: &[Host],
) -> Result<BTreeMap<String, avalanchego_config::Config>> {
    let ordered = hosts
        .iter()
        .filter(|h| h.is_validator())
        .chain(hosts.iter().filter(|h| h.is_api()));

    let joined = |v: &Vec<String>| if v.is_empty() { None } else { Some(v.join(",")) };
    let mut bootstrap_ids: Vec<String> = Vec::new();
    let mut bootstrap_ips: Vec<String> = Vec::new();
    let mut configs = BTreeMap::new();
    for host in ordered {
        let mut cfg = avalanchego_config::Config::default_custom();
        cfg.network_id = network_id;
        cfg.public_ip = Some(host.ip.clone());
        cfg.genesis_file = Some(format!("{CONFIG_DIR}/genesis.json"));
        cfg.bootstrap_ids = joined(&bootstrap_ids);
        cfg.bootstrap_ips = joined(&bootstrap_ips);
        configs.insert(host.id().to_string(), cfg);

        if host.is_validator() {
            let node_id = host.node_id.clone().ok_or_else(|| Error::Precondition {
                message: format!("host '{}' has no node id for bootstrapping", host.id()),
            })?;
            bootstrap_ids.push(node_id);
            bootstrap_ips.push(host.staking_address());
        }
    }
    Ok(configs)
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- genesis::test_generate --exact --show-output
#[test]
fn test_generate() {
    use crate::host::Role;
    use crate::testutil::hosts;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut hosts = hosts(3);
    hosts[0].role = Role::Api;

    let g = generate_genesis(1338, "X-custom1", "X-custom2", &hosts, 1_700_000_000).unwrap();
    let stakers = g.initial_stakers.clone().unwrap();
    assert_eq!(stakers.len(), 2);
    assert_eq!(stakers[0].node_id.as_deref(), Some("NodeID-2"));
    let allocations = g.allocations.clone().unwrap();
    assert_eq!(
        allocations[1].unlock_schedule.as_ref().unwrap()[0].locktime,
        Some(1_700_000_000 + LOCKTIME_START_DELTA_SECS)
    );

    let v: serde_json::Value = serde_json::from_str(&encode_genesis(&g).unwrap()).unwrap();
    assert_eq!(v["networkID"], 1338);
    assert_eq!(v["initialStakeDuration"], 31_536_000);
    assert_eq!(v["initialStakeDurationOffset"], 5400);
    assert_eq!(v["initialStakers"][0]["nodeID"], "NodeID-2");
    assert_eq!(v["initialStakers"][0]["delegationFee"], 1_000_000);
    assert!(v["allocations"][0]["unlockSchedule"][0].get("locktime").is_none());
    // avalanchego only reads the C-chain genesis as an embedded string
    assert!(v["cChainGenesis"].is_string());

    let configs = generate_node_configs(1338, &hosts).unwrap();
    assert_eq!(configs.len(), 3);
    assert!(configs["i-2"].bootstrap_ids.is_none());
    assert_eq!(configs["i-3"].bootstrap_ids.as_deref(), Some("NodeID-2"));
    assert_eq!(configs["i-3"].bootstrap_ips.as_deref(), Some("10.0.0.2:9651"));
    // api host sees every validator
    assert_eq!(configs["i-1"].bootstrap_ids.as_deref(), Some("NodeID-2,NodeID-3"));

    let v: serde_json::Value = serde_json::from_str(&configs["i-1"].encode_json().unwrap()).unwrap();
    assert_eq!(v["network-id"], 1338);
    assert_eq!(v["public-ip"], "10.0.0.1");
    assert_eq!(v["genesis-file"], format!("{CONFIG_DIR}/genesis.json"));
    assert!(v.get("track-subnets").is_none());

    let mut no_id = hosts.clone();
    no_id[1].node_id = None;
    assert!(generate_genesis(1338, "a", "b", &no_id, 0).is_err());
}
