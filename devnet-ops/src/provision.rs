use std::{
    fs::File,
    io::{self, Error as IoError, ErrorKind},
    path::Path,
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    genesis::{encode_genesis, generate_genesis, generate_node_configs},
    host::{Host, Role},
    node_results::fan_out,
    remote::{RemoteCommand, RemoteExecutor},
};

/// What a new devnet needs.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct CreateRequest {
    pub validators: usize,
    #[serde(default)]
    pub api_nodes: usize,
}

/// Creates (or hands over) the machines of a cluster.
#[async_trait]
pub trait HostProvisioner: Send + Sync {
    async fn create_hosts(&self, cluster_name: &str, request: &CreateRequest) -> Result<Vec<Host>>;
}

/// Hosts created ahead of time and listed in an inventory file.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct Inventory {
    pub hosts: Vec<Host>,
}

impl Inventory {
    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading Inventory from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(IoError::new(
                ErrorKind::NotFound,
                format!("file {} does not exists", file_path),
            ));
        }
        let f = File::open(file_path).map_err(|e| {
            IoError::new(
                ErrorKind::Other,
                format!("failed to open {} ({})", file_path, e),
            )
        })?;
        serde_yaml::from_reader(f)
            .map_err(|e| IoError::new(ErrorKind::InvalidInput, format!("invalid YAML: {}", e)))
    }
}

/// Provisions from an operator-written inventory.
#[derive(Debug, Clone)]
pub struct InventoryProvisioner {
    pub inventory_path: String,
}

#[async_trait]
impl HostProvisioner for InventoryProvisioner {
    async fn create_hosts(&self, cluster_name: &str, request: &CreateRequest) -> Result<Vec<Host>> {
        let inventory = Inventory::load(&self.inventory_path)?;
        select_hosts(cluster_name, inventory.hosts, request)
    }
}

/// Picks the requested number of validator and API hosts from a pool.
pub fn select_hosts(cluster_name: &str, pool: Vec<Host>, request: &CreateRequest) -> Result<Vec<Host>> {
    let validators: Vec<Host> = pool
        .iter()
        .filter(|h| h.is_validator())
        .take(request.validators)
        .cloned()
        .collect();
    let apis: Vec<Host> = pool
        .iter()
        .filter(|h| h.is_api())
        .take(request.api_nodes)
        .cloned()
        .collect();
    if validators.len() < request.validators || apis.len() < request.api_nodes {
        return Err(Error::Precondition {
            message: format!(
                "cluster '{cluster_name}' needs {} validator(s) and {} api node(s), inventory has {} and {}",
                request.validators,
                request.api_nodes,
                validators.len(),
                apis.len()
            ),
        });
    }
    let monitors = pool.into_iter().filter(|h| h.role == Role::Monitor).take(1);
    Ok(validators.into_iter().chain(apis).chain(monitors).collect())
}

/// Keys referenced by the devnet genesis.
#[derive(Debug, Clone)]
pub struct GenesisKeys {
    /// Funded address, also the reward address of genesis stakers.
    pub wallet_addr: String,
    pub staking_addr: String,
}

impl GenesisKeys {
    /// Funds and stakes the genesis from the X-chain address of one hot key.
    pub fn from_key_hex(key_hex: &str, network_id: u32) -> Result<Self> {
        let key = avalanche_types::key::secp256k1::private_key::Key::from_hex(
            prefix_manager::strip_0x(key_hex),
        )
        .map_err(|e| Error::Config {
            message: format!("invalid private key ({e})"),
        })?;
        let addr = key
            .to_public_key()
            .to_hrp_address(network_id, "X")
            .map_err(|e| Error::Config {
                message: format!("failed to derive X-chain address ({e})"),
            })?;
        Ok(Self {
            wallet_addr: addr.clone(),
            staking_addr: addr,
        })
    }
}

/// Pushes a fresh genesis and per-node config to every node host and restarts it.
pub async fn setup_devnet(
    exec: &Arc<dyn RemoteExecutor>,
    network_id: u32,
    keys: &GenesisKeys,
    hosts: &[Host],
    start_time: u64,
) -> Result<()> {
    let node_hosts: Vec<Host> = hosts.iter().filter(|h| h.role != Role::Monitor).cloned().collect();
    let genesis = encode_genesis(&generate_genesis(
        network_id,
        &keys.wallet_addr,
        &keys.staking_addr,
        &node_hosts,
        start_time,
    )?)?;
    let configs = Arc::new(generate_node_configs(network_id, &node_hosts)?);
    log::info!("setting up devnet {network_id} on {} node(s)", node_hosts.len());

    let exec = Arc::clone(exec);
    let results = fan_out(&node_hosts, move |host| {
        let exec = Arc::clone(&exec);
        let configs = Arc::clone(&configs);
        let genesis = genesis.clone();
        async move {
            let node_config = configs
                .get(host.id())
                .ok_or_else(|| Error::Other {
                    message: format!("no node config for '{}'", host.id()),
                })?
                .encode_json()?;
            exec.execute(&host, &RemoteCommand::SetupNode { genesis, node_config })
                .await?;
            Ok(())
        }
    })
    .await;
    results.into_result("failed to deploy node(s)")?;
    Ok(())
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- provision::test_select_hosts --exact --show-output
#[test]
fn test_select_hosts() {
    use crate::testutil::hosts;

    let mut pool = hosts(5);
    pool[3].role = Role::Api;
    pool[4].role = Role::Monitor;

    let picked = select_hosts("c1", pool.clone(), &CreateRequest { validators: 2, api_nodes: 1 }).unwrap();
    let ids: Vec<&str> = picked.iter().map(|h| h.id()).collect();
    assert_eq!(ids, vec!["i-1", "i-2", "i-4", "i-5"]);

    assert!(matches!(
        select_hosts("c1", pool, &CreateRequest { validators: 4, api_nodes: 0 }),
        Err(Error::Precondition { .. })
    ));

    let f = tempfile::NamedTempFile::new().unwrap();
    assert!(Inventory::load(f.path().to_str().unwrap()).is_err());
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- provision::test_setup_devnet --exact --show-output
#[tokio::test]
async fn test_setup_devnet() {
    use crate::testutil::{hosts, node_reply, unreachable, FnExecutor};

    let hosts = hosts(3);
    let fake = FnExecutor::new(|host, cmd| {
        if let RemoteCommand::SetupNode { genesis, node_config } = cmd {
            assert!(genesis.contains("\"networkID\":1338"));
            assert!(node_config.contains(&host.ip));
        }
        node_reply(host, cmd, "syncing")
    });
    let exec: Arc<dyn RemoteExecutor> = fake.clone();
    let keys = GenesisKeys {
        wallet_addr: "P-custom1".to_string(),
        staking_addr: "P-custom2".to_string(),
    };
    setup_devnet(&exec, 1338, &keys, &hosts, 1_700_000_000).await.unwrap();
    assert_eq!(fake.count("setup-node"), 3);

    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| {
        if host.id() == "i-2" {
            return Err(unreachable(host));
        }
        node_reply(host, cmd, "syncing")
    });
    let err = setup_devnet(&exec, 1338, &keys, &hosts, 1_700_000_000)
        .await
        .unwrap_err();
    assert_eq!(err.failed_hosts(), vec!["i-2".to_string()]);
}
