use std::{
    collections::{BTreeMap, HashSet},
    fs::{self, File},
    io::{self, Error as IoError, ErrorKind, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{
    errors::{Error, Result},
    host::{Host, Role},
};

pub const VERSION: u16 = 1;

pub const MAINNET_NETWORK_ID: u32 = 1;
pub const FUJI_NETWORK_ID: u32 = 5;
pub const DEFAULT_DEVNET_NETWORK_ID: u32 = 1338;

pub const MAINNET_API_ENDPOINT: &str = "https://api.avax.network";
pub const FUJI_API_ENDPOINT: &str = "https://api.avax-test.network";

/// 1 AVAX in nAVAX.
pub const NANO_AVAX_PER_AVAX: u64 = 1_000_000_000;

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Local,
    Devnet,
    Fuji,
    Mainnet,
}

/// Network-wide staking parameters used to build validator intents.
/// Smallest lead time between issuing a staking tx and its validation start.
pub const MIN_VALIDATING_START_LEAD_TIME_SECS: u64 = 60;

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct NetworkParams {
    /// Minimum primary network stake in nAVAX.
    pub min_validator_stake: u64,
    /// Delegation fee in parts per million (20000 = 2%).
    pub min_delegation_fee: u32,
    pub default_stake_duration_hours: u64,
    /// Lead time between now and the validation start.
    pub validating_start_lead_time_secs: u64,
    /// Static fee for adding a primary network validator, in nAVAX.
    pub add_primary_network_validator_fee: u64,
    /// Static fee for adding a subnet validator, in nAVAX.
    pub add_subnet_validator_fee: u64,
}

impl NetworkParams {
    pub fn for_kind(kind: NetworkKind) -> Self {
        let (min_validator_stake, default_stake_duration_hours) = match kind {
            NetworkKind::Mainnet => (2_000 * NANO_AVAX_PER_AVAX, 336),
            NetworkKind::Fuji => (NANO_AVAX_PER_AVAX, 48),
            NetworkKind::Local | NetworkKind::Devnet => (2_000 * NANO_AVAX_PER_AVAX, 48),
        };
        Self {
            min_validator_stake,
            min_delegation_fee: 20_000,
            default_stake_duration_hours,
            validating_start_lead_time_secs: MIN_VALIDATING_START_LEAD_TIME_SECS,
            add_primary_network_validator_fee: 0,
            add_subnet_validator_fee: NANO_AVAX_PER_AVAX / 1_000,
        }
    }

    pub fn default_stake_duration(&self) -> Duration {
        Duration::from_secs(self.default_stake_duration_hours * 3600)
    }

    /// Never shorter than what the P-chain wallet accepts.
    pub fn validating_start_lead_time(&self) -> Duration {
        Duration::from_secs(
            self.validating_start_lead_time_secs
                .max(MIN_VALIDATING_START_LEAD_TIME_SECS),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Network {
    pub kind: NetworkKind,
    pub id: u32,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<NetworkParams>,
}

impl Network {
    pub fn devnet(id: u32, endpoint: &str) -> Self {
        Self {
            kind: NetworkKind::Devnet,
            id,
            endpoint: endpoint.to_string(),
            params: None,
        }
    }

    pub fn fuji() -> Self {
        Self {
            kind: NetworkKind::Fuji,
            id: FUJI_NETWORK_ID,
            endpoint: FUJI_API_ENDPOINT.to_string(),
            params: None,
        }
    }

    pub fn mainnet() -> Self {
        Self {
            kind: NetworkKind::Mainnet,
            id: MAINNET_NETWORK_ID,
            endpoint: MAINNET_API_ENDPOINT.to_string(),
            params: None,
        }
    }

    /// Returns the overridden params, or the defaults for this network kind.
    pub fn params(&self) -> NetworkParams {
        self.params
            .clone()
            .unwrap_or_else(|| NetworkParams::for_kind(self.kind))
    }

    /// Name used in node configs and subnet deployment records.
    pub fn name(&self) -> String {
        match self.kind {
            NetworkKind::Mainnet => "mainnet".to_string(),
            NetworkKind::Fuji => "fuji".to_string(),
            NetworkKind::Local | NetworkKind::Devnet => format!("network-{}", self.id),
        }
    }
}

/// Owns the host set of one logical cluster.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    pub name: String,
    pub network: Network,
    pub hosts: Vec<Host>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_host_id: Option<String>,
    /// Names of the subnets this cluster tracks.
    #[serde(default)]
    pub subnets: Vec<String>,
}

impl ClusterConfig {
    pub fn new(name: &str, network: Network, hosts: Vec<Host>) -> Self {
        Self {
            name: name.to_string(),
            network,
            hosts,
            monitoring_host_id: None,
            subnets: Vec::new(),
        }
    }

    pub fn host(&self, id: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id() == id)
    }

    /// Hosts that stake (API and monitoring hosts excluded).
    pub fn validator_hosts(&self) -> Vec<Host> {
        self.hosts
            .iter()
            .filter(|h| h.is_validator())
            .cloned()
            .collect()
    }

    pub fn api_hosts(&self) -> Vec<Host> {
        self.hosts.iter().filter(|h| h.is_api()).cloned().collect()
    }

    /// Every host running a node (validators and API hosts).
    pub fn node_hosts(&self) -> Vec<Host> {
        self.hosts
            .iter()
            .filter(|h| h.role != Role::Monitor)
            .cloned()
            .collect()
    }

    /// Returns the validator hosts with the given IDs, or all of them when
    /// `ids` is empty.
    pub fn filter_hosts(&self, ids: &[String]) -> Result<Vec<Host>> {
        let validators = self.validator_hosts();
        if ids.is_empty() {
            return Ok(validators);
        }

        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            match validators.iter().find(|h| h.id() == id) {
                Some(h) => selected.push(h.clone()),
                None => {
                    return Err(Error::Precondition {
                        message: format!(
                            "node '{id}' is not a validator of cluster '{}'",
                            self.name
                        ),
                    })
                }
            }
        }
        Ok(selected)
    }

    pub fn update_ip(&mut self, id: &str, ip: &str) -> Result<()> {
        let host = self.host_mut(id)?;
        log::info!("updating ip of '{id}' from {} to {ip}", host.ip);
        host.ip = ip.to_string();
        Ok(())
    }

    /// Takes the IP of every cluster host the inventory lists under a new
    /// address. Returns the IDs that moved.
    pub fn refresh_ips(&mut self, inventory: &[Host]) -> Result<Vec<String>> {
        let mut moved = Vec::new();
        for listed in inventory {
            let current = match self.host(listed.id()) {
                Some(h) => h.ip.clone(),
                None => continue,
            };
            if current != listed.ip {
                self.update_ip(listed.id(), &listed.ip)?;
                moved.push(listed.id().to_string());
            }
        }
        Ok(moved)
    }

    /// Records that the cluster tracks the subnet; no-op if already recorded.
    pub fn track_subnet(&mut self, subnet_name: &str) {
        if !self.subnets.iter().any(|s| s == subnet_name) {
            self.subnets.push(subnet_name.to_string());
        }
    }

    fn host_mut(&mut self, id: &str) -> Result<&mut Host> {
        let cluster = self.name.clone();
        self.hosts
            .iter_mut()
            .find(|h| h.id() == id)
            .ok_or_else(|| Error::Config {
                message: format!("host '{id}' not found in cluster '{cluster}'"),
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config {
                message: "'name' cannot be empty".to_string(),
            });
        }
        if self.network.id == 0 {
            return Err(Error::Config {
                message: format!("cluster '{}' has network id 0", self.name),
            });
        }
        if self.network.endpoint.is_empty() {
            return Err(Error::Config {
                message: format!("cluster '{}' has empty network endpoint", self.name),
            });
        }

        let mut seen = HashSet::new();
        for host in self.hosts.iter() {
            if !seen.insert(host.id()) {
                return Err(Error::Config {
                    message: format!(
                        "cluster '{}' has duplicate host '{}'",
                        self.name,
                        host.id()
                    ),
                });
            }
        }

        if let Some(monitoring) = &self.monitoring_host_id {
            match self.host(monitoring) {
                Some(h) if h.role == Role::Monitor => {}
                _ => {
                    return Err(Error::Config {
                        message: format!(
                            "monitoring host '{monitoring}' is not a monitor host of cluster '{}'",
                            self.name
                        ),
                    })
                }
            }
        }
        Ok(())
    }
}

/// On-disk map of every named cluster.
/// Read-modify-write per command; the last writer wins.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ClustersConfig {
    pub version: u16,
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterConfig>,
}

impl Default for ClustersConfig {
    fn default() -> Self {
        Self {
            version: VERSION,
            clusters: BTreeMap::new(),
        }
    }
}

/// Default location of the clusters file.
pub fn default_file_path() -> String {
    dir_manager::home::named("devnetup-clusters", Some(".yaml"))
}

impl ClustersConfig {
    pub fn encode_yaml(&self) -> io::Result<String> {
        serde_yaml::to_string(&self).map_err(|e| {
            IoError::new(
                ErrorKind::Other,
                format!("failed to serialize ClustersConfig to YAML {}", e),
            )
        })
    }

    /// Saves the whole file.
    pub fn sync(&self, file_path: &str) -> io::Result<()> {
        log::info!("syncing ClustersConfig to '{}'", file_path);

        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            log::info!("creating parent dir '{}'", parent_dir.display());
            fs::create_dir_all(parent_dir)?;
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())
    }

    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading ClustersConfig from {}", file_path);

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

    /// Loads the file, or starts empty if it does not exist yet.
    pub fn load_or_default(file_path: &str) -> io::Result<Self> {
        match Self::load(file_path) {
            Ok(c) => Ok(c),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<()> {
        log::info!("validating ClustersConfig");

        if self.version != VERSION {
            return Err(Error::Config {
                message: format!("version unexpected {}, expected {}", self.version, VERSION),
            });
        }
        for (name, cluster) in self.clusters.iter() {
            if name != &cluster.name {
                return Err(Error::Config {
                    message: format!("cluster key '{name}' does not match name '{}'", cluster.name),
                });
            }
            cluster.validate()?;
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&ClusterConfig> {
        self.clusters.get(name).ok_or_else(|| Error::Config {
            message: format!("cluster '{name}' does not exist"),
        })
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ClusterConfig> {
        self.clusters.get_mut(name).ok_or_else(|| Error::Config {
            message: format!("cluster '{name}' does not exist"),
        })
    }

    pub fn upsert(&mut self, cluster: ClusterConfig) {
        self.clusters.insert(cluster.name.clone(), cluster);
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- cluster::test_clusters_config --exact --show-output
#[test]
fn test_clusters_config() {
    use crate::host::Cloud;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let hosts = vec![
        Host::new(Cloud::Aws, "i-1", "10.0.0.1", "ubuntu", "/tmp/k.pem"),
        Host::new(Cloud::Aws, "i-2", "10.0.0.2", "ubuntu", "/tmp/k.pem"),
        Host::new(Cloud::Aws, "i-3", "10.0.0.3", "ubuntu", "/tmp/k.pem").with_role(Role::Api),
        Host::new(Cloud::Aws, "i-4", "10.0.0.4", "ubuntu", "/tmp/k.pem").with_role(Role::Monitor),
    ];
    let mut cluster = ClusterConfig::new(
        "c1",
        Network::devnet(DEFAULT_DEVNET_NETWORK_ID, "http://10.0.0.3:9650"),
        hosts,
    );
    cluster.monitoring_host_id = Some("i-4".to_string());
    cluster.track_subnet("mysubnet");
    cluster.track_subnet("mysubnet");
    assert_eq!(cluster.subnets, vec!["mysubnet".to_string()]);

    let validators: Vec<String> = cluster
        .validator_hosts()
        .iter()
        .map(|h| h.id().to_string())
        .collect();
    assert_eq!(validators, vec!["i-1".to_string(), "i-2".to_string()]);
    assert_eq!(cluster.node_hosts().len(), 3);
    assert_eq!(cluster.api_hosts().len(), 1);

    assert_eq!(cluster.filter_hosts(&[]).unwrap().len(), 2);
    assert_eq!(cluster.filter_hosts(&["i-2".to_string()]).unwrap()[0].id(), "i-2");
    assert!(matches!(
        cluster.filter_hosts(&["i-3".to_string()]),
        Err(Error::Precondition { .. })
    ));

    cluster.update_ip("i-1", "10.0.1.1").unwrap();
    assert_eq!(cluster.host("i-1").unwrap().ip, "10.0.1.1");
    assert!(cluster.update_ip("i-9", "10.0.1.9").is_err());

    let inventory = vec![
        Host::new(Cloud::Aws, "i-1", "10.0.1.1", "ubuntu", "/tmp/k.pem"),
        Host::new(Cloud::Aws, "i-2", "10.0.2.2", "ubuntu", "/tmp/k.pem"),
        Host::new(Cloud::Aws, "i-9", "10.0.9.9", "ubuntu", "/tmp/k.pem"),
    ];
    assert_eq!(cluster.refresh_ips(&inventory).unwrap(), vec!["i-2".to_string()]);
    assert_eq!(cluster.host("i-2").unwrap().ip, "10.0.2.2");
    assert!(cluster.host("i-9").is_none());

    let mut cfg = ClustersConfig::default();
    cfg.upsert(cluster.clone());
    cfg.validate().unwrap();

    let f = tempfile::NamedTempFile::new().unwrap();
    let p = f.path().to_str().unwrap();
    cfg.sync(p).unwrap();
    let loaded = ClustersConfig::load(p).unwrap();
    assert_eq!(cfg, loaded);
    assert_eq!(loaded.get("c1").unwrap().network.name(), "network-1338");
    assert!(loaded.get("c2").is_err());

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nested").join("clusters.yaml");
    let missing = missing.to_str().unwrap();
    assert_eq!(
        ClustersConfig::load(missing).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(ClustersConfig::load_or_default(missing).unwrap().clusters.is_empty());
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- cluster::test_validate_duplicates --exact --show-output
#[test]
fn test_validate_duplicates() {
    use crate::host::Cloud;

    let hosts = vec![
        Host::new(Cloud::Gcp, "n-1", "10.0.0.1", "ubuntu", "/tmp/k.pem"),
        Host::new(Cloud::Gcp, "n-1", "10.0.0.2", "ubuntu", "/tmp/k.pem"),
    ];
    let cluster = ClusterConfig::new("dup", Network::fuji(), hosts);
    assert!(matches!(cluster.validate(), Err(Error::Config { .. })));

    let mut cluster = ClusterConfig::new("mon", Network::fuji(), Vec::new());
    cluster.monitoring_host_id = Some("n-9".to_string());
    assert!(cluster.validate().is_err());

    let params = Network::mainnet().params();
    assert_eq!(params.default_stake_duration(), Duration::from_secs(336 * 3600));
    assert_eq!(params.min_validator_stake, 2_000 * NANO_AVAX_PER_AVAX);
}
