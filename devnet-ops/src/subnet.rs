use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Error as IoError, ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    cluster::Network,
    errors::{Error, Result},
};

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum VmKind {
    #[default]
    SubnetEvm,
    Custom,
}

/// Subnet and blockchain IDs of one deployment.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct SubnetDeployment {
    pub subnet_id: String,
    pub blockchain_id: String,
}

/// Subnet definition saved next to the clusters file.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct SubnetSpec {
    pub name: String,
    #[serde(default)]
    pub vm: VmKind,
    /// Derived from the name when empty.
    #[serde(default)]
    pub vm_id: String,
    pub vm_version: String,
    /// VM RPC protocol version the node client must speak.
    pub rpc_version: u32,
    /// Chain genesis document (JSON).
    pub chain_genesis: String,
    /// Keyed by network name.
    #[serde(default)]
    pub deployments: BTreeMap<String, SubnetDeployment>,
}

impl SubnetSpec {
    /// Loads a spec file, also used for operator-written templates.
    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading SubnetSpec from {}", file_path);
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

    pub fn deployment(&self, network: &Network) -> Result<&SubnetDeployment> {
        self.deployments
            .get(&network.name())
            .ok_or_else(|| Error::Precondition {
                message: format!(
                    "subnet '{}' is not deployed on {} yet",
                    self.name,
                    network.name()
                ),
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config {
                message: "subnet 'name' cannot be empty".to_string(),
            });
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config {
                message: format!("subnet name '{}' must be alphanumeric", self.name),
            });
        }
        if self.vm_version.is_empty() {
            return Err(Error::Config {
                message: format!("subnet '{}' has no vm version", self.name),
            });
        }
        if self.vm == VmKind::Custom && self.vm_id.is_empty() {
            return Err(Error::Config {
                message: format!("custom VM subnet '{}' needs a vm id", self.name),
            });
        }
        serde_json::from_str::<serde_json::Value>(&self.chain_genesis).map_err(|e| {
            Error::Config {
                message: format!("subnet '{}' chain genesis is not JSON ({e})", self.name),
            }
        })?;
        Ok(())
    }
}

/// Directory of subnet specs, one YAML file per subnet.
#[derive(Debug, Clone)]
pub struct SubnetStore {
    dir: PathBuf,
}

impl SubnetStore {
    pub fn new(dir: &str) -> Self {
        Self {
            dir: PathBuf::from(dir),
        }
    }

    /// Store under the home directory.
    pub fn default_dir() -> String {
        dir_manager::home::named("devnetup-subnets", None)
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yaml"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    pub fn load(&self, name: &str) -> io::Result<SubnetSpec> {
        SubnetSpec::load(&self.file_path(name).to_string_lossy())
    }

    pub fn sync(&self, spec: &SubnetSpec) -> io::Result<()> {
        let p = self.file_path(&spec.name);
        log::info!("syncing SubnetSpec to '{}'", p.display());
        fs::create_dir_all(&self.dir)?;
        let d = serde_yaml::to_string(spec).map_err(|e| {
            IoError::new(
                ErrorKind::Other,
                format!("failed to serialize SubnetSpec to YAML {}", e),
            )
        })?;
        let mut f = File::create(&p)?;
        f.write_all(d.as_bytes())
    }

    /// Reuses the saved spec unless `force` is set or none exists.
    /// Returns the spec and whether it was (re)created.
    pub fn create_or_reuse(
        &self,
        name: &str,
        force: bool,
        template: Option<&SubnetSpec>,
    ) -> Result<(SubnetSpec, bool)> {
        if self.exists(name) && !force {
            log::info!("reusing existing subnet '{name}'");
            let spec = self.load(name)?;
            spec.validate()?;
            return Ok((spec, false));
        }

        let mut spec = template.cloned().ok_or_else(|| Error::Precondition {
            message: format!("subnet '{name}' does not exist and no template was given"),
        })?;
        spec.name = name.to_string();
        // a recreated subnet has no deployments
        spec.deployments.clear();
        spec.validate()?;
        self.sync(&spec)?;
        log::info!("created subnet '{name}' at {}", self.file_path(name).display());
        Ok((spec, true))
    }
}

/// Creates the subnet and its blockchain on a network.
#[async_trait]
pub trait SubnetDeployer: Send + Sync {
    async fn deploy(&self, spec: &SubnetSpec) -> Result<SubnetDeployment>;
}

/// Resolves the VM ID of a spec from its ID or name.
pub fn resolve_vm_id(spec: &SubnetSpec) -> Result<String> {
    if !spec.vm_id.is_empty() {
        return Ok(spec.vm_id.clone());
    }
    let id = avalanche_types::subnet::vm_name_to_id(&spec.name).map_err(|e| Error::Config {
        message: format!("failed to derive vm id from '{}' ({e})", spec.name),
    })?;
    Ok(id.to_string())
}

#[cfg(test)]
pub fn test_spec(name: &str) -> SubnetSpec {
    SubnetSpec {
        name: name.to_string(),
        vm: VmKind::SubnetEvm,
        vm_id: "srEXiWaHuhNyGwPUi444Tu47ZEDwxTWrbQiuD7FmgSAQ6X7Dy".to_string(),
        vm_version: "v0.5.6".to_string(),
        rpc_version: 28,
        chain_genesis: r#"{"config":{"chainId":99999}}"#.to_string(),
        deployments: BTreeMap::new(),
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- subnet::test_create_or_reuse --exact --show-output
#[test]
fn test_create_or_reuse() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let store = SubnetStore::new(dir.path().to_str().unwrap());
    assert!(store.create_or_reuse("mysubnet", false, None).is_err());

    let template = test_spec("ignored");
    let (created, fresh) = store
        .create_or_reuse("mysubnet", false, Some(&template))
        .unwrap();
    assert!(fresh);
    assert_eq!(created.name, "mysubnet");

    let mut deployed = created.clone();
    let network = Network::devnet(1338, "http://10.0.0.1:9650");
    deployed.deployments.insert(
        network.name(),
        SubnetDeployment {
            subnet_id: "subnet".to_string(),
            blockchain_id: "chain".to_string(),
        },
    );
    store.sync(&deployed).unwrap();

    let (reused, fresh) = store
        .create_or_reuse("mysubnet", false, Some(&template))
        .unwrap();
    assert!(!fresh);
    assert_eq!(reused.deployment(&network).unwrap().blockchain_id, "chain");

    let (forced, fresh) = store
        .create_or_reuse("mysubnet", true, Some(&template))
        .unwrap();
    assert!(fresh);
    assert!(forced.deployment(&network).is_err());
    assert_eq!(resolve_vm_id(&forced).unwrap(), template.vm_id);

    let mut bad = test_spec("bad-name");
    assert!(bad.validate().is_err());
    bad.name = "ok".to_string();
    bad.chain_genesis = "{".to_string();
    assert!(bad.validate().is_err());
}
