//! One-shot pipeline from nothing to a devnet validating a subnet.
//!
//! Phases run strictly in order and each one is idempotent, so an aborted
//! or interrupted run is resumed by running it again. Nothing is rolled back.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;

use crate::{
    checks,
    cluster::{ClusterConfig, ClustersConfig, Network},
    compatibility::CompatibilityOracle,
    errors::{Error, Result},
    host::Host,
    poll::PollConfig,
    provision::{setup_devnet, CreateRequest, GenesisKeys, HostProvisioner},
    remote::RemoteExecutor,
    staking::Deployer,
    subnet::{SubnetDeployer, SubnetSpec, SubnetStore},
    sync::{sync_subnet, wait_for_healthy, wait_for_subnet_sync, wait_for_subnet_validators},
    validator::{RegistrationReport, Registrar, SubnetTarget, ValidateParams},
    wallet::now_unix,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub enum WizPhase {
    CreateSubnet,
    CreateDevnet,
    DeploySubnet,
    TrackSubnet,
    ValidateSubnet,
}

impl fmt::Display for WizPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, name) = match self {
            WizPhase::CreateSubnet => (1, "create subnet"),
            WizPhase::CreateDevnet => (2, "create devnet"),
            WizPhase::DeploySubnet => (3, "deploy subnet"),
            WizPhase::TrackSubnet => (4, "track subnet"),
            WizPhase::ValidateSubnet => (5, "validate subnet"),
        };
        write!(f, "phase {n}/5 ({name})")
    }
}

/// Opens the transaction side once the network endpoint is known.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, network: &Network) -> Result<(Arc<dyn Deployer>, Arc<dyn SubnetDeployer>)>;
}

/// Everything a run does besides deciding what to do next.
pub struct Collaborators {
    pub exec: Arc<dyn RemoteExecutor>,
    pub provisioner: Arc<dyn HostProvisioner>,
    pub connector: Arc<dyn Connector>,
    pub oracle: Arc<dyn CompatibilityOracle>,
    pub subnets: SubnetStore,
    pub clusters_file: String,
}

#[derive(Debug, Clone)]
pub struct WizRequest {
    pub cluster_name: String,
    /// Devnet only when None.
    pub subnet_name: Option<String>,
    /// Recreates the subnet definition even if one is saved.
    pub force_subnet_create: bool,
    pub subnet_template: Option<SubnetSpec>,
    /// Creates a new devnet when set, reuses the saved cluster otherwise.
    pub create: Option<CreateRequest>,
    pub network_id: u32,
    pub genesis_keys: GenesisKeys,
    pub validate: ValidateParams,
    pub health_poll: PollConfig,
    pub sync_poll: PollConfig,
    pub validate_poll: PollConfig,
}

#[derive(Debug, Clone)]
pub struct WizOutcome {
    pub cluster: ClusterConfig,
    pub subnet: Option<SubnetSpec>,
    pub registration: Option<RegistrationReport>,
}

pub struct Wiz {
    c: Collaborators,
    interrupted: Arc<AtomicBool>,
}

impl Wiz {
    pub fn new(c: Collaborators, interrupted: Arc<AtomicBool>) -> Self {
        Self { c, interrupted }
    }

    fn enter(&self, phase: WizPhase) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            log::warn!("interrupted before {phase}");
            return Err(Error::Interrupted {
                message: format!(
                    "interrupted before {phase}; completed phases are kept, re-run to resume"
                ),
            });
        }
        log::info!("entering {phase}");
        Ok(())
    }

    pub async fn run(&self, req: &WizRequest) -> Result<WizOutcome> {
        let mut phase = WizPhase::CreateSubnet;
        let out = self.run_phases(req, &mut phase).await;
        if let Err(e) = &out {
            log::warn!("wiz stopped in {phase} ({e})");
        }
        out
    }

    async fn run_phases(&self, req: &WizRequest, phase: &mut WizPhase) -> Result<WizOutcome> {
        *phase = WizPhase::CreateSubnet;
        self.enter(*phase)?;
        let mut spec = match &req.subnet_name {
            Some(name) => {
                let (spec, _) = self.c.subnets.create_or_reuse(
                    name,
                    req.force_subnet_create,
                    req.subnet_template.as_ref(),
                )?;
                Some(spec)
            }
            None => None,
        };

        *phase = WizPhase::CreateDevnet;
        self.enter(*phase)?;
        let mut cluster = match &req.create {
            Some(create) => self.create_devnet(req, create).await?,
            None => {
                let clusters = ClustersConfig::load(&self.c.clusters_file)?;
                clusters.get(&req.cluster_name)?.clone()
            }
        };
        wait_for_healthy(&self.c.exec, &cluster.node_hosts(), req.health_poll).await?;

        let Some(spec) = spec.as_mut() else {
            log::info!("devnet '{}' is ready", cluster.name);
            return Ok(WizOutcome {
                cluster,
                subnet: None,
                registration: None,
            });
        };
        let (deployer, subnet_deployer) = self.c.connector.connect(&cluster.network).await?;

        *phase = WizPhase::DeploySubnet;
        self.enter(*phase)?;
        self.deploy_subnet(&cluster, spec, &subnet_deployer).await?;

        *phase = WizPhase::TrackSubnet;
        self.enter(*phase)?;
        let node_hosts = cluster.node_hosts();
        sync_subnet(&self.c.exec, &self.c.oracle, &mut cluster, &node_hosts, spec).await?;
        self.save_cluster(&cluster)?;
        let target = SubnetTarget::from_spec(spec, &cluster.network)?;
        wait_for_subnet_sync(&self.c.exec, &node_hosts, &target.blockchain_id, req.sync_poll)
            .await?;

        *phase = WizPhase::ValidateSubnet;
        self.enter(*phase)?;
        let validators = cluster.validator_hosts();
        let registrar = Registrar::new(
            Arc::clone(&self.c.exec),
            deployer,
            Arc::clone(&self.c.oracle),
            cluster.network.clone(),
        );
        let report = registrar
            .validate_subnet(&validators, &target, &req.validate)
            .await?
            .into_result("failed to add subnet validator(s)")?;
        wait_for_subnet_validators(
            &self.c.exec,
            &validators,
            &target.blockchain_id,
            req.validate_poll,
        )
        .await?;
        log::info!(
            "devnet '{}' is validating subnet '{}'",
            cluster.name,
            spec.name
        );

        Ok(WizOutcome {
            cluster,
            subnet: Some(spec.clone()),
            registration: Some(report),
        })
    }

    async fn create_devnet(&self, req: &WizRequest, create: &CreateRequest) -> Result<ClusterConfig> {
        let hosts = self
            .c
            .provisioner
            .create_hosts(&req.cluster_name, create)
            .await?;
        let endpoint = devnet_endpoint(&hosts)?;
        let network = Network::devnet(req.network_id, &endpoint);
        let cluster = ClusterConfig::new(&req.cluster_name, network, hosts);
        cluster.validate()?;

        setup_devnet(
            &self.c.exec,
            req.network_id,
            &req.genesis_keys,
            &cluster.hosts,
            now_unix(),
        )
        .await?;
        self.save_cluster(&cluster)?;
        Ok(cluster)
    }

    async fn deploy_subnet(
        &self,
        cluster: &ClusterConfig,
        spec: &mut SubnetSpec,
        subnet_deployer: &Arc<dyn SubnetDeployer>,
    ) -> Result<()> {
        let network_name = cluster.network.name();
        if spec.deployments.contains_key(&network_name) {
            log::info!("subnet '{}' is already deployed on {network_name}", spec.name);
            return Ok(());
        }
        checks::check_hosts_are_rpc_compatible(
            &self.c.exec,
            &self.c.oracle,
            &cluster.node_hosts(),
            spec.rpc_version,
        )
        .await?;
        let deployment = subnet_deployer.deploy(spec).await?;
        log::info!(
            "deployed subnet '{}' ({}) with blockchain {}",
            spec.name,
            deployment.subnet_id,
            deployment.blockchain_id
        );
        spec.deployments.insert(network_name, deployment);
        self.c.subnets.sync(spec)?;
        Ok(())
    }

    fn save_cluster(&self, cluster: &ClusterConfig) -> Result<()> {
        let mut clusters = ClustersConfig::load_or_default(&self.c.clusters_file)?;
        clusters.upsert(cluster.clone());
        clusters.sync(&self.c.clusters_file)?;
        Ok(())
    }
}

/// API endpoint of a new devnet: the first API host, or the first validator.
pub fn devnet_endpoint(hosts: &[Host]) -> Result<String> {
    hosts
        .iter()
        .find(|h| h.is_api())
        .or_else(|| hosts.iter().find(|h| h.is_validator()))
        .map(|h| h.api_endpoint())
        .ok_or_else(|| Error::Precondition {
            message: "devnet has no node host".to_string(),
        })
}

#[cfg(test)]
struct TestPool(Vec<Host>);

#[cfg(test)]
#[async_trait]
impl HostProvisioner for TestPool {
    async fn create_hosts(&self, cluster_name: &str, request: &CreateRequest) -> Result<Vec<Host>> {
        crate::provision::select_hosts(cluster_name, self.0.clone(), request)
    }
}

#[cfg(test)]
struct TestChain {
    deployer: Arc<crate::testutil::MockDeployer>,
    deploys: std::sync::Mutex<u32>,
}

#[cfg(test)]
#[async_trait]
impl SubnetDeployer for TestChain {
    async fn deploy(&self, _spec: &SubnetSpec) -> Result<crate::subnet::SubnetDeployment> {
        *self.deploys.lock().unwrap() += 1;
        Ok(crate::subnet::SubnetDeployment {
            subnet_id: "subnet-1".to_string(),
            blockchain_id: "chain-1".to_string(),
        })
    }
}

#[cfg(test)]
struct TestConnector(Arc<TestChain>);

#[cfg(test)]
#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self, network: &Network) -> Result<(Arc<dyn Deployer>, Arc<dyn SubnetDeployer>)> {
        assert_eq!(network.endpoint, "http://10.0.0.1:9650");
        let deployer: Arc<dyn Deployer> = self.0.deployer.clone();
        let chain: Arc<dyn SubnetDeployer> = self.0.clone();
        Ok((deployer, chain))
    }
}

#[cfg(test)]
fn test_request(dir: &std::path::Path) -> (WizRequest, String) {
    let poll = PollConfig::new(
        tokio::time::Duration::from_secs(10),
        tokio::time::Duration::from_secs(60),
    );
    let req = WizRequest {
        cluster_name: "c1".to_string(),
        subnet_name: Some("mysubnet".to_string()),
        force_subnet_create: false,
        subnet_template: Some(crate::subnet::test_spec("mysubnet")),
        create: Some(CreateRequest {
            validators: 3,
            api_nodes: 0,
        }),
        network_id: 1338,
        genesis_keys: GenesisKeys {
            wallet_addr: "P-custom1".to_string(),
            staking_addr: "P-custom2".to_string(),
        },
        validate: ValidateParams::default(),
        health_poll: poll,
        sync_poll: poll,
        validate_poll: poll,
    };
    let clusters_file = dir.join("clusters.yaml").to_string_lossy().to_string();
    (req, clusters_file)
}

/// A node syncs once it tracks the subnet and validates once the chain
/// says so.
#[cfg(test)]
fn test_devnet(
    deployer: Arc<crate::testutil::MockDeployer>,
) -> Arc<crate::testutil::FnExecutor> {
    use std::{collections::BTreeMap, sync::Mutex};

    use crate::{remote::RemoteCommand, testutil::node_reply};

    let tracking: Arc<Mutex<BTreeMap<String, bool>>> = Arc::new(Mutex::new(BTreeMap::new()));
    crate::testutil::FnExecutor::new(move |host, cmd| match cmd {
        RemoteCommand::TrackSubnet { .. } => {
            tracking.lock().unwrap().insert(host.id().to_string(), true);
            Ok(serde_json::json!({"result": {"output": "ok"}}))
        }
        RemoteCommand::SubnetSyncStatus { .. } => {
            let node_id = host.node_id.clone().unwrap_or_default();
            let validating = deployer
                .subnet
                .lock()
                .unwrap()
                .get("subnet-1")
                .map(|s| s.contains(&node_id))
                .unwrap_or(false);
            let status = if validating {
                "validating"
            } else if tracking.lock().unwrap().contains_key(host.id()) {
                "syncing"
            } else {
                "created"
            };
            node_reply(host, cmd, status)
        }
        _ => node_reply(host, cmd, "created"),
    })
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- wiz::test_wiz_end_to_end --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_wiz_end_to_end() {
    use std::sync::Mutex;

    use crate::{
        staking::ValidatorIntent,
        testutil::{hosts, test_oracle, MockDeployer},
    };

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let (req, clusters_file) = test_request(dir.path());

    let deployer = Arc::new(MockDeployer::new(2_000, 1_000_000_000_000));
    let chain = Arc::new(TestChain {
        deployer: Arc::clone(&deployer),
        deploys: Mutex::new(0),
    });
    let fake = test_devnet(Arc::clone(&deployer));
    let exec: Arc<dyn RemoteExecutor> = fake.clone();
    let subnets_dir = dir.path().join("subnets");
    let wiz = Wiz::new(
        Collaborators {
            exec,
            provisioner: Arc::new(TestPool(hosts(4))),
            connector: Arc::new(TestConnector(Arc::clone(&chain))),
            oracle: test_oracle(vec!["v1.10.11"]),
            subnets: SubnetStore::new(subnets_dir.to_str().unwrap()),
            clusters_file: clusters_file.clone(),
        },
        Arc::new(AtomicBool::new(false)),
    );

    let out = wiz.run(&req).await.unwrap();
    assert_eq!(out.cluster.hosts.len(), 3);
    assert_eq!(out.cluster.subnets, vec!["mysubnet".to_string()]);
    let report = out.registration.unwrap();
    assert_eq!(report.added.len(), 3);
    assert_eq!(fake.count("setup-node"), 3);
    assert_eq!(fake.count("track-subnet"), 3);
    assert_eq!(*chain.deploys.lock().unwrap(), 1);

    // every host was promoted to the primary network first, staggered
    let primary: Vec<ValidatorIntent> = deployer.primary_intents.lock().unwrap().clone();
    assert_eq!(primary.len(), 3);
    assert!(primary[0].end_time() < primary[2].end_time());

    let saved = ClustersConfig::load(&clusters_file).unwrap();
    assert_eq!(saved.get("c1").unwrap().subnets, vec!["mysubnet".to_string()]);
    let spec = SubnetStore::new(subnets_dir.to_str().unwrap())
        .load("mysubnet")
        .unwrap();
    assert_eq!(spec.deployments["network-1338"].blockchain_id, "chain-1");

    // re-running against the saved cluster changes nothing on chain
    let rerun = WizRequest {
        create: None,
        ..req
    };
    let out = wiz.run(&rerun).await.unwrap();
    let report = out.registration.unwrap();
    assert!(report.added.is_empty());
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(*chain.deploys.lock().unwrap(), 1);
    assert_eq!(fake.count("setup-node"), 3);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- wiz::test_wiz_stops --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_wiz_stops() {
    use std::sync::Mutex;

    use crate::{
        remote::RemoteCommand,
        testutil::{hosts, node_reply, test_oracle, FnExecutor, MockDeployer},
    };

    let dir = tempfile::tempdir().unwrap();
    let (req, clusters_file) = test_request(dir.path());
    let deployer = Arc::new(MockDeployer::new(2_000, 1_000_000_000_000));
    let chain = Arc::new(TestChain {
        deployer: Arc::clone(&deployer),
        deploys: Mutex::new(0),
    });

    // interrupted before anything runs
    let fake = test_devnet(Arc::clone(&deployer));
    let exec: Arc<dyn RemoteExecutor> = fake.clone();
    let collaborators = |exec: Arc<dyn RemoteExecutor>| Collaborators {
        exec,
        provisioner: Arc::new(TestPool(hosts(3))),
        connector: Arc::new(TestConnector(Arc::clone(&chain))),
        oracle: test_oracle(vec!["v1.10.11"]),
        subnets: SubnetStore::new(dir.path().join("subnets").to_str().unwrap()),
        clusters_file: clusters_file.clone(),
    };
    let wiz = Wiz::new(collaborators(exec), Arc::new(AtomicBool::new(true)));
    let err = wiz.run(&req).await.unwrap_err();
    assert!(matches!(err, Error::Interrupted { .. }));
    assert!(fake.calls.lock().unwrap().is_empty());

    // one host never turns healthy, so the pipeline aborts after phase 2
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| match cmd {
        RemoteCommand::CheckHealthy if host.id() == "i-2" => {
            Ok(serde_json::json!({"result": {"healthy": false}}))
        }
        _ => node_reply(host, cmd, "created"),
    });
    let wiz = Wiz::new(collaborators(exec), Arc::new(AtomicBool::new(false)));
    let err = wiz.run(&req).await.unwrap_err();
    assert!(err.is_not_ready());
    assert_eq!(err.failed_hosts(), vec!["i-2".to_string()]);
    assert_eq!(*chain.deploys.lock().unwrap(), 0);
    // the devnet itself was kept
    assert!(ClustersConfig::load(&clusters_file).unwrap().exists("c1"));
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- wiz::test_phase_display --exact --show-output
#[test]
fn test_phase_display() {
    assert_eq!(WizPhase::TrackSubnet.to_string(), "phase 4/5 (track subnet)");
    assert!(devnet_endpoint(&[]).is_err());
}
