//! Turns bootstrapped hosts into primary network and subnet validators.
//!
//! Every batch re-checks the full chain (bootstrapped, healthy, RPC compatible,
//! synced) before issuing anything, computes the total fee up front, and keeps
//! going past per-host failures so the final report covers every host.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use crate::{
    checks,
    cluster::Network,
    compatibility::CompatibilityOracle,
    errors::{format_host_errors, Error, Result},
    host::Host,
    remote::{RemoteExecutor, SubnetSyncStatus},
    staking::{Deployer, FeeSchedule, ValidatorIntent},
    subnet::SubnetSpec,
    wallet::now_unix,
};

/// Default weight of a subnet validator.
pub const DEFAULT_SUBNET_WEIGHT: u64 = 20;
/// Expirations of validators added in one batch are spread a day apart.
pub const STAGGER_STEP: Duration = Duration::from_secs(24 * 3600);

/// Where a host stands on the way to validating a subnet.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorState {
    Unbootstrapped,
    Bootstrapped,
    PrimaryValidator,
    SubnetSynced,
    SubnetValidator,
}

/// Observed facts a state is derived from.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HostFacts {
    pub bootstrapped: bool,
    pub primary_validator: bool,
    pub subnet_sync: Option<SubnetSyncStatus>,
}

impl ValidatorState {
    pub fn derive(facts: &HostFacts) -> Self {
        if !facts.bootstrapped {
            return ValidatorState::Unbootstrapped;
        }
        match facts.subnet_sync {
            Some(SubnetSyncStatus::Validating) => ValidatorState::SubnetValidator,
            Some(SubnetSyncStatus::Syncing) => ValidatorState::SubnetSynced,
            _ if facts.primary_validator => ValidatorState::PrimaryValidator,
            _ => ValidatorState::Bootstrapped,
        }
    }

    /// Only a host synced to the subnet may be added as its validator;
    /// a synced host that is not yet a primary validator gets promoted first.
    pub fn ensure_can_add_subnet_validator(&self, host_id: &str) -> Result<()> {
        match self {
            ValidatorState::SubnetSynced => Ok(()),
            ValidatorState::Unbootstrapped => Err(Error::NotReady {
                message: format!("node {host_id} is not bootstrapped yet"),
                hosts: vec![host_id.to_string()],
            }),
            ValidatorState::Bootstrapped | ValidatorState::PrimaryValidator => {
                Err(Error::NotReady {
                    message: format!("node {host_id} is not synced to subnet yet"),
                    hosts: vec![host_id.to_string()],
                })
            }
            ValidatorState::SubnetValidator => Err(Error::Precondition {
                message: format!("node {host_id} is already a subnet validator"),
            }),
        }
    }
}

/// Knobs of one registration batch.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ValidateParams {
    /// Primary network stake in nAVAX; network minimum when None.
    pub stake: Option<u64>,
    pub subnet_weight: u64,
    /// Unix seconds; now plus the network lead time when None.
    pub start_time: Option<u64>,
    /// Explicit primary validation duration, applied without staggering.
    pub duration: Option<Duration>,
    pub subnet_duration: Option<Duration>,
    pub primary_wait_interval: Duration,
    pub primary_wait_retries: u32,
}

impl Default for ValidateParams {
    fn default() -> Self {
        Self {
            stake: None,
            subnet_weight: DEFAULT_SUBNET_WEIGHT,
            start_time: None,
            duration: None,
            subnet_duration: None,
            primary_wait_interval: Duration::from_secs(1),
            primary_wait_retries: 60,
        }
    }
}

/// The subnet a batch registers validators for.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubnetTarget {
    pub name: String,
    pub subnet_id: String,
    pub blockchain_id: String,
    pub rpc_version: u32,
}

impl SubnetTarget {
    /// Target of a subnet already deployed on the network.
    pub fn from_spec(spec: &SubnetSpec, network: &Network) -> Result<Self> {
        let d = spec.deployment(network)?;
        Ok(Self {
            name: spec.name.clone(),
            subnet_id: d.subnet_id.clone(),
            blockchain_id: d.blockchain_id.clone(),
            rpc_version: spec.rpc_version,
        })
    }
}

/// Per-host outcome of a batch, keyed by host ID.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Default)]
pub struct RegistrationReport {
    /// Transaction IDs of issued transactions.
    pub added: BTreeMap<String, Vec<String>>,
    pub skipped: BTreeMap<String, String>,
    pub failed: BTreeMap<String, String>,
}

impl RegistrationReport {
    fn fail(&mut self, host_id: &str, e: &Error) {
        log::warn!("node {host_id} failed ({e})");
        self.failed.insert(host_id.to_string(), e.to_string());
    }

    fn add(&mut self, host_id: &str, tx_id: String) {
        self.added.entry(host_id.to_string()).or_default().push(tx_id);
    }

    pub fn into_result(self, message: &str) -> Result<Self> {
        if !self.failed.is_empty() {
            return Err(Error::Batch {
                message: message.to_string(),
                failed: self.failed,
            });
        }
        Ok(self)
    }
}

/// Builds the primary network intent of the host at `index` in a batch.
/// Without an explicit duration, the default grows by one day per index.
pub fn primary_intent(
    node_id: &str,
    network: &Network,
    index: usize,
    stake: u64,
    params: &ValidateParams,
    now: u64,
) -> ValidatorIntent {
    let net = network.params();
    let start_time = params
        .start_time
        .unwrap_or(now + net.validating_start_lead_time().as_secs());
    let duration = match params.duration {
        Some(d) => d,
        None => net.default_stake_duration() + STAGGER_STEP * index as u32,
    };
    ValidatorIntent {
        node_id: node_id.to_string(),
        network_id: network.id,
        weight: stake,
        start_time,
        duration,
        delegation_fee: net.min_delegation_fee,
    }
}

/// Builds the subnet intent; never outlives a primary validation issued
/// in the same batch.
pub fn subnet_intent(
    node_id: &str,
    network: &Network,
    params: &ValidateParams,
    primary: Option<&ValidatorIntent>,
    now: u64,
) -> ValidatorIntent {
    let net = network.params();
    let mut start_time = params
        .start_time
        .unwrap_or(now + net.validating_start_lead_time().as_secs());
    if let Some(p) = primary {
        start_time = start_time.max(p.start_time);
    }
    let mut duration = params
        .subnet_duration
        .unwrap_or_else(|| net.default_stake_duration());
    if let Some(p) = primary {
        let remaining = p.end_time().saturating_sub(start_time);
        duration = duration.min(Duration::from_secs(remaining));
    }
    ValidatorIntent {
        node_id: node_id.to_string(),
        network_id: network.id,
        weight: params.subnet_weight,
        start_time,
        duration,
        delegation_fee: net.min_delegation_fee,
    }
}

struct Candidate {
    host_id: String,
    node_id: String,
    needs_primary: bool,
}

pub struct Registrar {
    exec: Arc<dyn RemoteExecutor>,
    deployer: Arc<dyn Deployer>,
    oracle: Arc<dyn CompatibilityOracle>,
    network: Network,
}

impl Registrar {
    pub fn new(
        exec: Arc<dyn RemoteExecutor>,
        deployer: Arc<dyn Deployer>,
        oracle: Arc<dyn CompatibilityOracle>,
        network: Network,
    ) -> Self {
        Self {
            exec,
            deployer,
            oracle,
            network,
        }
    }

    fn fees(&self) -> FeeSchedule {
        FeeSchedule::from(&self.network.params())
    }

    async fn stake(&self, params: &ValidateParams) -> Result<u64> {
        let min_stake = self.deployer.get_min_stake().await?;
        let stake = params.stake.unwrap_or(min_stake);
        if stake < min_stake {
            return Err(Error::Precondition {
                message: format!("stake {stake} nAVAX is below the minimum {min_stake} nAVAX"),
            });
        }
        Ok(stake)
    }

    /// Adds every host as a primary network validator.
    pub async fn validate_primary(
        &self,
        hosts: &[Host],
        params: &ValidateParams,
    ) -> Result<RegistrationReport> {
        checks::check_hosts_are_bootstrapped(&self.exec, hosts).await?;
        checks::check_hosts_are_healthy(&self.exec, hosts).await?;
        let node_ids = checks::node_ids(&self.exec, hosts).await?;
        let stake = self.stake(params).await?;

        let mut report = RegistrationReport::default();
        let mut candidates = Vec::new();
        for host in hosts {
            let Some(node_id) = node_ids.get(host.id()) else {
                continue;
            };
            match self.deployer.is_primary_validator(node_id).await {
                Ok(true) => {
                    log::info!("node {} ({node_id}) is already a primary validator", host.id());
                    report
                        .skipped
                        .insert(host.id().to_string(), "already a primary validator".to_string());
                }
                Ok(false) => candidates.push(Candidate {
                    host_id: host.id().to_string(),
                    node_id: node_id.clone(),
                    needs_primary: true,
                }),
                Err(e) => report.fail(host.id(), &e),
            }
        }

        self.fund(&candidates, 0, stake).await?;
        self.promote(&candidates, stake, params, &mut report).await;
        Ok(report)
    }

    /// Adds every host as a validator of the subnet, promoting synced hosts
    /// to primary validators first when needed.
    pub async fn validate_subnet(
        &self,
        hosts: &[Host],
        target: &SubnetTarget,
        params: &ValidateParams,
    ) -> Result<RegistrationReport> {
        checks::check_hosts_are_bootstrapped(&self.exec, hosts).await?;
        checks::check_hosts_are_healthy(&self.exec, hosts).await?;
        checks::check_hosts_are_rpc_compatible(&self.exec, &self.oracle, hosts, target.rpc_version)
            .await?;
        let node_ids = checks::node_ids(&self.exec, hosts).await?;
        let statuses = checks::subnet_sync_statuses(&self.exec, hosts, &target.blockchain_id)
            .await
            .into_result("failed to get subnet sync status for node(s)")?;

        let mut report = RegistrationReport::default();
        let mut candidates = Vec::new();
        for host in hosts {
            let host_id = host.id();
            let (Some(node_id), Some(sync)) = (node_ids.get(host_id), statuses.get(host_id)) else {
                continue;
            };

            let primary_validator = match self.deployer.is_primary_validator(node_id).await {
                Ok(v) => v,
                Err(e) => {
                    report.fail(host_id, &e);
                    continue;
                }
            };
            let already = match self
                .deployer
                .is_subnet_validator(&target.subnet_id, node_id)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    report.fail(host_id, &e);
                    continue;
                }
            };
            let state = ValidatorState::derive(&HostFacts {
                bootstrapped: true,
                primary_validator,
                subnet_sync: Some(*sync),
            });
            if already || state == ValidatorState::SubnetValidator {
                log::info!("node {host_id} ({node_id}) is already a subnet validator");
                report
                    .skipped
                    .insert(host_id.to_string(), "already a subnet validator".to_string());
                continue;
            }
            if let Err(e) = state.ensure_can_add_subnet_validator(host_id) {
                report.fail(host_id, &e);
                continue;
            }
            candidates.push(Candidate {
                host_id: host_id.to_string(),
                node_id: node_id.clone(),
                needs_primary: !primary_validator,
            });
        }

        let stake = if candidates.iter().any(|c| c.needs_primary) {
            self.stake(params).await?
        } else {
            0
        };
        self.fund(&candidates, candidates.len() as u64, stake).await?;
        let primary_intents = self.promote(&candidates, stake, params, &mut report).await;

        for c in candidates.iter() {
            if report.failed.contains_key(&c.host_id) {
                continue;
            }
            let intent = subnet_intent(
                &c.node_id,
                &self.network,
                params,
                primary_intents.get(&c.host_id),
                now_unix(),
            );
            log::info!(
                "adding node {} ({}) as a validator of subnet '{}'",
                c.host_id,
                c.node_id,
                target.name
            );
            match self
                .deployer
                .add_subnet_validator(&target.subnet_id, &intent)
                .await
            {
                Ok(tx_id) => report.add(&c.host_id, tx_id),
                Err(e) => report.fail(&c.host_id, &e),
            }
        }

        if !report.failed.is_empty() {
            log::warn!(
                "node(s) {} failed to validate subnet {}",
                format_host_errors(&report.failed),
                target.name
            );
        }
        Ok(report)
    }

    /// Computes the batch fee and checks the key covers it (plus stake)
    /// before any transaction is issued.
    async fn fund(&self, candidates: &[Candidate], subnet_additions: u64, stake: u64) -> Result<()> {
        let promotions = candidates.iter().filter(|c| c.needs_primary).count() as u64;
        let fee = self.fees().required_fee(promotions, subnet_additions)?;
        let stake_total = stake.checked_mul(promotions).ok_or_else(|| Error::Precondition {
            message: format!("stake overflow for {promotions} validator(s)"),
        })?;
        log::info!(
            "batch fee {fee} nAVAX for {promotions} primary and {subnet_additions} subnet validator(s), stake {stake_total} nAVAX"
        );
        if fee == 0 && stake_total == 0 {
            return Ok(());
        }
        self.deployer
            .ensure_funded(fee.saturating_add(stake_total))
            .await
    }

    /// Issues primary validator transactions one by one with staggered
    /// durations. Returns the issued intents keyed by host ID.
    async fn promote(
        &self,
        candidates: &[Candidate],
        stake: u64,
        params: &ValidateParams,
        report: &mut RegistrationReport,
    ) -> BTreeMap<String, ValidatorIntent> {
        let now = now_unix();
        let mut issued = BTreeMap::new();
        for (index, c) in candidates.iter().filter(|c| c.needs_primary).enumerate() {
            let intent = primary_intent(&c.node_id, &self.network, index, stake, params, now);
            log::info!(
                "adding node {} ({}) as a primary validator until {}",
                c.host_id,
                c.node_id,
                intent.end_time()
            );
            match self.deployer.add_primary_validator(&intent).await {
                Ok(tx_id) => {
                    report.add(&c.host_id, tx_id);
                    issued.insert(c.host_id.clone(), intent);
                }
                Err(e) => report.fail(&c.host_id, &e),
            }
        }

        for c in candidates.iter() {
            if issued.contains_key(&c.host_id) {
                self.wait_for_primary(&c.node_id, params).await;
            }
        }
        issued
    }

    /// Best effort: gives up quietly after the retry budget or a few
    /// consecutive query errors.
    async fn wait_for_primary(&self, node_id: &str, params: &ValidateParams) -> bool {
        let mut consecutive_errors = 0_u32;
        for _ in 0..params.primary_wait_retries {
            match self.deployer.is_primary_validator(node_id).await {
                Ok(true) => return true,
                Ok(false) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    log::warn!("failed to query validator status of {node_id} ({e})");
                    if consecutive_errors >= 3 {
                        break;
                    }
                }
            }
            sleep(params.primary_wait_interval).await;
        }
        log::warn!("{node_id} is not reported as a primary validator yet, continuing");
        false
    }
}

#[cfg(test)]
fn test_registrar(
    exec: Arc<dyn RemoteExecutor>,
    deployer: Arc<crate::testutil::MockDeployer>,
) -> Registrar {
    Registrar::new(
        exec,
        deployer,
        crate::testutil::test_oracle(vec!["v1.10.11"]),
        Network::devnet(1338, "http://10.0.0.1:9650"),
    )
}

#[cfg(test)]
fn test_target() -> SubnetTarget {
    SubnetTarget {
        name: "mysubnet".to_string(),
        subnet_id: "subnet-1".to_string(),
        blockchain_id: "chain-1".to_string(),
        rpc_version: 28,
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- validator::test_state_precondition --exact --show-output
#[test]
fn test_state_precondition() {
    let facts = |bootstrapped, primary_validator, sync| HostFacts {
        bootstrapped,
        primary_validator,
        subnet_sync: sync,
    };

    let s = ValidatorState::derive(&facts(false, false, Some(SubnetSyncStatus::Syncing)));
    assert_eq!(s, ValidatorState::Unbootstrapped);
    assert!(s.ensure_can_add_subnet_validator("i-1").is_err());

    let s = ValidatorState::derive(&facts(true, false, Some(SubnetSyncStatus::NotSynced)));
    assert_eq!(s, ValidatorState::Bootstrapped);
    let e = s.ensure_can_add_subnet_validator("i-1").unwrap_err();
    assert!(e.to_string().contains("not synced to subnet yet"));

    let s = ValidatorState::derive(&facts(true, true, Some(SubnetSyncStatus::Unknown)));
    assert_eq!(s, ValidatorState::PrimaryValidator);
    assert!(s.ensure_can_add_subnet_validator("i-1").is_err());

    let s = ValidatorState::derive(&facts(true, false, Some(SubnetSyncStatus::Syncing)));
    assert_eq!(s, ValidatorState::SubnetSynced);
    assert!(s.ensure_can_add_subnet_validator("i-1").is_ok());

    let s = ValidatorState::derive(&facts(true, true, Some(SubnetSyncStatus::Validating)));
    assert_eq!(s, ValidatorState::SubnetValidator);
    assert!(matches!(
        s.ensure_can_add_subnet_validator("i-1"),
        Err(Error::Precondition { .. })
    ));
    assert!(ValidatorState::Bootstrapped < ValidatorState::SubnetValidator);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- validator::test_staggered_end_times --exact --show-output
#[test]
fn test_staggered_end_times() {
    let network = Network::devnet(1338, "http://10.0.0.1:9650");
    let params = ValidateParams::default();
    let base = network.params().default_stake_duration();

    let intents: Vec<ValidatorIntent> = (0..5)
        .map(|i| primary_intent(&format!("NodeID-{i}"), &network, i, 100, &params, 1_700_000_000))
        .collect();
    for (i, intent) in intents.iter().enumerate() {
        assert_eq!(intent.duration, base + STAGGER_STEP * i as u32);
        assert_eq!(intent.start_time, 1_700_000_060);
        assert_eq!(intent.delegation_fee, 20_000);
    }
    for w in intents.windows(2) {
        assert!(w[0].end_time() < w[1].end_time());
    }

    let custom = ValidateParams {
        duration: Some(Duration::from_secs(3600)),
        start_time: Some(1_800_000_000),
        ..Default::default()
    };
    let a = primary_intent("NodeID-a", &network, 0, 100, &custom, 0);
    let b = primary_intent("NodeID-b", &network, 3, 100, &custom, 0);
    assert_eq!(a.end_time(), b.end_time());

    // subnet validation stays inside the primary validation
    let s = subnet_intent("NodeID-a", &network, &params, Some(&a), 0);
    assert!(s.end_time() <= a.end_time());
    assert!(s.start_time >= a.start_time);
    assert_eq!(s.weight, DEFAULT_SUBNET_WEIGHT);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- validator::test_validate_subnet_batch --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_validate_subnet_batch() {
    use crate::testutil::{hosts, node_reply, FnExecutor, MockDeployer};

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    // i-1 validating, i-2 and i-3 synced, i-4 not synced, i-5 synced and primary
    let hosts = hosts(5);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| {
        let status = match host.id() {
            "i-1" => "validating",
            "i-4" => "created",
            _ => "syncing",
        };
        node_reply(host, cmd, status)
    });

    let mut deployer = MockDeployer::new(2_000, 1_000_000_000);
    deployer.failing.insert("NodeID-3".to_string());
    deployer.primary.lock().unwrap().insert("NodeID-5".to_string());
    let deployer = Arc::new(deployer);
    let registrar = test_registrar(exec, Arc::clone(&deployer));

    let report = registrar
        .validate_subnet(&hosts, &test_target(), &ValidateParams::default())
        .await
        .unwrap();

    assert_eq!(report.skipped.keys().cloned().collect::<Vec<_>>(), vec!["i-1".to_string()]);
    assert_eq!(
        report.failed.keys().cloned().collect::<Vec<_>>(),
        vec!["i-3".to_string(), "i-4".to_string()]
    );
    assert!(report.failed["i-4"].contains("not synced to subnet yet"));
    assert!(report.failed["i-3"].contains("insufficient funds"));
    // i-2 promoted then added, i-5 only added
    assert_eq!(report.added["i-2"].len(), 2);
    assert_eq!(report.added["i-5"].len(), 1);

    // fee for 2 promotions (i-2, i-3) and 3 subnet additions (i-2, i-3, i-5)
    let params = Network::devnet(1338, "").params();
    let fee = FeeSchedule::from(&params).required_fee(2, 3).unwrap();
    assert_eq!(deployer.funded_with.lock().unwrap().clone(), vec![fee + 2 * 2_000]);

    let subnet_intents = deployer.subnet_intents.lock().unwrap().clone();
    let primary_intents = deployer.primary_intents.lock().unwrap().clone();
    assert_eq!(primary_intents.len(), 1);
    let i2 = subnet_intents.iter().find(|i| i.node_id == "NodeID-2").unwrap();
    assert!(i2.end_time() <= primary_intents[0].end_time());

    let err = report.into_result("failed to validate subnet").unwrap_err();
    assert_eq!(err.failed_hosts(), vec!["i-3".to_string(), "i-4".to_string()]);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- validator::test_validate_primary --exact --show-output
#[tokio::test(start_paused = true)]
async fn test_validate_primary() {
    use crate::testutil::{hosts, node_reply, FnExecutor, MockDeployer};

    let hosts = hosts(3);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| node_reply(host, cmd, "syncing"));

    let deployer = Arc::new(MockDeployer::new(2_000, 1_000_000_000));
    deployer.primary.lock().unwrap().insert("NodeID-1".to_string());
    let registrar = test_registrar(Arc::clone(&exec), Arc::clone(&deployer));

    let low = ValidateParams {
        stake: Some(1_999),
        ..Default::default()
    };
    assert!(matches!(
        registrar.validate_primary(&hosts, &low).await,
        Err(Error::Precondition { .. })
    ));

    let report = registrar
        .validate_primary(&hosts, &ValidateParams::default())
        .await
        .unwrap()
        .into_result("failed to validate primary network")
        .unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.added.len(), 2);

    let intents = deployer.primary_intents.lock().unwrap().clone();
    assert_eq!(intents.len(), 2);
    assert!(intents[0].end_time() < intents[1].end_time());
    assert!(intents.iter().all(|i| i.weight == 2_000));

    // a second run finds nothing left to do
    let again = registrar
        .validate_primary(&hosts, &ValidateParams::default())
        .await
        .unwrap();
    assert!(again.added.is_empty());
    assert_eq!(again.skipped.len(), 3);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- validator::test_validate_subnet_not_bootstrapped --exact --show-output
#[tokio::test]
async fn test_validate_subnet_not_bootstrapped() {
    use crate::remote::RemoteCommand;
    use crate::testutil::{hosts, node_reply, FnExecutor, MockDeployer};
    use serde_json::json;

    let hosts = hosts(2);
    let exec: Arc<dyn RemoteExecutor> = FnExecutor::new(|host, cmd| match cmd {
        RemoteCommand::CheckBootstrapped if host.id() == "i-2" => {
            Ok(json!({"result": {"isBootstrapped": false}}))
        }
        _ => node_reply(host, cmd, "syncing"),
    });
    let deployer = Arc::new(MockDeployer::new(2_000, 1_000_000_000));
    let registrar = test_registrar(exec, Arc::clone(&deployer));

    let err = registrar
        .validate_subnet(&hosts, &test_target(), &ValidateParams::default())
        .await
        .unwrap_err();
    assert!(err.is_not_ready());
    assert!(deployer.subnet_intents.lock().unwrap().is_empty());
    assert!(deployer.funded_with.lock().unwrap().is_empty());
}
