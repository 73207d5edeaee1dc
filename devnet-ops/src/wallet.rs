use std::{
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use avalanche_types::{
    ids::{self, node},
    key, units, wallet,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::{sleep, Duration};

use crate::{
    cluster::{Network, MIN_VALIDATING_START_LEAD_TIME_SECS},
    errors::{Error, Result},
    platform::PlatformClient,
    staking::{Deployer, ValidatorIntent},
    subnet::{resolve_vm_id, SubnetDeployer, SubnetDeployment, SubnetSpec},
    wiz::Connector,
};

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Absolute (start, end) unix seconds an intent is issued with at `now`.
///
/// A stale start moves forward to the minimum lead time. The end never
/// moves, so a subnet validation issued after its primary validation still
/// ends inside it.
pub fn validate_window(intent: &ValidatorIntent, now: u64) -> Result<(u64, u64)> {
    let start = intent
        .start_time
        .max(now.saturating_add(MIN_VALIDATING_START_LEAD_TIME_SECS));
    let end = intent.end_time();
    if end <= start {
        return Err(Error::Precondition {
            message: format!(
                "validation of '{}' would end at {end}, not after its start {start}",
                intent.node_id
            ),
        });
    }
    Ok((start, end))
}

fn utc(secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .ok_or_else(|| Error::Precondition {
            message: format!("invalid unix timestamp {secs}"),
        })
}

/// Issues P-chain transactions with a hot key.
#[derive(Clone)]
pub struct WalletDeployer {
    wallet: wallet::Wallet<key::secp256k1::private_key::Key>,
    platform: PlatformClient,
    pub network_id: u32,
    pub p_chain_address: String,
}

impl WalletDeployer {
    pub async fn new(key_hex: &str, endpoint: &str) -> Result<Self> {
        let platform = PlatformClient::new(endpoint)?;
        let network_id = platform.get_network_id().await?;

        let priv_key = key::secp256k1::private_key::Key::from_hex(prefix_manager::strip_0x(key_hex))
            .map_err(|e| Error::Config {
                message: format!("invalid private key ({e})"),
            })?;
        let p_chain_address = priv_key
            .to_public_key()
            .to_hrp_address(network_id, "P")
            .map_err(|e| Error::Config {
                message: format!("failed to derive P-chain address ({e})"),
            })?;
        let wallet = wallet::Builder::new(&priv_key)
            .base_http_url(endpoint.to_string())
            .build()
            .await
            .map_err(|e| Error::Other {
                message: format!("failed to build wallet ({e})"),
            })?;
        log::info!("loaded wallet '{p_chain_address}' (network id {network_id})");

        Ok(Self {
            wallet,
            platform,
            network_id,
            p_chain_address,
        })
    }

    /// Randomly waits so concurrent callers do not spend the same UTXOs.
    async fn jitter(&self) {
        let wait = Duration::from_millis(500 + random_manager::u64() % 1000);
        log::debug!("waiting random {wait:?} before issuing");
        sleep(wait).await;
    }

    fn node_id(intent: &ValidatorIntent) -> Result<node::Id> {
        node::Id::from_str(&intent.node_id).map_err(|e| Error::Precondition {
            message: format!("invalid node id '{}' ({e})", intent.node_id),
        })
    }
}

fn tx_error(node_id: &str, e: impl std::fmt::Display) -> Error {
    Error::Transaction {
        host: node_id.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl Deployer for WalletDeployer {
    async fn get_min_stake(&self) -> Result<u64> {
        self.platform.get_min_stake().await
    }

    async fn balance(&self) -> Result<u64> {
        let b = self.wallet.p().balance().await.map_err(|e| Error::Other {
            message: format!("failed to fetch P-chain balance ({e})"),
        })?;
        log::info!(
            "'{}' P-chain balance {} AVAX ({b} nAVAX)",
            self.p_chain_address,
            units::cast_xp_navax_to_avax(primitive_types::U256::from(b))
        );
        Ok(b)
    }

    async fn is_primary_validator(&self, node_id: &str) -> Result<bool> {
        let found = self
            .platform
            .current_validators(None, &[node_id.to_string()])
            .await?;
        Ok(found.iter().any(|n| n == node_id))
    }

    async fn is_subnet_validator(&self, subnet_id: &str, node_id: &str) -> Result<bool> {
        let found = self
            .platform
            .current_validators(Some(subnet_id), &[node_id.to_string()])
            .await?;
        Ok(found.iter().any(|n| n == node_id))
    }

    async fn add_primary_validator(&self, intent: &ValidatorIntent) -> Result<String> {
        let node_id = Self::node_id(intent)?;
        self.jitter().await;
        let (start, end) = validate_window(intent, now_unix())?;
        log::info!(
            "adding '{}' as a primary network validator (stake {} nAVAX, {start}..{end}, delegation fee {})",
            intent.node_id,
            intent.weight,
            intent.delegation_fee
        );

        let (tx_id, added) = self
            .wallet
            .p()
            .add_validator()
            .node_id(node_id)
            .stake_amount(intent.weight)
            .start_time(utc(start)?)
            .end_time(utc(end)?)
            .check_acceptance(true)
            .issue()
            .await
            .map_err(|e| tx_error(&intent.node_id, e))?;
        log::info!("primary network validator tx id {tx_id}, added {added}");
        Ok(tx_id.to_string())
    }

    async fn add_subnet_validator(&self, subnet_id: &str, intent: &ValidatorIntent) -> Result<String> {
        let node_id = Self::node_id(intent)?;
        let subnet_id = ids::Id::from_str(subnet_id).map_err(|e| Error::Precondition {
            message: format!("invalid subnet id '{subnet_id}' ({e})"),
        })?;
        self.jitter().await;
        let (start, end) = validate_window(intent, now_unix())?;
        log::info!(
            "adding '{}' as a subnet validator '{subnet_id}' (weight {}, {start}..{end})",
            intent.node_id,
            intent.weight
        );

        let (tx_id, added) = self
            .wallet
            .p()
            .add_subnet_validator()
            .node_id(node_id)
            .subnet_id(subnet_id)
            .weight(intent.weight)
            .start_time(utc(start)?)
            .end_time(utc(end)?)
            .check_acceptance(true)
            .issue()
            .await
            .map_err(|e| tx_error(&intent.node_id, e))?;
        log::info!("subnet validator tx id {tx_id}, added {added}");
        Ok(tx_id.to_string())
    }
}

#[async_trait]
impl SubnetDeployer for WalletDeployer {
    async fn deploy(&self, spec: &SubnetSpec) -> Result<SubnetDeployment> {
        let vm_id = resolve_vm_id(spec)?;
        let vm_id = ids::Id::from_str(&vm_id).map_err(|e| Error::Config {
            message: format!("invalid vm id '{vm_id}' ({e})"),
        })?;

        let subnet_id = self
            .wallet
            .p()
            .create_subnet()
            .check_acceptance(true)
            .issue()
            .await
            .map_err(|e| tx_error(&spec.name, e))?;
        log::info!("created subnet '{subnet_id}' for '{}'", spec.name);
        sleep(Duration::from_secs(10)).await;

        let blockchain_id = self
            .wallet
            .p()
            .create_chain()
            .subnet_id(subnet_id)
            .genesis_data(spec.chain_genesis.as_bytes().to_vec())
            .vm_id(vm_id)
            .chain_name(spec.name.clone())
            .check_acceptance(true)
            .issue()
            .await
            .map_err(|e| tx_error(&spec.name, e))?;
        log::info!("created blockchain '{blockchain_id}' on subnet '{subnet_id}'");

        Ok(SubnetDeployment {
            subnet_id: subnet_id.to_string(),
            blockchain_id: blockchain_id.to_string(),
        })
    }
}

/// Builds a [`WalletDeployer`] against the network endpoint with a hot key.
pub struct WalletConnector {
    key_hex: String,
}

impl WalletConnector {
    pub fn new(key_hex: &str) -> Self {
        Self {
            key_hex: key_hex.to_string(),
        }
    }
}

#[async_trait]
impl Connector for WalletConnector {
    async fn connect(
        &self,
        network: &Network,
    ) -> Result<(Arc<dyn Deployer>, Arc<dyn SubnetDeployer>)> {
        let w = Arc::new(WalletDeployer::new(&self.key_hex, &network.endpoint).await?);
        if w.network_id != network.id {
            return Err(Error::Config {
                message: format!(
                    "endpoint {} serves network {}, cluster expects {}",
                    network.endpoint, w.network_id, network.id
                ),
            });
        }
        let deployer: Arc<dyn Deployer> = w.clone();
        let subnet_deployer: Arc<dyn SubnetDeployer> = w;
        Ok((deployer, subnet_deployer))
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- wallet::test_validate_window --exact --show-output
#[test]
fn test_validate_window() {
    use crate::validator::{primary_intent, subnet_intent, ValidateParams};

    let network = Network::devnet(1338, "http://10.0.0.1:9650");
    let params = ValidateParams::default();
    let t0 = 1_700_000_000;

    // primary issued right away, subnet issued 90s later for the same node
    let primary = primary_intent("NodeID-1", &network, 0, 2_000, &params, t0);
    let subnet = subnet_intent("NodeID-1", &network, &params, Some(&primary), t0 + 90);
    let (p_start, p_end) = validate_window(&primary, t0).unwrap();
    let (s_start, s_end) = validate_window(&subnet, t0 + 90).unwrap();
    assert_eq!((p_start, p_end), (primary.start_time, primary.end_time()));
    assert!(s_start >= p_start);
    assert!(s_end <= p_end, "subnet ends {}s after primary", s_end - p_end);

    // issued late: the start moves forward, the end does not
    let (late_start, late_end) = validate_window(&primary, t0 + 3_600).unwrap();
    assert_eq!(late_start, t0 + 3_600 + MIN_VALIDATING_START_LEAD_TIME_SECS);
    assert_eq!(late_end, p_end);
    let (_, s_late_end) = validate_window(&subnet, t0 + 3_600).unwrap();
    assert!(s_late_end <= late_end);

    let short = ValidatorIntent {
        duration: Duration::from_secs(30),
        ..primary
    };
    assert!(matches!(
        validate_window(&short, t0 + 60),
        Err(Error::Precondition { .. })
    ));
    assert!(utc(1_700_000_000).is_ok());
    assert!(utc(u64::MAX).is_err());
}
