use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{
    cluster::NetworkParams,
    errors::{Error, Result},
};

/// Input to one staking transaction.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ValidatorIntent {
    pub node_id: String,
    pub network_id: u32,
    /// Stake in nAVAX for the primary network, weight for subnets.
    pub weight: u64,
    /// Unix seconds.
    pub start_time: u64,
    pub duration: Duration,
    /// Parts per million.
    pub delegation_fee: u32,
}

impl ValidatorIntent {
    pub fn end_time(&self) -> u64 {
        self.start_time.saturating_add(self.duration.as_secs())
    }
}

/// Static transaction fees, in nAVAX.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy)]
pub struct FeeSchedule {
    pub primary_validator_fee: u64,
    pub subnet_validator_fee: u64,
}

impl From<&NetworkParams> for FeeSchedule {
    fn from(p: &NetworkParams) -> Self {
        Self {
            primary_validator_fee: p.add_primary_network_validator_fee,
            subnet_validator_fee: p.add_subnet_validator_fee,
        }
    }
}

impl FeeSchedule {
    /// Total fee for a batch, computed before any transaction is issued.
    pub fn required_fee(&self, primary_promotions: u64, subnet_additions: u64) -> Result<u64> {
        let overflow = || Error::Precondition {
            message: format!(
                "fee overflow for {primary_promotions} primary and {subnet_additions} subnet validator(s)"
            ),
        };
        let primary = self
            .primary_validator_fee
            .checked_mul(primary_promotions)
            .ok_or_else(overflow)?;
        let subnet = self
            .subnet_validator_fee
            .checked_mul(subnet_additions)
            .ok_or_else(overflow)?;
        primary.checked_add(subnet).ok_or_else(overflow)
    }
}

/// Issues staking transactions and answers validator-set queries.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Minimum primary network stake in nAVAX.
    async fn get_min_stake(&self) -> Result<u64>;
    /// Spendable balance of the funding key in nAVAX.
    async fn balance(&self) -> Result<u64>;
    async fn is_primary_validator(&self, node_id: &str) -> Result<bool>;
    async fn is_subnet_validator(&self, subnet_id: &str, node_id: &str) -> Result<bool>;
    /// Returns the transaction ID.
    async fn add_primary_validator(&self, intent: &ValidatorIntent) -> Result<String>;
    /// Returns the transaction ID.
    async fn add_subnet_validator(&self, subnet_id: &str, intent: &ValidatorIntent) -> Result<String>;

    /// Fails before anything is issued when the key cannot pay for the batch.
    async fn ensure_funded(&self, required: u64) -> Result<()> {
        let balance = self.balance().await?;
        if balance < required {
            return Err(Error::Precondition {
                message: format!(
                    "insufficient balance: has {balance} nAVAX, batch needs {required} nAVAX"
                ),
            });
        }
        log::info!("balance {balance} nAVAX covers required {required} nAVAX");
        Ok(())
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- staking::test_required_fee --exact --show-output
#[test]
fn test_required_fee() {
    let fees = FeeSchedule {
        primary_validator_fee: 7_000_000,
        subnet_validator_fee: 1_000_000,
    };
    assert_eq!(fees.required_fee(2, 3).unwrap(), 2 * 7_000_000 + 3 * 1_000_000);
    assert_eq!(fees.required_fee(0, 0).unwrap(), 0);
    assert!(fees.required_fee(u64::MAX, 1).is_err());

    let params = crate::cluster::NetworkParams::for_kind(crate::cluster::NetworkKind::Fuji);
    let fees = FeeSchedule::from(&params);
    assert_eq!(fees.required_fee(2, 3).unwrap(), 3 * params.add_subnet_validator_fee);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- staking::test_ensure_funded_default --exact --show-output
#[tokio::test]
async fn test_ensure_funded_default() {
    struct Fixed(u64);

    #[async_trait]
    impl Deployer for Fixed {
        async fn get_min_stake(&self) -> Result<u64> {
            Ok(1)
        }
        async fn balance(&self) -> Result<u64> {
            Ok(self.0)
        }
        async fn is_primary_validator(&self, _node_id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn is_subnet_validator(&self, _subnet_id: &str, _node_id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn add_primary_validator(&self, _intent: &ValidatorIntent) -> Result<String> {
            Ok(String::new())
        }
        async fn add_subnet_validator(&self, _subnet_id: &str, _intent: &ValidatorIntent) -> Result<String> {
            Ok(String::new())
        }
    }

    assert!(Fixed(10).ensure_funded(10).await.is_ok());
    assert!(matches!(
        Fixed(9).ensure_funded(10).await,
        Err(Error::Precondition { .. })
    ));
}
