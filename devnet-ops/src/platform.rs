use avalanche_types::jsonrpc::{
    client::{info as json_client_info, p as json_client_p},
    info::GetNetworkIdResponse,
    platformvm::GetCurrentValidatorsResponse,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tokio::time::Duration;

use crate::errors::{Error, Result};

/// Info and P-chain queries against one endpoint. Goes through the
/// avalanche-types JSON-RPC client, except for "platform.getMinStake"
/// which it does not cover.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct MinStakeResult {
    #[serde(rename = "minValidatorStake")]
    min_validator_stake: String,
}

impl PlatformClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Other {
                message: format!("failed reqwest::ClientBuilder.build '{}'", e),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, method: &str, params: Value) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        log::debug!("posting {method} to {url}");

        let transport = |message: String| Error::Transport {
            host: self.endpoint.clone(),
            message,
        };
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| transport(format!("{method} failed ({e})")))?;
        let text = resp
            .text()
            .await
            .map_err(|e| transport(format!("{method} read failed ({e})")))?;

        let reply: Reply<T> = serde_json::from_str(&text).map_err(|e| Error::Decode {
            host: self.endpoint.clone(),
            message: format!("{method} returned '{text}' ({e})"),
        })?;
        if let Some(err) = reply.error {
            return Err(Error::Decode {
                host: self.endpoint.clone(),
                message: format!("{method} failed ({})", err.message),
            });
        }
        reply.result.ok_or_else(|| Error::Decode {
            host: self.endpoint.clone(),
            message: format!("{method} returned no result"),
        })
    }

    /// Minimum primary network stake in nAVAX.
    pub async fn get_min_stake(&self) -> Result<u64> {
        let r: MinStakeResult = self
            .call("/ext/bc/P", "platform.getMinStake", serde_json::json!({}))
            .await?;
        r.min_validator_stake.parse::<u64>().map_err(|e| Error::Decode {
            host: self.endpoint.clone(),
            message: format!("invalid minValidatorStake '{}' ({e})", r.min_validator_stake),
        })
    }

    fn rpc_failed(&self, method: &str, e: impl std::fmt::Display) -> Error {
        Error::Transport {
            host: self.endpoint.clone(),
            message: format!("{method} failed ({e})"),
        }
    }

    /// Node IDs of current validators, filtered to `node_ids` when given.
    /// `subnet_id` None means the primary network.
    pub async fn current_validators(
        &self,
        subnet_id: Option<&str>,
        node_ids: &[String],
    ) -> Result<Vec<String>> {
        let resp = match subnet_id {
            Some(subnet_id) => json_client_p::get_subnet_validators(&self.endpoint, subnet_id).await,
            None => json_client_p::get_primary_network_validators(&self.endpoint).await,
        }
        .map_err(|e| self.rpc_failed("platform.getCurrentValidators", e))?;
        validator_node_ids(&self.endpoint, resp, node_ids)
    }

    pub async fn get_network_id(&self) -> Result<u32> {
        let resp = json_client_info::get_network_id(&self.endpoint)
            .await
            .map_err(|e| self.rpc_failed("info.getNetworkID", e))?;
        network_id(&self.endpoint, resp)
    }
}

fn validator_node_ids(
    endpoint: &str,
    resp: GetCurrentValidatorsResponse,
    node_ids: &[String],
) -> Result<Vec<String>> {
    if let Some(err) = resp.error {
        return Err(Error::Decode {
            host: endpoint.to_string(),
            message: format!("platform.getCurrentValidators failed ({})", err.message),
        });
    }
    let validators = resp.result.and_then(|r| r.validators).unwrap_or_default();
    Ok(validators
        .iter()
        .map(|v| v.node_id.to_string())
        .filter(|id| node_ids.is_empty() || node_ids.contains(id))
        .collect())
}

fn network_id(endpoint: &str, resp: GetNetworkIdResponse) -> Result<u32> {
    if let Some(err) = resp.error {
        return Err(Error::Decode {
            host: endpoint.to_string(),
            message: format!("info.getNetworkID failed ({})", err.message),
        });
    }
    resp.result.map(|r| r.network_id).ok_or_else(|| Error::Decode {
        host: endpoint.to_string(),
        message: "info.getNetworkID returned no result".to_string(),
    })
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- platform::test_reply_shapes --exact --show-output
#[test]
fn test_reply_shapes() {
    use std::str::FromStr;

    use avalanche_types::{
        ids::node,
        jsonrpc::{
            info::GetNetworkIdResult,
            platformvm::{ApiPrimaryValidator, GetCurrentValidatorsResult},
            ResponseError,
        },
    };

    let r: Reply<MinStakeResult> = serde_json::from_str(
        r#"{"jsonrpc":"2.0","result":{"minValidatorStake":"2000000000000","minDelegatorStake":"25000000000"},"id":1}"#,
    )
    .unwrap();
    assert_eq!(r.result.unwrap().min_validator_stake, "2000000000000");

    let r: Reply<MinStakeResult> =
        serde_json::from_str(r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"boom"},"id":1}"#)
            .unwrap();
    assert!(r.result.is_none());
    assert_eq!(r.error.unwrap().message, "boom");

    let validator = |id: &str| ApiPrimaryValidator {
        node_id: node::Id::from_str(id).unwrap(),
        ..Default::default()
    };
    let resp = GetCurrentValidatorsResponse {
        result: Some(GetCurrentValidatorsResult {
            validators: Some(vec![
                validator("NodeID-7Xhw2mDxuDS44j42TCB6U5579esbSt3Lg"),
                validator("NodeID-MFrZFVCXPv5iCn6M9K6XduxGTYp891xXZ"),
            ]),
        }),
        ..Default::default()
    };
    let all = validator_node_ids("http://x", resp.clone(), &[]).unwrap();
    assert_eq!(all.len(), 2);
    let one = validator_node_ids(
        "http://x",
        resp,
        &["NodeID-MFrZFVCXPv5iCn6M9K6XduxGTYp891xXZ".to_string()],
    )
    .unwrap();
    assert_eq!(one, vec!["NodeID-MFrZFVCXPv5iCn6M9K6XduxGTYp891xXZ".to_string()]);

    let failed = GetCurrentValidatorsResponse {
        result: None,
        error: Some(ResponseError {
            code: -32000,
            message: "boom".to_string(),
            data: None,
        }),
        ..Default::default()
    };
    assert!(matches!(
        validator_node_ids("http://x", failed, &[]),
        Err(Error::Decode { .. })
    ));

    let resp = GetNetworkIdResponse {
        jsonrpc: "2.0".to_string(),
        id: 1,
        result: Some(GetNetworkIdResult { network_id: 1338 }),
        error: None,
    };
    assert_eq!(network_id("http://x", resp).unwrap(), 1338);

    let c = PlatformClient::new("http://127.0.0.1:9650/").unwrap();
    assert_eq!(c.endpoint(), "http://127.0.0.1:9650");
}
