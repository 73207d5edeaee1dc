use std::collections::BTreeMap;

use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;

use crate::errors::{Error, Result};

pub const AVALANCHEGO_COMPATIBILITY_URL: &str =
    "https://raw.githubusercontent.com/ava-labs/avalanchego/master/version/compatibility.json";
pub const SUBNET_EVM_COMPATIBILITY_URL: &str =
    "https://raw.githubusercontent.com/ava-labs/subnet-evm/master/compatibility.json";
pub const AVALANCHEGO_LATEST_RELEASE_URL: &str =
    "https://api.github.com/repos/ava-labs/avalanchego/releases/latest";
pub const SUBNET_EVM_LATEST_RELEASE_URL: &str =
    "https://api.github.com/repos/ava-labs/subnet-evm/releases/latest";

/// Release and compatibility catalog for the node client and subnet VMs.
#[async_trait]
pub trait CompatibilityOracle: Send + Sync {
    /// Client versions that speak the given VM RPC protocol version.
    async fn compatible_client_versions(&self, rpc_version: u32) -> Result<Vec<String>>;
    async fn latest_client_version(&self) -> Result<String>;
    async fn latest_vm_version(&self) -> Result<String>;
    /// RPC protocol version of a VM release.
    async fn vm_rpc_version(&self, vm_version: &str) -> Result<u32>;

    /// Newest client version that speaks the given RPC protocol version.
    async fn latest_client_version_for_rpc(&self, rpc_version: u32) -> Result<String> {
        let versions = self.compatible_client_versions(rpc_version).await?;
        versions
            .into_iter()
            .max_by(|a, b| compare_versions(a, b))
            .ok_or_else(|| Error::Other {
                message: format!("no client version supports rpc version {rpc_version}"),
            })
    }
}

/// Parses a release tag such as "v1.10.11" or "v1.11.0-rc.1".
pub fn parse_version(v: &str) -> Result<Version> {
    Version::parse(v.trim().trim_start_matches('v')).map_err(|e| Error::Other {
        message: format!("invalid version '{v}' ({e})"),
    })
}

/// Semver order of two release tags. Pre-releases sort below their final
/// release and unparsable tags sort below everything else.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    parse_version(a).ok().cmp(&parse_version(b).ok())
}

#[derive(Debug, Deserialize)]
struct SubnetEvmCompatibility {
    #[serde(rename = "rpcChainVMProtocolVersion")]
    rpc_chain_vm_protocol_version: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Reads compatibility tables and releases from GitHub.
#[derive(Debug, Clone)]
pub struct GithubOracle {
    client: reqwest::Client,
}

impl GithubOracle {
    pub fn new() -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent("devnetup")
            .build()
            .map_err(|e| Error::Other {
                message: format!("failed reqwest::ClientBuilder.build '{}'", e),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<String> {
        log::info!("fetching {url}");
        let resp = self.client.get(url).send().await.map_err(|e| Error::Other {
            message: format!("failed to fetch {url} ({e})"),
        })?;
        if !resp.status().is_success() {
            return Err(Error::Other {
                message: format!("failed to fetch {url} (status {})", resp.status()),
            });
        }
        resp.text().await.map_err(|e| Error::Other {
            message: format!("failed to read {url} ({e})"),
        })
    }

    async fn latest_release(&self, url: &str) -> Result<String> {
        let body = self.get(url).await?;
        let release: Release = serde_json::from_str(&body).map_err(|e| Error::Other {
            message: format!("invalid release JSON from {url} ({e})"),
        })?;
        Ok(release.tag_name)
    }
}

#[async_trait]
impl CompatibilityOracle for GithubOracle {
    async fn compatible_client_versions(&self, rpc_version: u32) -> Result<Vec<String>> {
        let body = self.get(AVALANCHEGO_COMPATIBILITY_URL).await?;
        let table = parse_client_compatibility(&body)?;
        Ok(table.get(&rpc_version).cloned().unwrap_or_default())
    }

    async fn latest_client_version(&self) -> Result<String> {
        self.latest_release(AVALANCHEGO_LATEST_RELEASE_URL).await
    }

    async fn latest_vm_version(&self) -> Result<String> {
        self.latest_release(SUBNET_EVM_LATEST_RELEASE_URL).await
    }

    async fn vm_rpc_version(&self, vm_version: &str) -> Result<u32> {
        let body = self.get(SUBNET_EVM_COMPATIBILITY_URL).await?;
        let table: SubnetEvmCompatibility =
            serde_json::from_str(&body).map_err(|e| Error::Other {
                message: format!("invalid subnet-evm compatibility JSON ({e})"),
            })?;
        table
            .rpc_chain_vm_protocol_version
            .get(vm_version)
            .copied()
            .ok_or_else(|| Error::Other {
                message: format!("no rpc version known for VM version {vm_version}"),
            })
    }
}

/// Parses the "rpc version" → "client versions" table.
pub fn parse_client_compatibility(body: &str) -> Result<BTreeMap<u32, Vec<String>>> {
    let raw: BTreeMap<String, Vec<String>> =
        serde_json::from_str(body).map_err(|e| Error::Other {
            message: format!("invalid compatibility JSON ({e})"),
        })?;
    let mut table = BTreeMap::new();
    for (k, v) in raw {
        let rpc = k.parse::<u32>().map_err(|e| Error::Other {
            message: format!("invalid rpc version key '{k}' ({e})"),
        })?;
        table.insert(rpc, v);
    }
    Ok(table)
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- compatibility::test_parse_client_compatibility --exact --show-output
#[test]
fn test_parse_client_compatibility() {
    let table = parse_client_compatibility(
        r#"{"28": ["v1.10.9", "v1.10.10", "v1.10.11"], "27": ["v1.10.5"]}"#,
    )
    .unwrap();
    assert_eq!(table.get(&28).unwrap().len(), 3);
    assert!(parse_client_compatibility(r#"{"x": []}"#).is_err());

    use std::cmp::Ordering;
    assert_eq!(compare_versions("v1.10.10", "v1.10.9"), Ordering::Greater);
    assert_eq!(compare_versions("v1.9.16", "v1.10.0"), Ordering::Less);
    assert_eq!(compare_versions("v1.10.0", "1.10.0"), Ordering::Equal);
    assert_eq!(compare_versions("v1.11.0-rc.1", "v1.11.0"), Ordering::Less);
    assert_eq!(compare_versions("v1.11.0-rc.1", "v1.10.19"), Ordering::Greater);
    assert_eq!(compare_versions("latest", "v0.0.1"), Ordering::Less);
    assert!(parse_version("v1.10").is_err());
}
