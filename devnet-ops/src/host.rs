use std::fmt;

use serde::{Deserialize, Serialize};

/// Default port for the node's HTTP API.
pub const API_PORT: u16 = 9650;
/// Default port for node-to-node staking traffic.
pub const STAKING_PORT: u16 = 9651;

#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Validator,
    Api,
    Monitor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Validator => write!(f, "validator"),
            Role::Api => write!(f, "api"),
            Role::Monitor => write!(f, "monitor"),
        }
    }
}

/// Cloud that owns the instance, used as the inventory alias prefix.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Cloud {
    Aws,
    Gcp,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Aws => "aws",
            Cloud::Gcp => "gcp",
        }
    }
}

/// One remote machine. Identity is the cloud instance ID.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Host {
    pub cloud_instance_id: String,
    pub ansible_alias: String,
    pub ip: String,
    pub ssh_user: String,
    pub ssh_key_path: String,
    #[serde(default)]
    pub role: Role,
    /// Node ID derived from the staking certificate, when known at provisioning time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl Host {
    pub fn new(cloud: Cloud, cloud_instance_id: &str, ip: &str, ssh_user: &str, ssh_key_path: &str) -> Self {
        Self {
            cloud_instance_id: cloud_instance_id.to_string(),
            ansible_alias: ansible_alias_for(cloud, cloud_instance_id),
            ip: ip.to_string(),
            ssh_user: ssh_user.to_string(),
            ssh_key_path: ssh_key_path.to_string(),
            role: Role::Validator,
            node_id: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_node_id(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.cloud_instance_id
    }

    #[inline]
    pub fn is_validator(&self) -> bool {
        self.role == Role::Validator
    }

    #[inline]
    pub fn is_api(&self) -> bool {
        self.role == Role::Api
    }

    pub fn api_endpoint(&self) -> String {
        format!("http://{}:{}", self.ip, API_PORT)
    }

    pub fn staking_address(&self) -> String {
        format!("{}:{}", self.ip, STAKING_PORT)
    }
}

/// Returns the inventory alias for a cloud instance (e.g., "aws_node_i-0123").
pub fn ansible_alias_for(cloud: Cloud, cloud_instance_id: &str) -> String {
    format!("{}_node_{}", cloud.as_str(), cloud_instance_id)
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- host::test_alias --exact --show-output
#[test]
fn test_alias() {
    let host = Host::new(Cloud::Aws, "i-0abc", "10.0.0.1", "ubuntu", "/tmp/key.pem");
    assert_eq!(host.ansible_alias, "aws_node_i-0abc");
    assert_eq!(host.api_endpoint(), "http://10.0.0.1:9650");
    assert_eq!(host.staking_address(), "10.0.0.1:9651");
    assert!(host.is_validator());

    let api = host.with_role(Role::Api);
    assert!(api.is_api());
    assert_eq!(api.role.to_string(), "api");
}
