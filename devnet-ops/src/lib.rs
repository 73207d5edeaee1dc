//! Devnet fleet orchestration: parallel host checks, subnet tracking and
//! validator registration over an externally enumerated host list.

pub mod checks;
pub mod cluster;
pub mod compatibility;
pub mod errors;
pub mod genesis;
pub mod host;
pub mod node_results;
pub mod platform;
pub mod poll;
pub mod provision;
pub mod remote;
pub mod ssh;
pub mod staking;
pub mod status;
pub mod subnet;
pub mod sync;
pub mod upgrade;
pub mod validator;
pub mod wallet;
pub mod wiz;

#[cfg(test)]
mod testutil;
