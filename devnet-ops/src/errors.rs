use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Backing errors for all fleet operations.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The host could not be reached or the remote call failed.
    #[error("host '{host}' unreachable ({message})")]
    Transport { host: String, message: String },
    /// The host answered but the reply could not be understood.
    #[error("unexpected response from host '{host}' ({message})")]
    Decode { host: String, message: String },
    /// State was determined and it is not the target state.
    #[error("{message}")]
    NotReady { message: String, hosts: Vec<String> },
    #[error("{message}")]
    Precondition { message: String },
    /// Verbatim error from the transaction deployer.
    #[error("transaction failed for '{host}' ({message})")]
    Transaction { host: String, message: String },
    /// Aggregate over every failed host and its cause.
    #[error("{message}: {}", format_host_errors(.failed))]
    Batch {
        message: String,
        failed: BTreeMap<String, String>,
    },
    #[error("{message} (still failing: {})", .hosts.join(", "))]
    Timeout { message: String, hosts: Vec<String> },
    /// The operator interrupted a multi-phase run between phases.
    #[error("{message}")]
    Interrupted { message: String },
    #[error("invalid config ({message})")]
    Config { message: String },
    #[error("failed for other reasons ({message})")]
    Other { message: String },
}

impl Error {
    /// Returns the error message in "String".
    #[inline]
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Error::Transport { message, .. }
            | Error::Decode { message, .. }
            | Error::NotReady { message, .. }
            | Error::Precondition { message }
            | Error::Transaction { message, .. }
            | Error::Batch { message, .. }
            | Error::Timeout { message, .. }
            | Error::Interrupted { message }
            | Error::Config { message }
            | Error::Other { message } => message.clone(),
        }
    }

    /// Returns the host IDs this error is about, sorted.
    #[must_use]
    pub fn failed_hosts(&self) -> Vec<String> {
        match self {
            Error::Transport { host, .. }
            | Error::Decode { host, .. }
            | Error::Transaction { host, .. } => vec![host.clone()],
            Error::NotReady { hosts, .. } | Error::Timeout { hosts, .. } => {
                let mut hosts = hosts.clone();
                hosts.sort();
                hosts
            }
            Error::Batch { failed, .. } => failed.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if the state was determined but is not ready yet.
    /// Callers stop gracefully on these instead of aborting.
    #[inline]
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::NotReady { .. } | Error::Timeout { .. })
    }
}

/// Formats "host (cause)" pairs in host order.
pub fn format_host_errors(failed: &BTreeMap<String, String>) -> String {
    failed
        .iter()
        .map(|(host, cause)| format!("{host} ({cause})"))
        .collect::<Vec<String>>()
        .join(", ")
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Other {
            message: e.to_string(),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Config { .. } | Error::Precondition { .. } => ErrorKind::InvalidInput,
            Error::Timeout { .. } => ErrorKind::TimedOut,
            Error::Interrupted { .. } => ErrorKind::Interrupted,
            _ => ErrorKind::Other,
        };
        io::Error::new(kind, e.to_string())
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- errors::test_batch_display --exact --show-output
#[test]
fn test_batch_display() {
    let mut failed = BTreeMap::new();
    failed.insert("i-b".to_string(), "connection refused".to_string());
    failed.insert("i-a".to_string(), "timed out".to_string());
    let e = Error::Batch {
        message: "failed to get health status for node(s)".to_string(),
        failed,
    };
    assert_eq!(
        e.to_string(),
        "failed to get health status for node(s): i-a (timed out), i-b (connection refused)"
    );
    assert_eq!(e.failed_hosts(), vec!["i-a".to_string(), "i-b".to_string()]);
    assert!(!e.is_not_ready());

    let io_err: io::Error = Error::Timeout {
        message: "nodes are not healthy".to_string(),
        hosts: vec!["i-c".to_string()],
    }
    .into();
    assert_eq!(io_err.kind(), ErrorKind::TimedOut);
    assert!(io_err.to_string().contains("i-c"));
}
