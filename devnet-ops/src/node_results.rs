use std::{
    collections::{BTreeMap, HashSet},
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    errors::{Error, Result},
    host::Host,
};

/// Outcome of one per-host operation.
#[derive(Debug, Clone)]
pub struct NodeResult<T> {
    pub host_id: String,
    pub value: Option<T>,
    pub err: Option<Error>,
}

/// Collects per-host outcomes from parallel tasks.
/// Only read after every producer has finished.
#[derive(Debug)]
pub struct NodeResults<T> {
    results: Mutex<BTreeMap<String, NodeResult<T>>>,
}

impl<T> Default for NodeResults<T> {
    fn default() -> Self {
        Self {
            results: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone> NodeResults<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, NodeResult<T>>> {
        // a panicking producer cannot leave a half-written entry behind
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_result(&self, host_id: &str, result: Result<T>) {
        let entry = match result {
            Ok(v) => NodeResult {
                host_id: host_id.to_string(),
                value: Some(v),
                err: None,
            },
            Err(e) => NodeResult {
                host_id: host_id.to_string(),
                value: None,
                err: Some(e),
            },
        };
        self.lock().insert(host_id.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.lock().values().any(|r| r.err.is_some())
    }

    pub fn errored_hosts(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter(|r| r.err.is_some())
            .map(|r| r.host_id.clone())
            .collect()
    }

    pub fn error_host_map(&self) -> BTreeMap<String, Error> {
        self.lock()
            .values()
            .filter_map(|r| r.err.clone().map(|e| (r.host_id.clone(), e)))
            .collect()
    }

    /// Values of the hosts that succeeded.
    pub fn result_map(&self) -> BTreeMap<String, T> {
        self.lock()
            .values()
            .filter_map(|r| r.value.clone().map(|v| (r.host_id.clone(), v)))
            .collect()
    }

    pub fn node_list(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn get(&self, host_id: &str) -> Option<NodeResult<T>> {
        self.lock().get(host_id).cloned()
    }

    /// Returns the success values, or a batch error enumerating every
    /// failed host and its cause.
    pub fn into_result(self, message: &str) -> Result<BTreeMap<String, T>> {
        if self.has_errors() {
            let failed = self
                .error_host_map()
                .into_iter()
                .map(|(host, e)| (host, e.to_string()))
                .collect();
            return Err(Error::Batch {
                message: message.to_string(),
                failed,
            });
        }
        Ok(self.result_map())
    }
}

/// Runs `op` once per host concurrently and waits for every task.
/// Exactly one result per distinct host ID is recorded; a failing or
/// panicking host never affects the others.
pub async fn fan_out<T, F, Fut>(hosts: &[Host], op: F) -> NodeResults<T>
where
    T: Clone + Send + 'static,
    F: Fn(Host) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let results = Arc::new(NodeResults::new());

    let mut seen = HashSet::new();
    let mut handles = Vec::with_capacity(hosts.len());
    for host in hosts.iter() {
        if !seen.insert(host.id().to_string()) {
            log::warn!("skipping duplicate host '{}'", host.id());
            continue;
        }

        let host_id = host.id().to_string();
        let fut = op(host.clone());
        let results = Arc::clone(&results);
        let handle = tokio::spawn({
            let host_id = host_id.clone();
            async move {
                let ret = fut.await;
                results.add_result(&host_id, ret);
            }
        });
        handles.push((host_id, handle));
    }

    log::debug!("waiting for {} host task(s)", handles.len());
    for (host_id, handle) in handles {
        if let Err(e) = handle.await {
            log::warn!("task for host '{host_id}' failed to join ({e})");
            results.add_result(
                &host_id,
                Err(Error::Other {
                    message: format!("task failed to join ({e})"),
                }),
            );
        }
    }

    match Arc::try_unwrap(results) {
        Ok(r) => r,
        Err(shared) => {
            // every task has completed so this is unreachable in practice
            let copy = NodeResults::new();
            for host_id in shared.node_list() {
                if let Some(r) = shared.get(&host_id) {
                    match (r.value, r.err) {
                        (Some(v), _) => copy.add_result(&host_id, Ok(v)),
                        (None, Some(e)) => copy.add_result(&host_id, Err(e)),
                        (None, None) => {}
                    }
                }
            }
            copy
        }
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- node_results::test_fan_out_one_result_per_host --exact --show-output
#[tokio::test]
async fn test_fan_out_one_result_per_host() {
    use crate::host::Cloud;
    use tokio::time::{sleep, Duration};

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut hosts = Vec::new();
    for i in 0..20 {
        hosts.push(Host::new(
            Cloud::Aws,
            &format!("i-{i}"),
            &format!("10.0.0.{i}"),
            "ubuntu",
            "/tmp/k.pem",
        ));
    }
    // duplicate identity is collapsed
    hosts.push(hosts[0].clone());

    let results = fan_out(&hosts, |host| async move {
        let n: u64 = host.id().trim_start_matches("i-").parse().unwrap();
        sleep(Duration::from_millis((20 - n) * 3)).await;
        if n % 3 == 0 {
            return Err(Error::Transport {
                host: host.id().to_string(),
                message: "connection refused".to_string(),
            });
        }
        if n == 7 {
            panic!("host task panicked");
        }
        Ok(n)
    })
    .await;

    assert_eq!(results.len(), 20);
    assert_eq!(results.node_list().len(), 20);
    assert!(results.has_errors());

    let errored = results.errored_hosts();
    let expected_errors: Vec<String> = (0..20)
        .filter(|n| n % 3 == 0 || *n == 7)
        .map(|n| format!("i-{n}"))
        .collect::<std::collections::BTreeSet<String>>()
        .into_iter()
        .collect();
    assert_eq!(errored, expected_errors);

    let ok = results.result_map();
    assert_eq!(ok.len() + errored.len(), 20);
    assert_eq!(ok.get("i-4"), Some(&4));

    let err = results.into_result("failed to ping node(s)").unwrap_err();
    assert_eq!(err.failed_hosts(), expected_errors);
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- node_results::test_fan_out_empty --exact --show-output
#[tokio::test]
async fn test_fan_out_empty() {
    let results = fan_out(&[], |_host| async move { Ok(()) }).await;
    assert!(results.is_empty());
    assert!(!results.has_errors());
    assert!(results.into_result("noop").unwrap().is_empty());
}
