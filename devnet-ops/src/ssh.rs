use std::process::Stdio;

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde_json::Value;
use tokio::{
    io::AsyncWriteExt,
    process::Command,
    time::{timeout, Duration},
};

use crate::{
    errors::{Error, Result},
    host::{Host, API_PORT},
    remote::{RemoteCommand, RemoteExecutor},
};

#[derive(RustEmbed)]
#[folder = "src/scripts/"]
struct Scripts;

/// Loads an embedded script and fills in its "__KEY__" placeholders.
pub fn render_script(name: &str, vars: &[(&str, &str)]) -> Result<String> {
    let f = Scripts::get(name).ok_or_else(|| Error::Other {
        message: format!("script '{name}' is not embedded"),
    })?;
    let mut s = std::str::from_utf8(f.data.as_ref())
        .map_err(|e| Error::Other {
            message: format!("failed to convert embed file to str {}", e),
        })?
        .to_string();
    for (k, v) in vars {
        s = s.replace(&format!("__{k}__"), v);
    }
    Ok(s)
}

/// Builds the shell script that runs a command on the host.
pub fn script_for(cmd: &RemoteCommand) -> Result<String> {
    if let Some(call) = cmd.json_rpc() {
        return Ok(format!(
            "curl -s -X POST --data '{}' -H 'content-type:application/json;' http://127.0.0.1:{}{}\n",
            call.body, API_PORT, call.path
        ));
    }

    match cmd {
        RemoteCommand::TrackSubnet {
            subnet_id,
            vm_id,
            subnet_name,
        } => render_script(
            "track_subnet.sh",
            &[
                ("SUBNET_ID", subnet_id),
                ("VM_ID", vm_id),
                ("SUBNET_NAME", subnet_name),
            ],
        ),
        RemoteCommand::SetupNode {
            genesis,
            node_config,
        } => render_script(
            "setup_node.sh",
            &[("GENESIS", genesis), ("NODE_CONFIG", node_config)],
        ),
        RemoteCommand::UpgradeAvalancheGo { version } => {
            render_script("upgrade_avalanchego.sh", &[("VERSION", version)])
        }
        RemoteCommand::UpgradeVm { vm_id, version } => render_script(
            "upgrade_vm.sh",
            &[("VM_ID", vm_id), ("VERSION", version)],
        ),
        other => Err(Error::Other {
            message: format!("no script for '{}'", other.name()),
        }),
    }
}

/// Runs commands over "ssh", feeding the script through stdin.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SshExecutor {
    fn command(&self, host: &Host) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()))
            .arg("-i")
            .arg(&host.ssh_key_path)
            .arg(format!("{}@{}", host.ssh_user, host.ip))
            .arg("bash -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_script(&self, host: &Host, script: &str) -> Result<String> {
        let transport = |message: String| Error::Transport {
            host: host.id().to_string(),
            message,
        };

        let mut child = self
            .command(host)
            .spawn()
            .map_err(|e| transport(format!("failed to spawn ssh ({e})")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(|e| transport(format!("failed to write script ({e})")))?;
        }

        let output = timeout(self.request_timeout, child.wait_with_output())
            .await
            .map_err(|_| transport(format!("timed out after {:?}", self.request_timeout)))?
            .map_err(|e| transport(format!("ssh failed ({e})")))?;
        if !output.status.success() {
            return Err(transport(format!(
                "exit status {} ({})",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &Host, cmd: &RemoteCommand) -> Result<Value> {
        log::debug!("running '{}' on {} ({})", cmd.name(), host.id(), host.ip);
        let script = script_for(cmd)?;
        let out = self.run_script(host, &script).await?;

        if cmd.json_rpc().is_some() {
            let trimmed = out.trim();
            if trimmed.is_empty() {
                // curl prints nothing when the node API is down
                return Err(Error::Transport {
                    host: host.id().to_string(),
                    message: "node API returned no response".to_string(),
                });
            }
            return serde_json::from_str(trimmed).map_err(|e| Error::Decode {
                host: host.id().to_string(),
                message: format!("invalid JSON '{trimmed}' ({e})"),
            });
        }
        Ok(serde_json::json!({ "result": { "output": out } }))
    }
}

/// RUST_LOG=debug cargo test --package devnet-ops --lib -- ssh::test_scripts --exact --show-output
#[test]
fn test_scripts() {
    let s = script_for(&RemoteCommand::CheckBootstrapped).unwrap();
    assert!(s.contains("info.isBootstrapped"));
    assert!(s.contains("http://127.0.0.1:9650/ext/info"));

    let s = script_for(&RemoteCommand::TrackSubnet {
        subnet_id: "2b175hLJhGdj3CzgXENso9CmwMgejaCQXhMFzBsm8hXbH2MF7H".to_string(),
        vm_id: "srEXiWaHuhNyGwPUi444Tu47ZEDwxTWrbQiuD7FmgSAQ6X7Dy".to_string(),
        subnet_name: "mysubnet".to_string(),
    })
    .unwrap();
    assert!(s.contains("SUBNET_ID=2b175hLJhGdj3CzgXENso9CmwMgejaCQXhMFzBsm8hXbH2MF7H"));
    assert!(s.contains("tracking mysubnet"));
    assert!(!s.contains("__"));

    let s = script_for(&RemoteCommand::UpgradeVm {
        vm_id: "srEX".to_string(),
        version: "v0.5.6".to_string(),
    })
    .unwrap();
    assert!(s.contains("VERSION=v0.5.6"));
    assert!(s.contains("VM_ID=srEX"));
}
