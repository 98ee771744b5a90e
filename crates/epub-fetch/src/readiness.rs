//! Host process launch and debugger readiness polling.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::config::ExtractConfig;
use crate::types::{DebugTarget, ExtractError, ExtractResult};

/// The running host application. Killed on drop if still alive.
pub struct HostProcess {
    child: Child,
}

impl HostProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process has already exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Terminate the process and reap it. A no-op if it already exited.
    pub async fn terminate(&mut self) -> ExtractResult<()> {
        if self.has_exited() {
            return Ok(());
        }
        self.child.start_kill()?;
        let status = self.child.wait().await?;
        tracing::debug!(?status, "host application terminated");
        Ok(())
    }
}

/// Command line flags that open the debug port to local clients.
pub fn debug_args(target_file: &Path, debug_port: u16) -> Vec<String> {
    vec![
        target_file.display().to_string(),
        format!("--remote-debugging-port={debug_port}"),
        "--remote-allow-origins=*".to_string(),
    ]
}

/// Launch the host application on `target_file` with its debug port enabled.
pub fn launch(executable: &Path, target_file: &Path, debug_port: u16) -> ExtractResult<HostProcess> {
    let child = Command::new(executable)
        .args(debug_args(target_file, debug_port))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExtractError::Launch(format!("{}: {e}", executable.display())))?;

    tracing::info!(pid = ?child.id(), port = debug_port, "host application launched");
    Ok(HostProcess { child })
}

/// How long and how often to poll the discovery endpoint.
#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// The target list is considered settled at exactly this many entries.
    pub expected_targets: usize,
}

impl From<&ExtractConfig> for ReadinessPolicy {
    fn from(cfg: &ExtractConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            poll_interval: cfg.poll_interval,
            poll_timeout: cfg.poll_timeout,
            expected_targets: cfg.expected_targets,
        }
    }
}

/// Fetch the target list once from `{discovery_url}/json`.
pub async fn discover_targets(
    client: &reqwest::Client,
    discovery_url: &str,
) -> ExtractResult<Vec<DebugTarget>> {
    let url = format!("{}/json", discovery_url.trim_end_matches('/'));
    let resp = client.get(&url).send().await?.error_for_status()?;
    Ok(resp.json::<Vec<DebugTarget>>().await?)
}

/// Poll the discovery endpoint until the target list has the expected size.
///
/// Connection errors, timeouts, bad statuses and lists of the wrong size all
/// count as "still starting". Running out of attempts is fatal.
pub async fn await_ready(
    discovery_url: &str,
    policy: &ReadinessPolicy,
) -> ExtractResult<Vec<DebugTarget>> {
    let client = reqwest::Client::builder()
        .timeout(policy.poll_timeout)
        .build()?;

    for attempt in 1..=policy.max_attempts {
        match discover_targets(&client, discovery_url).await {
            Ok(targets) if targets.len() == policy.expected_targets => {
                tracing::info!(attempt, targets = targets.len(), "debugger ready");
                return Ok(targets);
            }
            Ok(targets) => {
                tracing::info!(
                    attempt,
                    found = targets.len(),
                    expected = policy.expected_targets,
                    "waiting for debugger to be ready"
                );
            }
            Err(e) => {
                tracing::debug!(attempt, "discovery poll failed: {e}");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.poll_interval).await;
        }
    }

    Err(ExtractError::ReadinessTimeout {
        attempts: policy.max_attempts,
    })
}
