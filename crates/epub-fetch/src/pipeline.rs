//! End-to-end extraction: launch the host, attach to its debugger, fetch the
//! manifest resources through the live page and rebuild the archive.

use std::path::Path;
use std::sync::Arc;

use crate::archive;
use crate::config::ExtractConfig;
use crate::fetcher::fetch_all_from_channel;
use crate::frames;
use crate::manifest;
use crate::monitor::{NoopWindowHider, WindowHider, WindowMonitor};
use crate::protocol::ProtocolSession;
use crate::readiness::{self, HostProcess, ReadinessPolicy};
use crate::sanitize::{self, SanitizeRules};
use crate::targets;
use crate::types::{DebugTarget, ExtractError, ExtractReport, ExtractResult, FetchedFileTable, Payload};

/// Drives one extraction run.
pub struct Extractor {
    config: ExtractConfig,
    hider: Arc<dyn WindowHider>,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self {
            config,
            hider: Arc::new(NoopWindowHider),
        }
    }

    /// Use `hider` to keep the host's windows hidden during startup.
    pub fn with_window_hider(mut self, hider: Arc<dyn WindowHider>) -> Self {
        self.hider = hider;
        self
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Launch `executable` on `input` and write the rebuilt archive to `output`.
    ///
    /// The host process is terminated before this returns, whatever the outcome.
    pub async fn run(
        &self,
        executable: &Path,
        input: &Path,
        output: &Path,
    ) -> ExtractResult<ExtractReport> {
        let mut host = readiness::launch(executable, input, self.config.debug_port)?;

        let result = self.drive(&host, input, output).await;

        if let Err(e) = host.terminate().await {
            tracing::warn!("failed to terminate host application: {e}");
        }
        result
    }

    async fn drive(
        &self,
        host: &HostProcess,
        input: &Path,
        output: &Path,
    ) -> ExtractResult<ExtractReport> {
        let targets = self.wait_for_debugger(host).await?;
        let channel_url = targets::select(&targets)?;
        tracing::info!(channel = %channel_url, "attaching to debug target");
        extract_from_channel(&channel_url, input, output, &self.config).await
    }

    async fn wait_for_debugger(&self, host: &HostProcess) -> ExtractResult<Vec<DebugTarget>> {
        let monitor = host
            .pid()
            .map(|pid| WindowMonitor::spawn(self.hider.clone(), pid, self.config.monitor_interval));

        let policy = ReadinessPolicy::from(&self.config);
        let ready = readiness::await_ready(&self.config.discovery_url(), &policy).await;

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        ready
    }
}

/// Run the attached phase against an already running debug target.
pub async fn extract_from_channel(
    channel_url: &str,
    input: &Path,
    output: &Path,
    config: &ExtractConfig,
) -> ExtractResult<ExtractReport> {
    let frame_base = resolve_frame_base(channel_url, &config.frame_marker).await?;
    tracing::info!(base = %frame_base, "resolved base resource path");

    let package = manifest::read(input)?;
    let fetch_base = format!("{frame_base}{}", package.opf_dir());

    let mut batch = fetch_all_from_channel(
        channel_url,
        config.connection_policy,
        &fetch_base,
        &package.entries,
        config.max_concurrent_fetches,
    )
    .await?;

    let sanitized = sanitize_table(&mut batch.table, &SanitizeRules::from(config));
    let summary = archive::rebuild(input, &batch.table, output)?;

    Ok(ExtractReport {
        manifest_entries: package.entries.len(),
        candidates: batch.candidates,
        fetched: batch.table.len(),
        failed: batch.failures,
        sanitized,
        entries_written: summary.written,
        entries_overridden: summary.overridden,
        entries_dropped: summary.dropped,
    })
}

async fn resolve_frame_base(channel_url: &str, marker: &str) -> ExtractResult<String> {
    let mut session = ProtocolSession::connect(channel_url).await?;
    let resolved = frames::resolve(&mut session, marker).await;
    if let Err(e) = session.close().await {
        tracing::debug!("closing frame session: {e}");
    }
    resolved?.ok_or_else(|| ExtractError::NoMatchingFrame(marker.to_string()))
}

/// Sanitize every fetched markup document in place. Returns how many were rewritten.
///
/// A document the sanitizer cannot parse is kept as fetched.
pub fn sanitize_table(table: &mut FetchedFileTable, rules: &SanitizeRules) -> usize {
    let mut sanitized = 0;
    for (name, payload) in table.iter_mut() {
        if !sanitize::is_markup(name) {
            continue;
        }
        let Payload::Text(markup) = payload else {
            continue;
        };
        match sanitize::sanitize(markup, rules) {
            Ok(clean) => {
                *markup = clean;
                sanitized += 1;
            }
            Err(e) => tracing::warn!(document = %name, "keeping unsanitized markup: {e}"),
        }
    }
    sanitized
}
