//! Extraction settings and environment overrides.

use std::time::Duration;

/// Default remote-debugging port handed to the host application.
pub const DEFAULT_DEBUG_PORT: u16 = 9223;

/// Target count the host reports once its startup sequence has settled.
pub const DEFAULT_EXPECTED_TARGETS: usize = 3;

/// Scheme the host uses to serve resolved (decrypted) document resources.
pub const DEFAULT_FRAME_MARKER: &str = "httpsr2://";

/// How fetch calls reach the debugging channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPolicy {
    /// Open, use and close a fresh connection for every call.
    #[default]
    PerCall,
    /// One connection, calls multiplexed by message id.
    Shared,
}

impl ConnectionPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-call" | "per_call" | "percall" => Some(Self::PerCall),
            "shared" | "pooled" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Everything the pipeline needs to know besides the input and output paths.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub debug_port: u16,
    /// Readiness polls before giving up.
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// Timeout of a single discovery request.
    pub poll_timeout: Duration,
    pub expected_targets: usize,
    pub frame_marker: String,
    /// `href` substrings marking host-injected stylesheets.
    pub stylesheet_markers: Vec<String>,
    /// Root attributes whose name contains this (case-insensitive) are removed.
    pub attribute_marker: String,
    pub monitor_interval: Duration,
    /// `None` means one in-flight fetch per candidate.
    pub max_concurrent_fetches: Option<usize>,
    pub connection_policy: ConnectionPolicy,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            debug_port: DEFAULT_DEBUG_PORT,
            max_attempts: 30,
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(5),
            expected_targets: DEFAULT_EXPECTED_TARGETS,
            frame_marker: DEFAULT_FRAME_MARKER.to_string(),
            stylesheet_markers: vec!["thorium".to_string(), "readium".to_string()],
            attribute_marker: "readium".to_string(),
            monitor_interval: Duration::from_millis(200),
            max_concurrent_fetches: None,
            connection_policy: ConnectionPolicy::PerCall,
        }
    }
}

impl ExtractConfig {
    /// Defaults overlaid with `EPUB_FETCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Unparseable values are ignored.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("EPUB_FETCH_PORT").and_then(|v| v.trim().parse().ok()) {
            self.debug_port = port;
        }
        if let Some(n) = lookup("EPUB_FETCH_MAX_ATTEMPTS").and_then(|v| v.trim().parse().ok()) {
            self.max_attempts = n;
        }
        if let Some(ms) = lookup("EPUB_FETCH_POLL_INTERVAL_MS").and_then(|v| v.trim().parse().ok())
        {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = lookup("EPUB_FETCH_EXPECTED_TARGETS").and_then(|v| v.trim().parse().ok()) {
            self.expected_targets = n;
        }
        if let Some(n) = lookup("EPUB_FETCH_CONCURRENCY").and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.max_concurrent_fetches = (n > 0).then_some(n);
        }
        if let Some(policy) =
            lookup("EPUB_FETCH_CONNECTION").and_then(|v| ConnectionPolicy::from_str(&v))
        {
            self.connection_policy = policy;
        }
        self
    }

    /// Base URL of the HTTP discovery endpoint.
    pub fn discovery_url(&self) -> String {
        format!("http://localhost:{}", self.debug_port)
    }
}
