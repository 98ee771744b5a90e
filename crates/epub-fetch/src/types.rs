//! Core data types shared across the extraction pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A debuggable target as listed by the discovery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTarget {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub channel_url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl DebugTarget {
    /// Whether this target hangs off another one (a page rather than the shell).
    pub fn is_child(&self) -> bool {
        self.parent_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// One `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub media_type: String,
    pub href: String,
}

impl ManifestEntry {
    pub fn new(media_type: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            href: href.into(),
        }
    }
}

/// The package document location plus its manifest, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Path of the package document inside the archive (e.g. `EPUB/package.opf`).
    pub opf_path: String,
    pub entries: Vec<ManifestEntry>,
}

impl Package {
    /// Directory of the package document, with a trailing `/` unless it sits at the root.
    pub fn opf_dir(&self) -> String {
        match self.opf_path.rfind('/') {
            Some(idx) => self.opf_path[..=idx].to_string(),
            None => String::new(),
        }
    }
}

/// Fetched resource body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Result of a single resource fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Final path segment of the resolved resource path.
    pub basename: String,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Payload),
    Failure(String),
}

/// Fetched payloads keyed by basename. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct FetchedFileTable {
    files: HashMap<String, Payload>,
}

impl FetchedFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a payload, returning the one it displaced.
    pub fn insert(&mut self, basename: impl Into<String>, payload: Payload) -> Option<Payload> {
        self.files.insert(basename.into(), payload)
    }

    pub fn get(&self, basename: &str) -> Option<&Payload> {
        self.files.get(basename)
    }

    pub fn get_mut(&mut self, basename: &str) -> Option<&mut Payload> {
        self.files.get_mut(basename)
    }

    pub fn contains(&self, basename: &str) -> bool {
        self.files.contains_key(basename)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Payload)> {
        self.files.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Payload)> {
        self.files.iter_mut()
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub manifest_entries: usize,
    pub candidates: usize,
    pub fetched: usize,
    pub failed: usize,
    pub sanitized: usize,
    pub entries_written: usize,
    pub entries_overridden: usize,
    pub entries_dropped: usize,
}

/// Errors that can occur while extracting a packaged document.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Failed to launch host application: {0}")]
    Launch(String),

    #[error("Debugger not ready after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    #[error("No debug targets available")]
    NoTargets,

    #[error("No target exposes a debugger channel URL")]
    NoChannelUrl,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("Remote exception: {0}")]
    Exception(String),

    #[error("Fetch failed in page context: {0}")]
    PageFetch(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No frame URL contains marker {0:?}")]
    NoMatchingFrame(String),

    #[error("Archive entry missing: {0}")]
    MissingEntry(String),

    #[error("No rootfile found in container descriptor")]
    MissingRootfile,

    #[error("No manifest found in package document {0}")]
    MissingManifest(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Markup error: {0}")]
    Markup(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ExtractError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ExtractError::Transport(e.to_string())
    }
}

impl From<quick_xml::Error> for ExtractError {
    fn from(e: quick_xml::Error) -> Self {
        ExtractError::Xml(e.to_string())
    }
}

/// Convenience result type.
pub type ExtractResult<T> = Result<T, ExtractError>;
