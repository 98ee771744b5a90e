//! epub-fetch: recover the resources of a packaged document from a running
//! reader application through its remote-debugging interface.

pub mod archive;
pub mod config;
pub mod fetcher;
pub mod frames;
pub mod manifest;
pub mod monitor;
pub mod pipeline;
pub mod protocol;
pub mod readiness;
pub mod sanitize;
pub mod targets;
pub mod types;

pub use archive::{rebuild, RebuildSummary};
pub use config::{ConnectionPolicy, ExtractConfig};
pub use fetcher::{fetch_all, FetchBatch};
pub use monitor::{NoopWindowHider, WindowHider, WindowMonitor};
pub use pipeline::{extract_from_channel, Extractor};
pub use protocol::{Evaluator, FetchKind, ProtocolSession};
pub use sanitize::{sanitize, SanitizeRules};
pub use types::*;
