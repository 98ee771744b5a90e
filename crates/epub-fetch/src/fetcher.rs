//! Concurrent in-page fetch of manifest resources.

use futures::stream::{self, StreamExt};

use crate::protocol::{evaluator_for, Evaluator, FetchKind};
use crate::config::ConnectionPolicy;
use crate::types::{
    ExtractResult, FetchOutcome, FetchResult, FetchedFileTable, ManifestEntry,
};

/// Navigation document, carried over from the source archive untouched.
pub const NAV_DOCUMENT: &str = "nav.xhtml";

/// Command shape for `entry`, or `None` when it is not fetched at all.
pub fn fetch_kind(entry: &ManifestEntry) -> Option<FetchKind> {
    if basename(&entry.href) == NAV_DOCUMENT {
        return None;
    }
    let media = entry.media_type.as_str();
    if media.starts_with("application/xhtml+xml") || media.starts_with("text/css") {
        Some(FetchKind::Text)
    } else if media.starts_with("image/") {
        Some(FetchKind::Binary)
    } else {
        None
    }
}

/// Final path segment.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Join `base` and `href`, unify separators to `/` and resolve `.`/`..`.
///
/// A `scheme://authority` prefix is kept as is and never popped by `..`.
pub fn resolve_resource_path(base: &str, href: &str) -> String {
    let href = href.trim_start_matches(['/', '\\']);
    let joined = if base.is_empty() || base.ends_with('/') || base.ends_with('\\') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
    .replace('\\', "/");

    let (prefix, rest) = match joined.find("://") {
        Some(idx) => joined.split_at(idx + 3),
        None => ("", joined.as_str()),
    };

    let mut segments = rest.split('/').filter(|s| !s.is_empty() && *s != ".");
    let mut kept: Vec<&str> = Vec::new();
    let authority = if prefix.is_empty() { None } else { segments.next() };

    for segment in segments {
        if segment == ".." {
            if kept.last().is_some_and(|s| *s != "..") {
                kept.pop();
            } else if authority.is_none() {
                kept.push(segment);
            }
        } else {
            kept.push(segment);
        }
    }

    let mut out = String::from(prefix);
    if let Some(authority) = authority {
        out.push_str(authority);
        if !kept.is_empty() {
            out.push('/');
        }
    } else if rest.starts_with('/') {
        out.push('/');
    }
    out.push_str(&kept.join("/"));
    out
}

/// Outcome of a whole fetch batch.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub table: FetchedFileTable,
    pub candidates: usize,
    pub failures: usize,
    /// Basenames that were written more than once.
    pub collisions: Vec<String>,
}

/// Fetch a single entry. `None` when the entry is not a fetch candidate.
pub async fn fetch_one(
    evaluator: &dyn Evaluator,
    base_path: &str,
    entry: &ManifestEntry,
) -> Option<FetchResult> {
    let kind = fetch_kind(entry)?;
    let path = resolve_resource_path(base_path, &entry.href);
    let name = basename(&path).to_string();

    let outcome = match evaluator.fetch(kind, &path).await {
        Ok(payload) => {
            tracing::debug!(resource = %path, bytes = payload.len(), "fetched");
            FetchOutcome::Success(payload)
        }
        Err(e) => {
            tracing::warn!(resource = %path, "fetch failed, keeping archive copy: {e}");
            FetchOutcome::Failure(e.to_string())
        }
    };

    Some(FetchResult {
        basename: name,
        outcome,
    })
}

/// Fetch every candidate entry and collect successes by basename.
///
/// All fetches are driven to completion before this returns. A failed fetch
/// leaves no table entry. Results are collected in manifest order, so on a
/// basename collision the later manifest entry wins regardless of timing. `max_concurrent` caps in-flight fetches; `None`
/// runs every candidate at once.
pub async fn fetch_all(
    evaluator: &dyn Evaluator,
    base_path: &str,
    entries: &[ManifestEntry],
    max_concurrent: Option<usize>,
) -> FetchBatch {
    let candidates: Vec<&ManifestEntry> =
        entries.iter().filter(|e| fetch_kind(e).is_some()).collect();
    let limit = max_concurrent.unwrap_or(candidates.len()).max(1);

    tracing::info!(candidates = candidates.len(), limit, "fetching resources");

    let results: Vec<Option<FetchResult>> = stream::iter(candidates.iter())
        .map(|entry| fetch_one(evaluator, base_path, entry))
        .buffered(limit)
        .collect()
        .await;

    let mut batch = FetchBatch {
        candidates: candidates.len(),
        ..Default::default()
    };
    for result in results.into_iter().flatten() {
        match result.outcome {
            FetchOutcome::Success(payload) => {
                if batch.table.insert(result.basename.clone(), payload).is_some() {
                    tracing::warn!(basename = %result.basename, "two resources share a basename, last one wins");
                    batch.collisions.push(result.basename);
                }
            }
            FetchOutcome::Failure(_) => batch.failures += 1,
        }
    }

    tracing::info!(
        fetched = batch.table.len(),
        failed = batch.failures,
        "fetch phase finished"
    );
    batch
}

/// Fetch through the channel at `channel_url` using the given connection policy.
pub async fn fetch_all_from_channel(
    channel_url: &str,
    policy: ConnectionPolicy,
    base_path: &str,
    entries: &[ManifestEntry],
    max_concurrent: Option<usize>,
) -> ExtractResult<FetchBatch> {
    let evaluator = evaluator_for(policy, channel_url).await?;
    Ok(fetch_all(evaluator.as_ref(), base_path, entries, max_concurrent).await)
}
