//! Pick the debug target that renders the document.

use crate::types::{DebugTarget, ExtractError, ExtractResult};

/// Channel URL of the rendered document.
///
/// Prefers the first child target (non-empty `parentId`), which is the
/// document page rather than the application shell. Falls back to the first
/// target in the list, also when the child exposes no channel URL.
pub fn select(targets: &[DebugTarget]) -> ExtractResult<String> {
    let first = targets.first().ok_or(ExtractError::NoTargets)?;
    let child = targets.iter().find(|t| t.is_child());

    let chosen = child
        .filter(|t| channel_url(t).is_some())
        .unwrap_or(first);
    tracing::debug!(id = %chosen.id, kind = %chosen.kind, "selected debug target");

    channel_url(chosen)
        .map(str::to_string)
        .ok_or(ExtractError::NoChannelUrl)
}

fn channel_url(target: &DebugTarget) -> Option<&str> {
    target.channel_url.as_deref().filter(|url| !url.is_empty())
}
