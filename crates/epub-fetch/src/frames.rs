//! Derive the base resource path from the live frame tree.

use serde::Deserialize;

use crate::protocol::message::{PAGE_ENABLE, PAGE_GET_FRAME_TREE};
use crate::protocol::ProtocolSession;
use crate::types::{ExtractError, ExtractResult};

/// Number of `/`-separated segments kept from the matching frame URL.
const BASE_SEGMENTS: usize = 6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A frame and its children, as returned by `Page.getFrameTree`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameNode {
    #[serde(default)]
    pub frame: Option<Frame>,
    #[serde(default)]
    pub child_frames: Vec<FrameNode>,
}

/// URLs of every frame containing `marker`, parent before children,
/// children in listed order.
pub fn matching_frame_urls(root: &FrameNode, marker: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if let Some(url) = node.frame.as_ref().and_then(|f| f.url.as_deref()) {
            if url.contains(marker) {
                found.push(url.to_string());
            }
        }
        // Reversed so the first child is popped next.
        stack.extend(node.child_frames.iter().rev());
    }

    found
}

/// Keep the first six `/` segments of `url` and append a trailing `/`.
pub fn base_path_from_url(url: &str) -> String {
    let segments: Vec<&str> = url.split('/').take(BASE_SEGMENTS).collect();
    format!("{}/", segments.join("/"))
}

/// The first URL that starts with `marker`, else the first that merely
/// contains it.
pub fn pick_base_url<'a>(urls: &'a [String], marker: &str) -> Option<&'a str> {
    urls.iter()
        .find(|url| url.starts_with(marker))
        .or_else(|| urls.first())
        .map(String::as_str)
}

/// Base path of the matching frame chosen by [`pick_base_url`].
pub fn base_path_from_tree(root: &FrameNode, marker: &str) -> Option<String> {
    let urls = matching_frame_urls(root, marker);
    pick_base_url(&urls, marker).map(base_path_from_url)
}

/// Ask the target for its frame tree and derive the base path.
///
/// Returns `Ok(None)` when no frame carries the marker.
pub async fn resolve(session: &mut ProtocolSession, marker: &str) -> ExtractResult<Option<String>> {
    session.call(PAGE_ENABLE, None).await?;
    let result = session.call(PAGE_GET_FRAME_TREE, None).await?;

    let tree = result.get("frameTree").cloned().ok_or_else(|| {
        ExtractError::UnexpectedResponse("Page.getFrameTree returned no frameTree".to_string())
    })?;
    let root: FrameNode = serde_json::from_value(tree)?;

    let urls = matching_frame_urls(&root, marker);
    tracing::debug!(matches = urls.len(), "frame tree walked");
    Ok(pick_base_url(&urls, marker).map(base_path_from_url))
}
