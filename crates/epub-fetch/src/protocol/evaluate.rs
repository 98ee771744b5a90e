//! In-page `fetch()` evaluation over the debug channel.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use super::message::{RUNTIME_ENABLE, RUNTIME_EVALUATE};
use super::session::ProtocolSession;
use super::shared::SharedSession;
use crate::config::ConnectionPolicy;
use crate::types::{ExtractError, ExtractResult, Payload};

/// Which command shape a resource is fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Text,
    Binary,
}

/// Expression resolving to `{success, content}` or `{error}`.
pub fn text_fetch_expression(url: &str) -> String {
    let literal = serde_json::to_string(url).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(async () => {{
    try {{
        const response = await fetch({literal});
        if (!response.ok) {{
            return {{ error: `Fetch failed: ${{response.status}} ${{response.statusText}}` }};
        }}
        const content = await response.text();
        return {{ success: true, content: content }};
    }} catch (e) {{
        return {{ error: e.toString() }};
    }}
}})()"#
    )
}

/// Expression resolving to `{success, base64}` or `{error}`.
pub fn binary_fetch_expression(url: &str) -> String {
    let literal = serde_json::to_string(url).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(async () => {{
    try {{
        const response = await fetch({literal});
        if (!response.ok) {{
            return {{ error: `Fetch failed: ${{response.status}} ${{response.statusText}}` }};
        }}
        const blob = await response.blob();
        const bytes = new Uint8Array(await blob.arrayBuffer());
        let binary = '';
        for (let i = 0; i < bytes.length; i += 0x8000) {{
            binary += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
        }}
        return {{ success: true, base64: btoa(binary) }};
    }} catch (e) {{
        return {{ error: e.toString() }};
    }}
}})()"#
    )
}

pub fn fetch_expression(kind: FetchKind, url: &str) -> String {
    match kind {
        FetchKind::Text => text_fetch_expression(url),
        FetchKind::Binary => binary_fetch_expression(url),
    }
}

/// `Runtime.evaluate` params: await the promise, return the value by value.
pub fn evaluate_params(expression: &str) -> Value {
    json!({
        "expression": expression,
        "awaitPromise": true,
        "returnByValue": true,
    })
}

/// Pull `result.value` out of a `Runtime.evaluate` result object.
pub fn evaluation_value(result: Value) -> ExtractResult<Value> {
    match result.get("result").and_then(|r| r.get("value")) {
        Some(value) => Ok(value.clone()),
        None => Err(ExtractError::UnexpectedResponse(format!(
            "evaluation returned no value: {result}"
        ))),
    }
}

/// Decode the record produced by one of the fetch expressions.
pub fn decode_fetch_value(kind: FetchKind, value: &Value) -> ExtractResult<Payload> {
    let success = value
        .get("success")
        .and_then(|s| s.as_bool())
        .unwrap_or(false);

    if success {
        return match kind {
            FetchKind::Text => value
                .get("content")
                .and_then(|c| c.as_str())
                .map(|c| Payload::Text(c.to_string()))
                .ok_or_else(|| {
                    ExtractError::UnexpectedResponse("success without text content".to_string())
                }),
            FetchKind::Binary => {
                let encoded = value.get("base64").and_then(|b| b.as_str()).ok_or_else(|| {
                    ExtractError::UnexpectedResponse("success without base64 content".to_string())
                })?;
                let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
                Ok(Payload::Binary(bytes))
            }
        };
    }

    match value.get("error") {
        Some(Value::String(msg)) => Err(ExtractError::PageFetch(msg.clone())),
        Some(Value::Null) | None => Err(ExtractError::UnexpectedResponse(value.to_string())),
        Some(other) => Err(ExtractError::PageFetch(other.to_string())),
    }
}

/// Something that can evaluate an expression in the document's page context.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate `expression`, awaiting its promise, and return the resulting value.
    async fn evaluate(&self, expression: &str) -> ExtractResult<Value>;

    /// Fetch one resource through the page and decode it.
    async fn fetch(&self, kind: FetchKind, url: &str) -> ExtractResult<Payload> {
        let value = self.evaluate(&fetch_expression(kind, url)).await?;
        decode_fetch_value(kind, &value)
    }
}

/// Opens a fresh connection for every evaluation: id 1 enables the runtime,
/// id 2 evaluates.
pub struct PerCallEvaluator {
    channel_url: String,
}

impl PerCallEvaluator {
    pub fn new(channel_url: impl Into<String>) -> Self {
        Self {
            channel_url: channel_url.into(),
        }
    }
}

#[async_trait]
impl Evaluator for PerCallEvaluator {
    async fn evaluate(&self, expression: &str) -> ExtractResult<Value> {
        let mut session = ProtocolSession::connect(&self.channel_url).await?;
        let result = evaluate_on(&mut session, expression).await;
        if let Err(e) = session.close().await {
            tracing::debug!("closing debug channel: {e}");
        }
        result
    }
}

async fn evaluate_on(session: &mut ProtocolSession, expression: &str) -> ExtractResult<Value> {
    session.call(RUNTIME_ENABLE, None).await?;
    let result = session
        .call(RUNTIME_EVALUATE, Some(evaluate_params(expression)))
        .await?;
    evaluation_value(result)
}

/// Evaluates over one multiplexed connection.
pub struct SharedEvaluator {
    session: SharedSession,
}

impl SharedEvaluator {
    /// Connect and enable the runtime once.
    pub async fn connect(channel_url: &str) -> ExtractResult<Self> {
        let session = SharedSession::connect(channel_url).await?;
        session.call(RUNTIME_ENABLE, None).await?;
        Ok(Self { session })
    }

    pub async fn close(self) -> ExtractResult<()> {
        self.session.close().await
    }
}

#[async_trait]
impl Evaluator for SharedEvaluator {
    async fn evaluate(&self, expression: &str) -> ExtractResult<Value> {
        let result = self
            .session
            .call(RUNTIME_EVALUATE, Some(evaluate_params(expression)))
            .await?;
        evaluation_value(result)
    }
}

/// Build the evaluator the policy asks for.
pub async fn evaluator_for(
    policy: ConnectionPolicy,
    channel_url: &str,
) -> ExtractResult<Box<dyn Evaluator>> {
    Ok(match policy {
        ConnectionPolicy::PerCall => Box::new(PerCallEvaluator::new(channel_url)),
        ConnectionPolicy::Shared => Box::new(SharedEvaluator::connect(channel_url).await?),
    })
}
