//! Debug channel frames: outbound commands and inbound responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ExtractError, ExtractResult};

pub const RUNTIME_ENABLE: &str = "Runtime.enable";
pub const RUNTIME_EVALUATE: &str = "Runtime.evaluate";
pub const PAGE_ENABLE: &str = "Page.enable";
pub const PAGE_GET_FRAME_TREE: &str = "Page.getFrameTree";

/// An outbound command frame.
#[derive(Debug, Clone, Serialize)]
pub struct Command<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> Command<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self { id, method, params }
    }

    pub fn to_text(&self) -> ExtractResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Any inbound frame. Events carry `method` and no `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteErrorObject>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> ExtractResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_response_to(&self, id: u64) -> bool {
        self.id == Some(id)
    }

    /// Turn a correlated response into the command's result object.
    pub fn into_result(self) -> ExtractResult<Value> {
        if let Some(err) = self.error {
            return Err(ExtractError::Remote {
                code: err.code,
                message: err.message,
                data: err.data.map(|d| match d {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            });
        }

        let result = self.result.unwrap_or(Value::Object(Default::default()));
        if let Some(details) = result.get("exceptionDetails") {
            let rendered =
                serde_json::to_string_pretty(details).unwrap_or_else(|_| details.to_string());
            return Err(ExtractError::Exception(rendered));
        }
        Ok(result)
    }
}
