//! JSON messages exchanged with the execution host.
//!
//! Requests and responses are tagged by a `type` field. The cell identifier is
//! opaque and echoed back unchanged.

use serde::{Deserialize, Serialize};

use crate::{context::Context, output::Output};

pub type CellId = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Execute(ExecuteRequest),
    /// Any other message type; the host ignores it.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(rename = "cellId", default)]
    pub cell_id: CellId,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub context: Context,
}

impl ExecuteRequest {
    pub fn new(cell_id: impl Into<CellId>, code: impl Into<String>) -> Self {
        Self {
            cell_id: cell_id.into(),
            code: code.into(),
            context: Context::new(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEnvelope {
    #[serde(flatten)]
    pub output: Output,
    pub timing_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Result {
        #[serde(rename = "cellId")]
        cell_id: CellId,
        output: OutputEnvelope,
        context: Context,
    },
    /// `context` is the state at the point of failure, including bindings made
    /// before the fault.
    Error {
        #[serde(rename = "cellId")]
        cell_id: CellId,
        message: String,
        context: Context,
    },
}

impl Response {
    pub fn cell_id(&self) -> &CellId {
        match self {
            Response::Result { cell_id, .. } | Response::Error { cell_id, .. } => cell_id,
        }
    }

    pub fn context(&self) -> &Context {
        match self {
            Response::Result { context, .. } | Response::Error { context, .. } => context,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

pub fn decode_request(line: &str) -> serde_json::Result<Request> {
    serde_json::from_str(line)
}

pub fn encode_response(response: &Response) -> serde_json::Result<String> {
    serde_json::to_string(response)
}
