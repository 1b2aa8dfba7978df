// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: one JSON document per line. Requests are
//! `{"op": "...", "args": {...}, "id": "..."}`; responses are
//! `{"ok": true, "result": {...}}` or
//! `{"ok": false, "error": {"code": "...", "message": "...", "details": {...}}}`.
//! Connections may be reused for any number of request/response pairs.
//! Two ops (`events_stream`, `term_attach`) hijack the connection into a
//! stream after their success ack.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

/// Maximum accepted request line (2 MB, matching the reader cap).
pub const MAX_LINE_BYTES: usize = 2_000_000;

/// IPC protocol revision reported by `ping`.
pub const IPC_VERSION: u32 = 1;

pub const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request line too large: {size} bytes (max {MAX_LINE_BYTES})")]
    LineTooLarge { size: usize },
    #[error("connection closed")]
    ConnectionClosed,
}

/// One request line from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub op: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Structured error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// One response line to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DaemonError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Response {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
            id: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(DaemonError {
                code: code.to_string(),
                message: message.into(),
                details: serde_json::Value::Null,
            }),
            id: None,
        }
    }

    pub fn error_with_details(
        code: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(DaemonError {
                code: code.to_string(),
                message: message.into(),
                details,
            }),
            id: None,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Canonical error codes. Every failure carries one of these plus a human
/// message; `details` is optional structured context.
pub mod codes {
    pub const MISSING_GROUP_ID: &str = "missing_group_id";
    pub const MISSING_ACTOR_ID: &str = "missing_actor_id";
    pub const MISSING_EVENT_ID: &str = "missing_event_id";
    pub const GROUP_NOT_FOUND: &str = "group_not_found";
    pub const ACTOR_NOT_FOUND: &str = "actor_not_found";
    pub const EVENT_NOT_FOUND: &str = "event_not_found";
    pub const PROFILE_NOT_FOUND: &str = "profile_not_found";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INVALID_PATCH: &str = "invalid_patch";
    pub const INVALID_PRIORITY: &str = "invalid_priority";
    pub const INVALID_RECIPIENT: &str = "invalid_recipient";
    pub const INVALID_ATTACHMENTS: &str = "invalid_attachments";
    pub const EMPTY_MESSAGE: &str = "empty_message";
    pub const NO_ENABLED_RECIPIENTS: &str = "no_enabled_recipients";
    pub const SCOPE_NOT_ATTACHED: &str = "scope_not_attached";
    pub const INVALID_PROJECT_ROOT: &str = "invalid_project_root";
    pub const VERSION_CONFLICT: &str = "version_conflict";
    pub const UNKNOWN_OP: &str = "unknown_op";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const STREAM_OVERFLOW: &str = "stream_overflow";
}

/// Read one request line (newline-delimited JSON).
pub async fn read_request<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Request, ProtocolError> {
    let line = read_line(reader).await?;
    Ok(serde_json::from_str(&line)?)
}

/// Read one raw line, enforcing the size cap.
pub async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<String, ProtocolError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if n > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLarge { size: n });
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Write one JSON document followed by a newline.
pub async fn write_json<W: tokio::io::AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), ProtocolError> {
    let mut data = serde_json::to_vec(value)?;
    data.push(b'\n');
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
