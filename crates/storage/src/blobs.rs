// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment blob store under `state/blobs/<name>`.
//!
//! Attachments on chat messages carry relative paths into this directory;
//! normalization resolves and stat-checks them without ever following a
//! path out of the group's state tree.

use crate::home::Home;
use cccc_core::{Attachment, GroupDoc};
use std::path::{Component, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("attachments must be a list")]
    NotAList,
    #[error("invalid attachment (must be object)")]
    InvalidItem,
    #[error("attachment missing path")]
    MissingPath,
    #[error("invalid attachment path: {0}")]
    InvalidPath(String),
    #[error("attachment not found: {0}")]
    NotFound(String),
}

/// Resolve a relative attachment path inside the group's blob dir.
/// Rejects absolute paths and any `..` traversal.
pub fn resolve_blob_path(home: &Home, group: &GroupDoc, rel_path: &str) -> Result<PathBuf, BlobError> {
    let rel = rel_path.trim();
    if rel.is_empty() {
        return Err(BlobError::MissingPath);
    }
    let p = PathBuf::from(rel);
    if p.is_absolute()
        || p.components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(BlobError::InvalidPath(rel.to_string()));
    }
    Ok(home.blobs_dir(group.group_id.as_str()).join(p))
}

/// Validate raw attachment values from a request into canonical entries.
pub fn normalize_attachments(
    home: &Home,
    group: &GroupDoc,
    raw: Option<&serde_json::Value>,
) -> Result<Vec<Attachment>, BlobError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let items = raw.as_array().ok_or(BlobError::NotAList)?;
    let mut out = Vec::new();
    for item in items {
        let obj = item.as_object().ok_or(BlobError::InvalidItem)?;
        let rel_path = obj
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if rel_path.is_empty() {
            return Err(BlobError::MissingPath);
        }
        let abs = resolve_blob_path(home, group, &rel_path)?;
        let meta = std::fs::metadata(&abs).map_err(|_| BlobError::NotFound(rel_path.clone()))?;
        if !meta.is_file() {
            return Err(BlobError::NotFound(rel_path.clone()));
        }
        out.push(Attachment {
            title: obj
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            path: rel_path,
            bytes: meta.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
#[path = "blobs_tests.rs"]
mod tests;
