//! Shared types for task documents and source records.
//!
//! The wire format is camelCase JSON, matching the documents the dashboard
//! consumes on disk: a task file is an ordered map of tag name to
//! [`TagGroup`]. Statuses are free-form strings ("pending", "in-progress",
//! "done", ...) and are carried through verbatim.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A top-level task within a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub dependencies: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Subtask>>,
}

/// A subtask nested under a [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<i64>,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub test_strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<i64>,
}

/// Creation/update metadata attached to a tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMetadata {
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub description: String,
}

/// All tasks grouped under one named tag ("context").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagGroup {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub metadata: TagMetadata,
}

/// A full task document: tag name → group, in file order.
pub type TaskFile = IndexMap<String, TagGroup>;

/// Per-tag progress summary, reported alongside the task document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStats {
    pub total: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub done_percent: u32,
}

impl TagGroup {
    /// Progress summary over the group's top-level tasks.
    pub fn stats(&self) -> TagStats {
        TagStats {
            total: self.tasks.len(),
            status_counts: self.status_counts(),
            done_percent: self.done_percent(),
        }
    }

    /// Task counts keyed by status string.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for task in &self.tasks {
            *counts.entry(task.status.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Percentage of top-level tasks with status "done", rounded down.
    /// Empty groups report 0.
    pub fn done_percent(&self) -> u32 {
        if self.tasks.is_empty() {
            return 0;
        }
        let done = self.tasks.iter().filter(|t| t.status == "done").count();
        (done * 100 / self.tasks.len()) as u32
    }
}

/// A registered task document.
///
/// `original_path` is where the document actually lives; for uploaded
/// sources it points at the local backup copy under `files/`, whose file
/// name is kept in `file_path`. `has_error` / `error_message` are
/// validation annotations refreshed on every listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub name: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub original_path: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Health of the dashboard's view of its data, as reported by the
/// background refresh sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

/// Snapshot returned by `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_update: None,
        }
    }
}
