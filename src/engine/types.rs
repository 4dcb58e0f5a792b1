//! Core records for the workflow engine.
//!
//! `TaskStatus` carries the transition table; the cascade that moves
//! `Waiting` to `Pending` lives in `progression.rs`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Actionable, no unmet prerequisite.
    Pending,
    /// Blocked behind at least one prerequisite.
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Returns true if a department user may move a task from `self` to `next`.
    ///
    /// `Waiting -> Pending` is not listed: only the cascade performs it.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::{Cancelled, Completed, InProgress, Pending, Waiting};
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Pending)
                | (InProgress, Completed)
                | (Pending | InProgress | Waiting, Cancelled)
        )
    }

    /// Completed and cancelled tasks never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "waiting" => Ok(Self::Waiting),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    pub id: i64,
    pub key: String,
    pub name: String,
}

/// A reusable task definition owned by a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub id: i64,
    pub department_id: i64,
    pub title: String,
    pub title_localized: Option<String>,
    pub is_default: bool,
    /// Notification targets, passed through opaquely.
    pub notify: Vec<String>,
    /// Days relative to the event start; negative means before.
    pub due_offset_days: i64,
    pub priority: Priority,
}

/// Fields needed to author a template.
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub department_id: i64,
    pub title: String,
    pub title_localized: Option<String>,
    pub is_default: bool,
    pub notify: Vec<String>,
    pub due_offset_days: i64,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
}

/// A concrete task belonging to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub event_id: i64,
    pub assignment_id: i64,
    /// `None` for ad hoc tasks, which never join a workflow.
    pub template_id: Option<i64>,
    pub title: String,
    pub title_localized: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workflow {
    pub id: i64,
    pub event_id: i64,
}

/// Position of one task inside a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowTask {
    pub workflow_id: i64,
    pub task_id: i64,
    /// Lowest-id direct predecessor, if any.
    pub prerequisite_task_id: Option<i64>,
    pub order_index: usize,
}

/// An instance-level "must finish before" link: `task_id` requires `prerequisite_task_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskEdge {
    pub task_id: i64,
    pub prerequisite_task_id: i64,
}
