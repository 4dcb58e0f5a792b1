//! Workflow Repository: workflow rows, memberships and the full edge list.

use crate::engine::error::EngineResult;
use crate::engine::types::{TaskEdge, Workflow, WorkflowTask};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// A workflow with its ordered members and every instance edge inside it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowView {
    pub workflow: Workflow,
    pub members: Vec<WorkflowTask>,
    pub edges: Vec<TaskEdge>,
}

pub struct WorkflowRepo<'a> {
    conn: &'a Connection,
}

impl<'a> WorkflowRepo<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub fn create(&self, event_id: i64) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO workflows (event_id) VALUES (?1)",
            params![event_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// # Errors
    /// Returns an error if the insert fails (a task can belong to one workflow only).
    pub fn add_member(&self, member: &WorkflowTask) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO workflow_tasks (workflow_id, task_id, prerequisite_task_id, order_index)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                member.workflow_id,
                member.task_id,
                member.prerequisite_task_id,
                member.order_index,
            ],
        )?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub fn add_edge(&self, workflow_id: i64, edge: TaskEdge) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO workflow_edges (workflow_id, task_id, prerequisite_task_id)
             VALUES (?1, ?2, ?3)",
            params![workflow_id, edge.task_id, edge.prerequisite_task_id],
        )?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn count_for_event(&self, event_id: i64) -> EngineResult<usize> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM workflows WHERE event_id = ?1",
            params![event_id],
            |r| r.get(0),
        )?)
    }

    /// The membership row of a task, if it belongs to a workflow.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn membership(&self, task_id: i64) -> EngineResult<Option<WorkflowTask>> {
        Ok(self
            .conn
            .query_row(
                "SELECT workflow_id, task_id, prerequisite_task_id, order_index
                 FROM workflow_tasks WHERE task_id = ?1",
                params![task_id],
                row_to_member,
            )
            .optional()?)
    }

    /// Tasks whose recorded single prerequisite is `task_id`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recorded_dependents(&self, task_id: i64) -> EngineResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id FROM workflow_tasks WHERE prerequisite_task_id = ?1 ORDER BY task_id",
        )?;
        let rows = stmt.query_map(params![task_id], |r| r.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Every workflow of an event with members in order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_by_event(&self, event_id: i64) -> EngineResult<Vec<WorkflowView>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, event_id FROM workflows WHERE event_id = ?1 ORDER BY id")?;
        let workflows = stmt
            .query_map(params![event_id], |r| {
                Ok(Workflow {
                    id: r.get(0)?,
                    event_id: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        workflows
            .into_iter()
            .map(|workflow| {
                Ok(WorkflowView {
                    members: self.members(workflow.id)?,
                    edges: self.edges(workflow.id)?,
                    workflow,
                })
            })
            .collect()
    }

    fn members(&self, workflow_id: i64) -> EngineResult<Vec<WorkflowTask>> {
        let mut stmt = self.conn.prepare(
            "SELECT workflow_id, task_id, prerequisite_task_id, order_index
             FROM workflow_tasks WHERE workflow_id = ?1 ORDER BY order_index",
        )?;
        let rows = stmt.query_map(params![workflow_id], row_to_member)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn edges(&self, workflow_id: i64) -> EngineResult<Vec<TaskEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, prerequisite_task_id FROM workflow_edges
             WHERE workflow_id = ?1 ORDER BY task_id, prerequisite_task_id",
        )?;
        let rows = stmt.query_map(params![workflow_id], |r| {
            Ok(TaskEdge {
                task_id: r.get(0)?,
                prerequisite_task_id: r.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<WorkflowTask> {
    Ok(WorkflowTask {
        workflow_id: row.get(0)?,
        task_id: row.get(1)?,
        prerequisite_task_id: row.get(2)?,
        order_index: row.get(3)?,
    })
}
