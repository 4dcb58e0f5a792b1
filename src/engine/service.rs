//! Engine facade: the three operations the surrounding application calls.

use super::error::EngineResult;
use super::graph::TemplateGraph;
use super::instantiate::{Assignment, TaskInstantiator};
use super::progression::{self, ProgressionEngine, StalledTask, StatusChange};
use super::repo::{EventRepo, TemplateRepo};
use super::resolver::PrerequisiteResolver;
use super::types::{Task, TaskStatus, TaskTemplate};
use super::workflow::{WorkflowBuilder, WorkflowPlan};
use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;

/// Response shape for `resolve-prerequisites`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub all_templates: Vec<TaskTemplate>,
    pub added_beyond_request: Vec<TaskTemplate>,
}

pub struct Engine<'a> {
    conn: &'a mut Connection,
}

impl<'a> Engine<'a> {
    #[must_use]
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Read-only closure of a selection, with full template records.
    ///
    /// # Errors
    /// Returns `NotFound` if any selected id is unknown.
    pub fn resolve_prerequisites(&self, selected: &[i64]) -> EngineResult<ResolveResponse> {
        let graph = TemplateGraph::load(self.conn)?;
        let resolution = PrerequisiteResolver::new(&graph).resolve(selected.iter().copied())?;
        let templates = TemplateRepo::new(self.conn);
        Ok(ResolveResponse {
            all_templates: templates.get_many(resolution.all_templates)?,
            added_beyond_request: templates.get_many(resolution.added_beyond_request)?,
        })
    }

    /// Event-creation hook: instantiates the selections and builds workflows
    /// in one transaction.
    ///
    /// # Errors
    /// Any instantiation or build error; nothing is written in that case.
    pub fn create_event_workflows(
        &mut self,
        event_id: i64,
        assignments: &[Assignment],
    ) -> EngineResult<Vec<WorkflowPlan>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let plans = build_event(&tx, event_id, assignments)?;
        tx.commit()?;
        Ok(plans)
    }

    /// Inserts an event and runs the event-creation hook for it in one
    /// transaction. Returns the new event id and its workflows.
    ///
    /// # Errors
    /// Any instantiation or build error; the event row is not kept either.
    pub fn create_event(
        &mut self,
        name: &str,
        start_date: NaiveDate,
        assignments: &[Assignment],
    ) -> EngineResult<(i64, Vec<WorkflowPlan>)> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let event_id = EventRepo::new(&tx).add(name, start_date)?;
        let plans = build_event(&tx, event_id, assignments)?;
        tx.commit()?;
        Ok((event_id, plans))
    }

    /// Applies a department user's status change.
    ///
    /// # Errors
    /// `NotFound`, `InvalidTransition`, or a database error.
    pub fn update_task_status(&mut self, task_id: i64, status: TaskStatus) -> EngineResult<Task> {
        self.change_task_status(task_id, status).map(|change| change.task)
    }

    /// Like [`update_task_status`](Self::update_task_status), also returning
    /// the dependents the change unblocked.
    ///
    /// # Errors
    /// `NotFound`, `InvalidTransition`, or a database error.
    pub fn change_task_status(
        &mut self,
        task_id: i64,
        status: TaskStatus,
    ) -> EngineResult<StatusChange> {
        let graph = TemplateGraph::load(self.conn)?;
        ProgressionEngine::new(self.conn, &graph).apply(task_id, status)
    }

    /// Waiting tasks stranded behind a cancelled prerequisite.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub fn stalled_tasks(&self, event_id: i64) -> EngineResult<Vec<StalledTask>> {
        let graph = TemplateGraph::load(self.conn)?;
        progression::stalled_tasks(self.conn, &graph, event_id)
    }
}

fn build_event(
    tx: &Transaction<'_>,
    event_id: i64,
    assignments: &[Assignment],
) -> EngineResult<Vec<WorkflowPlan>> {
    let graph = TemplateGraph::load(tx)?;
    let instances = TaskInstantiator::new(tx, &graph).instantiate(event_id, assignments)?;
    WorkflowBuilder::new(tx, &graph).build(event_id, &instances)
}
