//! Progression Engine: user-driven status changes and the unblocking cascade.
//!
//! A dependent's prerequisites are re-derived from the template graph on
//! every check: the single `prerequisite_task_id` stored on a workflow member
//! only seeds the candidate list.
//!
//! Cancelling a task never touches its dependents. They stay `waiting` until
//! someone re-scopes the workflow; `stalled_tasks` lists them.

use super::error::{EngineError, EngineResult};
use super::graph::GraphStore;
use super::repo::{TaskRepo, WorkflowRepo};
use super::types::{Task, TaskStatus};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A waiting task that can never unblock without operator action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalledTask {
    pub task: Task,
    pub cancelled_prerequisites: Vec<i64>,
}

/// Outcome of one status change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub task: Task,
    /// Dependents moved from `waiting` to `pending` by this change.
    pub unblocked: Vec<i64>,
}

/// Tasks of the same event stamped from a template `task` requires.
///
/// # Errors
/// Returns an error if the query fails.
pub fn instance_prerequisites<G: GraphStore>(
    conn: &Connection,
    graph: &G,
    task: &Task,
) -> EngineResult<Vec<Task>> {
    let Some(template_id) = task.template_id else {
        return Ok(Vec::new());
    };
    let required = graph.prerequisites_of(template_id);
    Ok(TaskRepo::new(conn)
        .list_by_event(task.event_id)?
        .into_iter()
        .filter(|t| t.id != task.id && t.template_id.is_some_and(|id| required.contains(&id)))
        .collect())
}

/// Tasks of the same event whose template requires `task`'s template, plus
/// any workflow member recording `task` as its prerequisite.
///
/// # Errors
/// Returns an error if the query fails.
pub fn instance_dependents<G: GraphStore>(
    conn: &Connection,
    graph: &G,
    task: &Task,
) -> EngineResult<BTreeSet<i64>> {
    let mut dependents: BTreeSet<i64> = WorkflowRepo::new(conn)
        .recorded_dependents(task.id)?
        .into_iter()
        .collect();

    if let Some(template_id) = task.template_id {
        for candidate in TaskRepo::new(conn).list_by_event(task.event_id)? {
            let requires = candidate
                .template_id
                .is_some_and(|t| graph.prerequisites_of(t).contains(&template_id));
            if requires && candidate.id != task.id {
                dependents.insert(candidate.id);
            }
        }
    }
    Ok(dependents)
}

pub struct ProgressionEngine<'a, G: GraphStore> {
    conn: &'a mut Connection,
    graph: &'a G,
}

impl<'a, G: GraphStore> ProgressionEngine<'a, G> {
    #[must_use]
    pub fn new(conn: &'a mut Connection, graph: &'a G) -> Self {
        Self { conn, graph }
    }

    /// Applies a user-requested status change and returns the updated task.
    ///
    /// Completing a task cascades to its dependents. Repeating `completed` on
    /// a completed task re-runs the cascade, so a failed cascade can be retried.
    ///
    /// # Errors
    /// Returns `NotFound`, `InvalidTransition` (nothing written), or a
    /// database error. Cascade steps committed before an error stay committed.
    pub fn update_status(&mut self, task_id: i64, next: TaskStatus) -> EngineResult<Task> {
        self.apply(task_id, next).map(|change| change.task)
    }

    /// Same as [`update_status`](Self::update_status), also reporting the
    /// dependents this call moved to `pending`.
    ///
    /// # Errors
    /// See [`update_status`](Self::update_status).
    pub fn apply(&mut self, task_id: i64, next: TaskStatus) -> EngineResult<StatusChange> {
        let current = {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            let repo = TaskRepo::new(&tx);
            let task = repo.get(task_id)?;

            if task.status != next {
                if !task.status.can_transition_to(next) {
                    return Err(EngineError::InvalidTransition {
                        task_id,
                        from: task.status,
                        to: next,
                    });
                }
                repo.update_status(task_id, next)?;
                tx.commit()?;
                info!(task_id, from = %task.status, to = %next, "task status changed");
            }
            task
        };

        let unblocked = match next {
            TaskStatus::Completed => self.cascade(&current)?,
            TaskStatus::Cancelled if current.status != TaskStatus::Cancelled => {
                self.report_stranded(&current)?;
                Vec::new()
            }
            _ => Vec::new(),
        };

        Ok(StatusChange {
            task: TaskRepo::new(self.conn).get(task_id)?,
            unblocked,
        })
    }

    /// Unblocks every waiting dependent of a completed task whose
    /// prerequisites are now all completed. Returns the ids unblocked.
    ///
    /// # Errors
    /// Returns an error if a query or update fails.
    pub fn cascade(&mut self, completed: &Task) -> EngineResult<Vec<i64>> {
        let candidates = instance_dependents(self.conn, self.graph, completed)?;
        let mut unblocked = Vec::new();
        for dependent in candidates {
            if self.try_unblock(dependent)? {
                unblocked.push(dependent);
            }
        }
        Ok(unblocked)
    }

    /// Check-then-set for one dependent under SQLite's write lock.
    fn try_unblock(&mut self, task_id: i64) -> EngineResult<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let repo = TaskRepo::new(&tx);
        let dependent = repo.get(task_id)?;
        if dependent.status != TaskStatus::Waiting {
            return Ok(false);
        }

        let prerequisites = instance_prerequisites(&tx, self.graph, &dependent)?;
        let outstanding: Vec<i64> = prerequisites
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .map(|t| t.id)
            .collect();
        if !outstanding.is_empty() {
            debug!(task_id, ?outstanding, "dependent still blocked");
            return Ok(false);
        }

        let changed = repo.unblock(task_id)?;
        tx.commit()?;
        if changed {
            info!(task_id, "task unblocked");
        }
        Ok(changed)
    }

    fn report_stranded(&self, cancelled: &Task) -> EngineResult<()> {
        let repo = TaskRepo::new(self.conn);
        let mut stranded = Vec::new();
        for id in instance_dependents(self.conn, self.graph, cancelled)? {
            if repo.get(id)?.status == TaskStatus::Waiting {
                stranded.push(id);
            }
        }
        if !stranded.is_empty() {
            warn!(
                task_id = cancelled.id,
                ?stranded,
                "cancelled prerequisite leaves dependents waiting; operator action needed"
            );
        }
        Ok(())
    }

    /// Waiting tasks of an event blocked by at least one cancelled prerequisite.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub fn stalled_tasks(&self, event_id: i64) -> EngineResult<Vec<StalledTask>> {
        stalled_tasks(self.conn, self.graph, event_id)
    }
}

/// See [`ProgressionEngine::stalled_tasks`].
///
/// # Errors
/// Returns an error if a query fails.
pub fn stalled_tasks<G: GraphStore>(
    conn: &Connection,
    graph: &G,
    event_id: i64,
) -> EngineResult<Vec<StalledTask>> {
    let mut stalled = Vec::new();
    for task in TaskRepo::new(conn).list_by_event(event_id)? {
        if task.status != TaskStatus::Waiting {
            continue;
        }
        let cancelled_prerequisites: Vec<i64> = instance_prerequisites(conn, graph, &task)?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Cancelled)
            .map(|t| t.id)
            .collect();
        if !cancelled_prerequisites.is_empty() {
            stalled.push(StalledTask {
                task,
                cancelled_prerequisites,
            });
        }
    }
    Ok(stalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db::Db;
    use crate::engine::graph::TemplateGraph;
    use crate::engine::instantiate::{Assignment, InstanceMap, Selection, TaskInstantiator};
    use crate::engine::repo::{DepartmentRepo, EventRepo, TemplateRepo};
    use crate::engine::types::{NewTemplate, Priority};
    use crate::engine::workflow::WorkflowBuilder;
    use chrono::NaiveDate;
    use std::sync::Barrier;
    use std::thread;

    /// Builds an event from `edges` over templates `1..=n` in one department.
    fn event_with(n: i64, edges: &[(i64, i64)]) -> (Connection, TemplateGraph, InstanceMap) {
        let conn = Db::open_in_memory().unwrap();
        let (graph, instances) = seed(&conn, n, edges);
        (conn, graph, instances)
    }

    fn seed(conn: &Connection, n: i64, edges: &[(i64, i64)]) -> (TemplateGraph, InstanceMap) {
        let dept = DepartmentRepo::new(conn).add("ops", "Operations").unwrap();
        let templates = TemplateRepo::new(conn);
        for i in 1..=n {
            templates
                .add(&NewTemplate {
                    department_id: dept,
                    title: format!("T{i}"),
                    ..NewTemplate::default()
                })
                .unwrap();
        }
        for &(t, p) in edges {
            templates.add_prerequisite(t, p).unwrap();
        }
        let event = EventRepo::new(conn)
            .add("Summit", NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
            .unwrap();
        let graph = TemplateGraph::load(conn).unwrap();
        let assignments = [Assignment {
            department_id: dept,
            selections: (1..=n).map(Selection::template).collect(),
        }];
        let instances = TaskInstantiator::new(conn, &graph)
            .instantiate(event, &assignments)
            .unwrap();
        WorkflowBuilder::new(conn, &graph)
            .build(event, &instances)
            .unwrap();
        (graph, instances)
    }

    fn status(conn: &Connection, id: i64) -> TaskStatus {
        TaskRepo::new(conn).get(id).unwrap().status
    }

    fn task_for(instances: &InstanceMap, template: i64) -> i64 {
        instances[&(1, template)]
    }

    fn finish(engine: &mut ProgressionEngine<'_, TemplateGraph>, id: i64) {
        engine.update_status(id, TaskStatus::InProgress).unwrap();
        engine.update_status(id, TaskStatus::Completed).unwrap();
    }

    #[test]
    fn test_waiting_rejects_direct_progress() {
        let (mut conn, graph, instances) = event_with(2, &[(2, 1)]);
        let b = task_for(&instances, 2);
        let mut engine = ProgressionEngine::new(&mut conn, &graph);

        for next in [TaskStatus::InProgress, TaskStatus::Completed, TaskStatus::Pending] {
            let err = engine.update_status(b, next).unwrap_err();
            assert!(matches!(
                err,
                EngineError::InvalidTransition {
                    from: TaskStatus::Waiting,
                    ..
                }
            ));
        }
        drop(engine);
        assert_eq!(status(&conn, b), TaskStatus::Waiting);
    }

    #[test]
    fn test_chain_unblocks_one_step_at_a_time() {
        let (mut conn, graph, instances) = event_with(3, &[(2, 1), (3, 2)]);
        let (a, b, c) = (
            task_for(&instances, 1),
            task_for(&instances, 2),
            task_for(&instances, 3),
        );
        let mut engine = ProgressionEngine::new(&mut conn, &graph);

        finish(&mut engine, a);
        drop(engine);
        assert_eq!(status(&conn, b), TaskStatus::Pending);
        assert_eq!(status(&conn, c), TaskStatus::Waiting);

        let mut engine = ProgressionEngine::new(&mut conn, &graph);
        finish(&mut engine, b);
        drop(engine);
        assert_eq!(status(&conn, c), TaskStatus::Pending);
    }

    #[test]
    fn test_all_prerequisites_needed_in_any_order() {
        // 3 requires 1 and 2; the recorded prerequisite is the lower task id.
        for order in [[1, 2], [2, 1]] {
            let (mut conn, graph, instances) = event_with(3, &[(3, 1), (3, 2)]);
            let dependent = task_for(&instances, 3);
            let (first, second) = (task_for(&instances, order[0]), task_for(&instances, order[1]));
            let mut engine = ProgressionEngine::new(&mut conn, &graph);

            engine.update_status(first, TaskStatus::InProgress).unwrap();
            let change = engine.apply(first, TaskStatus::Completed).unwrap();
            assert!(change.unblocked.is_empty());
            assert!(engine
                .update_status(dependent, TaskStatus::InProgress)
                .is_err());

            engine.update_status(second, TaskStatus::InProgress).unwrap();
            let change = engine.apply(second, TaskStatus::Completed).unwrap();
            assert_eq!(change.unblocked, vec![dependent]);
            assert!(engine.apply(second, TaskStatus::Completed).unwrap().unblocked.is_empty());
            drop(engine);
            assert_eq!(status(&conn, dependent), TaskStatus::Pending);
        }
    }

    #[test]
    fn test_simultaneous_completions_unblock_shared_dependent_once() {
        // 3 requires 1 and 2; each prerequisite is completed from its own connection.
        for _ in 0..10 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.db");
            let conn = Db::init(&path).unwrap();
            let (_, instances) = seed(&conn, 3, &[(3, 1), (3, 2)]);
            drop(conn);
            let dependent = task_for(&instances, 3);
            let barrier = Barrier::new(2);

            let unblocked: Vec<i64> = thread::scope(|scope| {
                let handles: Vec<_> = [1, 2]
                    .into_iter()
                    .map(|template| {
                        let (path, barrier) = (&path, &barrier);
                        let task = task_for(&instances, template);
                        scope.spawn(move || {
                            let mut conn = Db::connect(path).unwrap();
                            let graph = TemplateGraph::load(&conn).unwrap();
                            let mut engine = ProgressionEngine::new(&mut conn, &graph);
                            engine.update_status(task, TaskStatus::InProgress).unwrap();
                            barrier.wait();
                            engine.apply(task, TaskStatus::Completed).unwrap().unblocked
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| h.join().unwrap())
                    .collect()
            });

            assert_eq!(unblocked, vec![dependent]);
            let conn = Db::connect(&path).unwrap();
            assert_eq!(status(&conn, dependent), TaskStatus::Pending);
        }
    }

    #[test]
    fn test_cascade_retry_is_idempotent() {
        let (mut conn, graph, instances) = event_with(2, &[(2, 1)]);
        let (a, b) = (task_for(&instances, 1), task_for(&instances, 2));
        let mut engine = ProgressionEngine::new(&mut conn, &graph);

        finish(&mut engine, a);
        engine.update_status(b, TaskStatus::InProgress).unwrap();

        // Re-completing `a` must not reset `b`.
        let again = engine.update_status(a, TaskStatus::Completed).unwrap();
        assert_eq!(again.status, TaskStatus::Completed);
        let completed = TaskRepo::new(engine.conn).get(a).unwrap();
        assert!(engine.cascade(&completed).unwrap().is_empty());
        drop(engine);
        assert_eq!(status(&conn, b), TaskStatus::InProgress);
    }

    #[test]
    fn test_revert_and_terminal_states() {
        let (mut conn, graph, instances) = event_with(1, &[]);
        let a = task_for(&instances, 1);
        let mut engine = ProgressionEngine::new(&mut conn, &graph);

        engine.update_status(a, TaskStatus::InProgress).unwrap();
        let reverted = engine.update_status(a, TaskStatus::Pending).unwrap();
        assert_eq!(reverted.status, TaskStatus::Pending);

        engine.update_status(a, TaskStatus::Cancelled).unwrap();
        assert!(matches!(
            engine.update_status(a, TaskStatus::InProgress),
            Err(EngineError::InvalidTransition { from: TaskStatus::Cancelled, .. })
        ));
        assert!(matches!(
            engine.update_status(404, TaskStatus::InProgress),
            Err(EngineError::NotFound { kind: "task", id: 404 })
        ));
    }

    #[test]
    fn test_cancelled_prerequisite_strands_dependent() {
        let (mut conn, graph, instances) = event_with(3, &[(2, 1), (3, 2)]);
        let (a, b) = (task_for(&instances, 1), task_for(&instances, 2));
        let mut engine = ProgressionEngine::new(&mut conn, &graph);

        engine.update_status(a, TaskStatus::Cancelled).unwrap();
        let stalled = engine.stalled_tasks(1).unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].task.id, b);
        assert_eq!(stalled[0].cancelled_prerequisites, vec![a]);
        drop(engine);
        assert_eq!(status(&conn, b), TaskStatus::Waiting);
    }

    #[test]
    fn test_ad_hoc_tasks_stay_out_of_cascade() {
        let (mut conn, graph, instances) = event_with(1, &[]);
        let a = task_for(&instances, 1);
        let ad_hoc = TaskRepo::new(&conn)
            .create_ad_hoc(1, 1, "Print badges", Priority::High, None)
            .unwrap();
        let mut engine = ProgressionEngine::new(&mut conn, &graph);

        finish(&mut engine, ad_hoc);
        finish(&mut engine, a);
        drop(engine);
        assert_eq!(status(&conn, ad_hoc), TaskStatus::Completed);
        assert!(WorkflowRepo::new(&conn).membership(ad_hoc).unwrap().is_none());
    }
}
