//! Task Instantiator: stamps an event's template selections into tasks.

use super::error::{EngineError, EngineResult};
use super::graph::GraphStore;
use super::repo::{DepartmentRepo, EventRepo, NewTask, TaskRepo, TemplateRepo};
use super::types::TaskStatus;
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// `(department_id, template_id) -> task_id` for one event.
pub type InstanceMap = BTreeMap<(i64, i64), i64>;

/// One template chosen by a department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub template_id: i64,
    /// Prerequisites accepted from the resolver. Each is instantiated under
    /// its own department's assignment.
    pub prerequisites: Option<BTreeSet<i64>>,
}

impl Selection {
    #[must_use]
    pub fn template(template_id: i64) -> Self {
        Self {
            template_id,
            prerequisites: None,
        }
    }

    #[must_use]
    pub fn with_prerequisites(template_id: i64, prerequisites: BTreeSet<i64>) -> Self {
        Self {
            template_id,
            prerequisites: Some(prerequisites),
        }
    }
}

/// A department's participation in an event and what it selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub department_id: i64,
    pub selections: Vec<Selection>,
}

pub struct TaskInstantiator<'a, G: GraphStore> {
    conn: &'a Connection,
    graph: &'a G,
}

impl<'a, G: GraphStore> TaskInstantiator<'a, G> {
    #[must_use]
    pub fn new(conn: &'a Connection, graph: &'a G) -> Self {
        Self { conn, graph }
    }

    /// Creates one task per distinct `(department, template)` pair.
    ///
    /// Tasks start `pending`; the workflow builder sets their real status.
    /// Run inside the caller's transaction: on error nothing should be kept.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown event, department or template.
    pub fn instantiate(
        &self,
        event_id: i64,
        assignments: &[Assignment],
    ) -> EngineResult<InstanceMap> {
        let events = EventRepo::new(self.conn);
        let event = events.get(event_id)?;

        let wanted = self.expand(assignments)?;
        let templates = TemplateRepo::new(self.conn);
        let tasks = TaskRepo::new(self.conn);
        let mut instances = InstanceMap::new();

        for (department_id, template_id) in wanted {
            let template = templates.get(template_id)?;
            let assignment_id = events.ensure_assignment(event_id, department_id)?;
            let task_id = tasks.create(&NewTask {
                event_id,
                assignment_id,
                template_id: Some(template_id),
                title: template.title,
                title_localized: template.title_localized,
                status: TaskStatus::Pending,
                priority: template.priority,
                due_date: due_date(event.start_date, template.due_offset_days),
            })?;
            debug!(event_id, department_id, template_id, task_id, "task instantiated");
            instances.insert((department_id, template_id), task_id);
        }

        info!(event_id, tasks = instances.len(), "event tasks instantiated");
        Ok(instances)
    }

    /// Flattens assignments into the ordered set of pairs to create.
    fn expand(&self, assignments: &[Assignment]) -> EngineResult<BTreeSet<(i64, i64)>> {
        let departments = DepartmentRepo::new(self.conn);
        let mut wanted = BTreeSet::new();

        for assignment in assignments {
            if departments.find_by_id(assignment.department_id)?.is_none() {
                return Err(EngineError::not_found("department", assignment.department_id));
            }
            for selection in &assignment.selections {
                self.require_template(selection.template_id)?;
                wanted.insert((assignment.department_id, selection.template_id));

                for &prerequisite in selection.prerequisites.iter().flatten() {
                    let owner = self
                        .graph
                        .department_of(prerequisite)
                        .ok_or_else(|| EngineError::not_found("template", prerequisite))?;
                    wanted.insert((owner, prerequisite));
                }
            }
        }
        Ok(wanted)
    }

    fn require_template(&self, template_id: i64) -> EngineResult<()> {
        if self.graph.template_exists(template_id) {
            Ok(())
        } else {
            Err(EngineError::not_found("template", template_id))
        }
    }
}

fn due_date(start: NaiveDate, offset_days: i64) -> Option<NaiveDate> {
    Duration::try_days(offset_days).and_then(|offset| start.checked_add_signed(offset))
}
