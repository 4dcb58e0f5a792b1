//! Task Repository: task instances and their stored status.

use super::{DepartmentRepo, EventRepo};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{Priority, Task, TaskStatus};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

pub const TASK_SELECT: &str = "SELECT id, event_id, assignment_id, template_id, title, \
     title_localized, status, priority, due_date, created_at FROM tasks";

/// Fields for a task about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub event_id: i64,
    pub assignment_id: i64,
    pub template_id: Option<i64>,
    pub title: String,
    pub title_localized: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

pub struct TaskRepo<'a> {
    conn: &'a Connection,
}

impl<'a> TaskRepo<'a> {
    /// Creates a new repository instance borrowing the connection.
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts a task.
    ///
    /// # Errors
    /// Returns an error if the insertion fails.
    pub fn create(&self, task: &NewTask) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO tasks (event_id, assignment_id, template_id, title, title_localized,
                                status, priority, due_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.event_id,
                task.assignment_id,
                task.template_id,
                task.title,
                task.title_localized,
                task.status,
                task.priority,
                task.due_date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Creates a task with no template. It starts `pending` and never joins a workflow.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown event or department, or a database error.
    pub fn create_ad_hoc(
        &self,
        event_id: i64,
        department_id: i64,
        title: &str,
        priority: Priority,
        due_date: Option<NaiveDate>,
    ) -> EngineResult<i64> {
        let events = EventRepo::new(self.conn);
        events.get(event_id)?;
        if DepartmentRepo::new(self.conn).find_by_id(department_id)?.is_none() {
            return Err(EngineError::not_found("department", department_id));
        }
        let assignment_id = events.ensure_assignment(event_id, department_id)?;
        self.create(&NewTask {
            event_id,
            assignment_id,
            template_id: None,
            title: title.to_string(),
            title_localized: None,
            status: TaskStatus::Pending,
            priority,
            due_date,
        })
    }

    /// Finds a task by its internal ID.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_by_id(&self, id: i64) -> EngineResult<Option<Task>> {
        let sql = format!("{TASK_SELECT} WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_task)
            .optional()?)
    }

    /// # Errors
    /// Returns `NotFound` or a database error.
    pub fn get(&self, id: i64) -> EngineResult<Task> {
        self.find_by_id(id)?
            .ok_or_else(|| EngineError::not_found("task", id))
    }

    /// All tasks of an event, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_by_event(&self, event_id: i64) -> EngineResult<Vec<Task>> {
        let sql = format!("{TASK_SELECT} WHERE event_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![event_id], row_to_task)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Updates the stored status of a task.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn update_status(&self, id: i64, status: TaskStatus) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        Ok(())
    }

    /// Moves a task from `waiting` to `pending` if it is still waiting.
    ///
    /// Returns whether this call performed the change.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn unblock(&self, id: i64) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![TaskStatus::Pending, id, TaskStatus::Waiting],
        )?;
        Ok(changed == 1)
    }
}

/// Converts a database row to a Task object.
fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        event_id: row.get(1)?,
        assignment_id: row.get(2)?,
        template_id: row.get(3)?,
        title: row.get(4)?,
        title_localized: row.get(5)?,
        status: row.get(6)?,
        priority: row.get(7)?,
        due_date: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db::Db;
    use crate::engine::repo::DepartmentRepo;

    fn setup() -> (Connection, i64) {
        let conn = Db::open_in_memory().unwrap();
        DepartmentRepo::new(&conn).add("av", "Audio/Visual").unwrap();
        let event = EventRepo::new(&conn)
            .add("Expo", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap())
            .unwrap();
        (conn, event)
    }

    #[test]
    fn test_ad_hoc_task_starts_pending_without_template() {
        let (conn, event) = setup();
        let repo = TaskRepo::new(&conn);
        let due = NaiveDate::from_ymd_opt(2026, 10, 30);
        let id = repo
            .create_ad_hoc(event, 1, "Rent extra mics", Priority::Low, due)
            .unwrap();

        let task = repo.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.template_id, None);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.due_date, due);
        assert_eq!(repo.list_by_event(event).unwrap().len(), 1);
    }

    #[test]
    fn test_ad_hoc_task_needs_event() {
        let (conn, _) = setup();
        let err = TaskRepo::new(&conn)
            .create_ad_hoc(77, 1, "x", Priority::Medium, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "event", id: 77 }));
    }

    #[test]
    fn test_ad_hoc_task_needs_department() {
        let (conn, event) = setup();
        let repo = TaskRepo::new(&conn);
        let err = repo
            .create_ad_hoc(event, 42, "x", Priority::Medium, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "department", id: 42 }));
        assert!(repo.list_by_event(event).unwrap().is_empty());
    }

    #[test]
    fn test_unblock_only_applies_once() {
        let (conn, event) = setup();
        let repo = TaskRepo::new(&conn);
        let id = repo
            .create_ad_hoc(event, 1, "Stage", Priority::Medium, None)
            .unwrap();
        repo.update_status(id, TaskStatus::Waiting).unwrap();

        assert!(repo.unblock(id).unwrap());
        assert!(!repo.unblock(id).unwrap());
        assert_eq!(repo.get(id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_missing_task_is_not_found() {
        let (conn, _) = setup();
        let repo = TaskRepo::new(&conn);
        assert!(repo.find_by_id(5).unwrap().is_none());
        assert!(matches!(
            repo.get(5),
            Err(EngineError::NotFound { kind: "task", id: 5 })
        ));
    }
}
