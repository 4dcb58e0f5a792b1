//! Repositories: all SQL lives under this module.

mod departments;
mod events;
mod tasks;
mod templates;
mod workflows;

pub use departments::DepartmentRepo;
pub use events::EventRepo;
pub use tasks::{NewTask, TaskRepo, TASK_SELECT};
pub use templates::{TemplateRepo, TEMPLATE_SELECT};
pub use workflows::{WorkflowRepo, WorkflowView};

use super::types::{Priority, TaskStatus};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}
