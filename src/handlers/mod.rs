//! Command handlers, one module per command group.

pub mod department;
pub mod event;
pub mod init;
pub mod resolve;
pub mod stalled;
pub mod task;
pub mod template;
pub mod workflow;

use anyhow::{Context, Result};
use colored::Colorize;
use eventflow::engine::repo::{DepartmentRepo, TemplateRepo};
use eventflow::engine::types::{Department, TaskStatus, TaskTemplate};
use rusqlite::Connection;

/// Resolves a numeric id or a `department:title` key into a template.
pub fn template_ref(conn: &Connection, reference: &str) -> Result<TaskTemplate> {
    let repo = TemplateRepo::new(conn);
    if let Ok(id) = reference.parse::<i64>() {
        if let Some(template) = repo.find_by_id(id)? {
            return Ok(template);
        }
    }
    repo.find_by_key(reference)
        .with_context(|| format!("Cannot resolve template '{reference}'"))
}

pub fn department_ref(conn: &Connection, key: &str) -> Result<Department> {
    DepartmentRepo::new(conn)
        .find_by_key(key)?
        .with_context(|| format!("No department with key '{key}'"))
}

/// `department:title` for display.
pub fn template_key(conn: &Connection, template: &TaskTemplate) -> Result<String> {
    let department = DepartmentRepo::new(conn)
        .find_by_id(template.department_id)?
        .map_or_else(|| "?".to_string(), |d| d.key);
    Ok(format!("{department}:{}", template.title))
}

pub fn status_icon(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Pending => "○".yellow(),
        TaskStatus::Waiting => "⏸".dimmed(),
        TaskStatus::InProgress => "→".cyan(),
        TaskStatus::Completed => "✓".green(),
        TaskStatus::Cancelled => "✗".red(),
    }
}
