//! Handlers for `task add`, `task list` and `task status`.

use super::{department_ref, status_icon};
use crate::config::Config;
use anyhow::Result;
use chrono::NaiveDate;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::repo::TaskRepo;
use eventflow::engine::service::Engine;
use eventflow::engine::types::{Priority, TaskStatus};

/// Adds an ad hoc task. It joins no workflow and starts `pending`.
///
/// # Errors
/// Returns error if the event or department is unknown.
pub fn add(
    config: &Config,
    event: i64,
    department: &str,
    title: &str,
    priority: Priority,
    due: Option<NaiveDate>,
) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let department = department_ref(&conn, department)?;
    let id = TaskRepo::new(&conn).create_ad_hoc(event, department.id, title, priority, due)?;
    println!(
        "{} Added task #{id} [{}] {title}",
        "✓".green(),
        department.key.yellow()
    );
    Ok(())
}

/// Lists an event's tasks.
///
/// # Errors
/// Returns error if database query fails.
pub fn list(config: &Config, event: i64, actionable: bool, json: bool) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let tasks: Vec<_> = TaskRepo::new(&conn)
        .list_by_event(event)?
        .into_iter()
        .filter(|t| !actionable || !(t.status == TaskStatus::Waiting || t.status.is_terminal()))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    println!("{} Tasks for event #{event}:", "📋".cyan());
    if tasks.is_empty() {
        println!("   (none)");
    }
    for task in tasks {
        let due = task
            .due_date
            .map(|d| format!(" due {d}"))
            .unwrap_or_default();
        println!(
            "  {} #{:<4} {} {}{}",
            status_icon(task.status),
            task.id,
            task.title,
            format!("[{}]", task.status).dimmed(),
            due.dimmed()
        );
    }
    Ok(())
}

/// Changes a task's status and reports anything it unblocked.
///
/// # Errors
/// Returns error if the task is unknown or the transition is not allowed.
pub fn status(config: &Config, task: i64, status: TaskStatus) -> Result<()> {
    let mut conn = Db::connect(&config.db_path)?;
    let change = Engine::new(&mut conn).change_task_status(task, status)?;
    let updated = change.task;
    println!(
        "{} Task #{} '{}' is now {}",
        status_icon(updated.status),
        updated.id,
        updated.title,
        updated.status.to_string().bold()
    );
    if !change.unblocked.is_empty() {
        let ids: Vec<_> = change.unblocked.iter().map(|id| format!("#{id}")).collect();
        println!("   {} Now ready: {}", "→".cyan(), ids.join(", "));
    }
    if updated.status == TaskStatus::Completed {
        println!(
            "   Run {} to see what is ready next.",
            format!("eventflow task list {} --actionable", updated.event_id).bold()
        );
    }
    Ok(())
}
