//! Handler for the `workflow` command.

use super::status_icon;
use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::repo::{TaskRepo, WorkflowRepo};

/// Prints each workflow's members in build order with their edges.
///
/// # Errors
/// Returns error if database query fails.
pub fn handle(config: &Config, event: i64, json: bool) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let views = WorkflowRepo::new(&conn).list_by_event(event)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!("No workflows for event #{event}.");
        return Ok(());
    }

    let tasks = TaskRepo::new(&conn);
    for view in views {
        println!("{} Workflow #{}", "🔗".cyan(), view.workflow.id);
        for member in &view.members {
            let task = tasks.get(member.task_id)?;
            let after = member
                .prerequisite_task_id
                .map(|p| format!(" after #{p}"))
                .unwrap_or_default();
            println!(
                "  {:>2}. {} #{:<4} {}{}",
                member.order_index,
                status_icon(task.status),
                task.id,
                task.title,
                after.dimmed()
            );
        }
        let recorded = view
            .members
            .iter()
            .filter(|m| m.prerequisite_task_id.is_some())
            .count();
        if view.edges.len() > recorded {
            let all: Vec<_> = view
                .edges
                .iter()
                .map(|e| format!("#{} needs #{}", e.task_id, e.prerequisite_task_id))
                .collect();
            println!("      edges: {}", all.join(", ").dimmed());
        }
    }
    Ok(())
}
