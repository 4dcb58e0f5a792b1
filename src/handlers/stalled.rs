//! Handler for the `stalled` command.

use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::service::Engine;

/// Lists waiting tasks that can never unblock because a prerequisite was
/// cancelled.
///
/// # Errors
/// Returns error if database query fails.
pub fn handle(config: &Config, event: i64, json: bool) -> Result<()> {
    let mut conn = Db::connect(&config.db_path)?;
    let stalled = Engine::new(&mut conn).stalled_tasks(event)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stalled)?);
        return Ok(());
    }

    if stalled.is_empty() {
        println!("{} Nothing is stalled in event #{event}.", "✓".green());
        return Ok(());
    }

    println!("{} Stalled tasks:", "⚠".yellow());
    for s in stalled {
        let ids: Vec<_> = s
            .cancelled_prerequisites
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        println!(
            "   #{:<4} {} {}",
            s.task.id,
            s.task.title,
            format!("(cancelled: {})", ids.join(", ")).red()
        );
    }
    Ok(())
}
