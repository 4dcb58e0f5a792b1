//! Handler for the `init` command.

use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::graph::TemplateGraph;
use tracing::warn;

/// Initializes the state database. Re-running it on an existing database
/// also checks the stored prerequisite edges for cycles.
///
/// # Errors
/// Returns error if database initialization fails.
pub fn handle(config: &Config) -> Result<()> {
    let conn = Db::init(&config.db_path)?;
    println!(
        "{} Initialized {}",
        "✓".green(),
        config.db_path.display()
    );

    if let Some(cycle) = TemplateGraph::load(&conn)?.find_cycle() {
        warn!(?cycle, "prerequisite graph contains a cycle");
        let ids: Vec<_> = cycle.iter().map(|id| format!("#{id}")).collect();
        println!(
            "{} Templates {} require each other; event creation will fail \
             until an edge is removed.",
            "⚠".yellow(),
            ids.join(", ")
        );
    }
    Ok(())
}
