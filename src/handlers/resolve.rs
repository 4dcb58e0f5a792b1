//! Handler for the `resolve` command.

use super::{template_key, template_ref};
use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::service::Engine;

/// Shows the full set of templates a selection requires.
///
/// # Errors
/// Returns error if any reference is unknown.
pub fn handle(config: &Config, references: &[String], json: bool) -> Result<()> {
    let mut conn = Db::connect(&config.db_path)?;
    let selected = references
        .iter()
        .map(|r| template_ref(&conn, r).map(|t| t.id))
        .collect::<Result<Vec<_>>>()?;

    let response = Engine::new(&mut conn).resolve_prerequisites(&selected)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.added_beyond_request.is_empty() {
        println!("{} Selection is complete; nothing else is required.", "✓".green());
        return Ok(());
    }

    println!(
        "{} Selecting this also requires {} more template(s):",
        "ℹ".cyan(),
        response.added_beyond_request.len()
    );
    for template in &response.added_beyond_request {
        println!("   + [{}]", template_key(&conn, template)?.yellow());
    }
    println!(
        "\n   Pass {} to `event create` to include them.",
        "--accept-prereqs".bold()
    );
    Ok(())
}
