//! Handlers for `department add` and `department list`.

use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::repo::DepartmentRepo;

/// Adds a department.
///
/// # Errors
/// Returns error if the key is already taken.
pub fn add(config: &Config, key: &str, name: &str) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let id = DepartmentRepo::new(&conn).add(key, name)?;
    println!("{} Added department [{}] {} (#{id})", "✓".green(), key.yellow(), name);
    Ok(())
}

/// Lists departments.
///
/// # Errors
/// Returns error if database query fails.
pub fn list(config: &Config, json: bool) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let departments = DepartmentRepo::new(&conn).get_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&departments)?);
        return Ok(());
    }

    println!("{} Departments:", "🏢".cyan());
    if departments.is_empty() {
        println!("   (none defined)");
    }
    for d in departments {
        println!("   #{:<4} [{}] {}", d.id, d.key.blue(), d.name);
    }
    Ok(())
}
