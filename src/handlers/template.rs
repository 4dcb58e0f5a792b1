//! Handlers for `template add`, `template list` and `template require`.

use super::{department_ref, template_key, template_ref};
use crate::config::Config;
use anyhow::{Context, Result};
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::graph::{GraphStore, TemplateGraph};
use eventflow::engine::repo::TemplateRepo;
use eventflow::engine::types::{NewTemplate, Priority};
use serde::Serialize;

/// Everything `template add` was given on the command line.
pub struct TemplateArgs {
    pub department: String,
    pub title: String,
    pub localized: Option<String>,
    pub is_default: bool,
    pub notify: Vec<String>,
    pub offset_days: i64,
    pub priority: Priority,
}

/// Adds a template to a department.
///
/// # Errors
/// Returns error if the department is unknown or the title is taken.
pub fn add(config: &Config, args: TemplateArgs) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let department = department_ref(&conn, &args.department)?;

    let id = TemplateRepo::new(&conn)
        .add(&NewTemplate {
            department_id: department.id,
            title: args.title.clone(),
            title_localized: args.localized,
            is_default: args.is_default,
            notify: args.notify,
            due_offset_days: args.offset_days,
            priority: args.priority,
        })
        .with_context(|| format!("Failed to add template '{}'", args.title))?;

    println!(
        "{} Added template #{id} [{}:{}]{}",
        "✓".green(),
        department.key.yellow(),
        args.title,
        if args.is_default { " (default)" } else { "" }
    );
    Ok(())
}

/// Makes one template require another, rejecting cycles.
///
/// # Errors
/// Returns error if either template is unknown or the edge would close a cycle.
pub fn require(config: &Config, template: &str, prerequisite: &str) -> Result<()> {
    let mut conn = Db::connect(&config.db_path)?;
    let tx = conn.transaction()?;

    let dependent = template_ref(&tx, template)?;
    let required = template_ref(&tx, prerequisite)?;
    let added = TemplateRepo::new(&tx).add_prerequisite(dependent.id, required.id)?;
    let dependent_key = template_key(&tx, &dependent)?;
    let required_key = template_key(&tx, &required)?;
    tx.commit()?;

    if added {
        println!(
            "{} [{}] now requires [{}]",
            "✓".green(),
            dependent_key.yellow(),
            required_key.yellow()
        );
    } else {
        println!("   [{dependent_key}] already requires [{required_key}]");
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateView {
    id: i64,
    key: String,
    is_default: bool,
    due_offset_days: i64,
    priority: Priority,
    prerequisites: Vec<i64>,
    required_by: Vec<i64>,
}

/// Lists templates with their direct prerequisites.
///
/// # Errors
/// Returns error if database query fails.
pub fn list(config: &Config, department: Option<&str>, json: bool) -> Result<()> {
    let conn = Db::connect(&config.db_path)?;
    let repo = TemplateRepo::new(&conn);
    let templates = match department {
        Some(key) => repo.list_by_department(department_ref(&conn, key)?.id)?,
        None => repo.get_all()?,
    };
    let graph = TemplateGraph::load(&conn)?;

    let views = templates
        .iter()
        .map(|t| {
            Ok(TemplateView {
                id: t.id,
                key: template_key(&conn, t)?,
                is_default: t.is_default,
                due_offset_days: t.due_offset_days,
                priority: t.priority,
                prerequisites: graph.prerequisites_of(t.id).into_iter().collect(),
                required_by: graph.dependents_of(t.id).into_iter().collect(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("{} Templates:", "📋".cyan());
    if views.is_empty() {
        println!("   (none defined)");
    }
    for v in views {
        let marker = if v.is_default { "*".green() } else { " ".normal() };
        println!(
            "  {marker}#{:<4} [{}] {} {}",
            v.id,
            v.key.blue(),
            format!("T{:+}d", v.due_offset_days).dimmed(),
            v.priority.to_string().dimmed()
        );
        if !v.prerequisites.is_empty() {
            let ids: Vec<_> = v.prerequisites.iter().map(|id| format!("#{id}")).collect();
            println!("         requires: {}", ids.join(", ").dimmed());
        }
        if !v.required_by.is_empty() {
            let ids: Vec<_> = v.required_by.iter().map(|id| format!("#{id}")).collect();
            println!("         required by: {}", ids.join(", ").dimmed());
        }
    }
    Ok(())
}
