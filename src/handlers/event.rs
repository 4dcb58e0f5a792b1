//! Handler for `event create`: the event-creation hook from the command line.

use super::{department_ref, template_key, template_ref};
use crate::config::Config;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use eventflow::engine::db::Db;
use eventflow::engine::graph::{GraphStore, TemplateGraph};
use eventflow::engine::instantiate::{Assignment, Selection};
use eventflow::engine::repo::TemplateRepo;
use eventflow::engine::resolver::PrerequisiteResolver;
use eventflow::engine::service::Engine;
use std::collections::{BTreeMap, BTreeSet};

/// Creates an event, instantiates the selected templates and builds workflows.
///
/// Prerequisites outside the selection are only instantiated with
/// `accept_prereqs`; otherwise they are listed and left out.
///
/// # Errors
/// Returns error if a reference is unknown, nothing was selected, or the
/// workflow build fails.
pub fn create(
    config: &Config,
    name: &str,
    start: NaiveDate,
    select: &[String],
    defaults: &[String],
    accept_prereqs: bool,
) -> Result<()> {
    let mut conn = Db::connect(&config.db_path)?;
    let graph = TemplateGraph::load(&conn)?;
    let resolver = PrerequisiteResolver::new(&graph);

    let mut chosen = BTreeSet::new();
    for reference in select {
        chosen.insert(template_ref(&conn, reference)?.id);
    }
    for key in defaults {
        let department = department_ref(&conn, key)?;
        let resolution = resolver.resolve_defaults(department.id)?;
        chosen.extend(
            resolution
                .all_templates
                .difference(&resolution.added_beyond_request)
                .copied(),
        );
    }
    if chosen.is_empty() {
        bail!("Nothing selected. Use --select or --defaults.");
    }

    let resolution = resolver.resolve(chosen.iter().copied())?;
    if !resolution.is_satisfied() {
        let templates = TemplateRepo::new(&conn);
        let verb = if accept_prereqs { "Adding" } else { "Not adding" };
        println!("{} {verb} required prerequisites:", "ℹ".cyan());
        for template in templates.get_many(resolution.added_beyond_request.iter().copied())? {
            println!("   + [{}]", template_key(&conn, &template)?.yellow());
        }
        if !accept_prereqs {
            println!("   Pass {} to include them.", "--accept-prereqs".bold());
        }
    }

    let mut by_department: BTreeMap<i64, Vec<Selection>> = BTreeMap::new();
    for &template_id in &chosen {
        let department_id = graph
            .department_of(template_id)
            .with_context(|| format!("Template #{template_id} has no department"))?;
        let selection = if accept_prereqs {
            let pulled = resolver.resolve([template_id])?.added_beyond_request;
            Selection::with_prerequisites(template_id, pulled)
        } else {
            Selection::template(template_id)
        };
        by_department.entry(department_id).or_default().push(selection);
    }
    let assignments: Vec<Assignment> = by_department
        .into_iter()
        .map(|(department_id, selections)| Assignment {
            department_id,
            selections,
        })
        .collect();

    let (event_id, plans) = Engine::new(&mut conn)
        .create_event(name, start, &assignments)
        .with_context(|| format!("Failed to create event '{name}'"))?;

    let task_count: usize = plans.iter().map(|p| p.members.len()).sum();
    println!(
        "{} Created event #{event_id} '{}' starting {start}",
        "✓".green(),
        name.bold()
    );
    println!("   {task_count} task(s) in {} workflow(s)", plans.len());
    Ok(())
}
