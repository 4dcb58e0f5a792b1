mod config;
mod handlers;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::{Config, DB_ENV, DEFAULT_LOG_FILTER, LOG_ENV};
use eventflow::engine::db::DEFAULT_DB_PATH;
use eventflow::engine::types::{Priority, TaskStatus};
use handlers::template::TemplateArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "eventflow",
    version,
    about = "Department task templates, prerequisites and event workflows"
)]
struct Cli {
    /// Path to the state database
    #[arg(long, global = true, env = DB_ENV, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
    /// Log filter, e.g. `info` or `eventflow=debug`
    #[arg(long, global = true, env = LOG_ENV, default_value = DEFAULT_LOG_FILTER)]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Initialize the state database
    Init,
    /// Manage departments
    #[command(subcommand)]
    Department(DepartmentCmd),
    /// Manage task templates and their prerequisites
    #[command(subcommand)]
    Template(TemplateCmd),
    /// Show every template a selection pulls in
    Resolve {
        /// Template ids or `department:title` keys
        #[arg(required = true)]
        templates: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Manage events
    #[command(subcommand)]
    Event(EventCmd),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCmd),
    /// Show the workflows of an event
    Workflow {
        event: i64,
        #[arg(long)]
        json: bool,
    },
    /// List waiting tasks stuck behind a cancelled prerequisite
    Stalled {
        event: i64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
enum DepartmentCmd {
    /// Add a department
    Add { key: String, name: String },
    /// List departments
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
enum TemplateCmd {
    /// Add a template to a department
    Add {
        /// Department key
        department: String,
        title: String,
        /// Localized title
        #[arg(long)]
        localized: Option<String>,
        /// Select automatically when the department joins an event
        #[arg(long)]
        default: bool,
        /// Notification target (repeatable)
        #[arg(long)]
        notify: Vec<String>,
        /// Due date offset in days from the event start (negative = before)
        #[arg(long, allow_hyphen_values = true, default_value = "0")]
        offset_days: i64,
        #[arg(long, default_value = "medium")]
        priority: Priority,
    },
    /// List templates
    List {
        /// Only this department
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Make a template require another one
    Require {
        /// The dependent template (id or `department:title`)
        template: String,
        /// The prerequisite template (id or `department:title`)
        prerequisite: String,
    },
}

#[derive(Subcommand, Clone)]
enum EventCmd {
    /// Create an event and build its workflows
    Create {
        name: String,
        /// Event start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Template to select (repeatable; id or `department:title`)
        #[arg(long = "select")]
        select: Vec<String>,
        /// Department whose default templates are selected (repeatable)
        #[arg(long = "defaults")]
        defaults: Vec<String>,
        /// Also instantiate the prerequisites the selection pulls in
        #[arg(long)]
        accept_prereqs: bool,
    },
}

#[derive(Subcommand, Clone)]
enum TaskCmd {
    /// Add an ad hoc task (no template, no workflow)
    Add {
        event: i64,
        /// Department key
        department: String,
        title: String,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// List an event's tasks
    List {
        event: i64,
        /// Only tasks someone can work on now
        #[arg(long)]
        actionable: bool,
        #[arg(long)]
        json: bool,
    },
    /// Change a task's status
    Status { task: i64, status: TaskStatus },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new(cli.db, cli.log_level);
    config.init_logging()?;

    match cli.command {
        Commands::Init
        | Commands::Department(DepartmentCmd::Add { .. })
        | Commands::Template(TemplateCmd::Add { .. } | TemplateCmd::Require { .. })
        | Commands::Event(_)
        | Commands::Task(TaskCmd::Add { .. } | TaskCmd::Status { .. }) => {
            dispatch_write_ops(&config, cli.command)
        }
        Commands::Department(DepartmentCmd::List { .. })
        | Commands::Template(TemplateCmd::List { .. })
        | Commands::Resolve { .. }
        | Commands::Task(TaskCmd::List { .. })
        | Commands::Workflow { .. }
        | Commands::Stalled { .. } => dispatch_read_ops(&config, cli.command),
    }
}

fn dispatch_write_ops(config: &Config, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init => handlers::init::handle(config),
        Commands::Department(DepartmentCmd::Add { key, name }) => {
            handlers::department::add(config, &key, &name)
        }
        Commands::Template(TemplateCmd::Add {
            department,
            title,
            localized,
            default,
            notify,
            offset_days,
            priority,
        }) => handlers::template::add(
            config,
            TemplateArgs {
                department,
                title,
                localized,
                is_default: default,
                notify,
                offset_days,
                priority,
            },
        ),
        Commands::Template(TemplateCmd::Require {
            template,
            prerequisite,
        }) => handlers::template::require(config, &template, &prerequisite),
        Commands::Event(EventCmd::Create {
            name,
            start,
            select,
            defaults,
            accept_prereqs,
        }) => handlers::event::create(config, &name, start, &select, &defaults, accept_prereqs),
        Commands::Task(TaskCmd::Add {
            event,
            department,
            title,
            priority,
            due,
        }) => handlers::task::add(config, event, &department, &title, priority, due),
        Commands::Task(TaskCmd::Status { task, status }) => {
            handlers::task::status(config, task, status)
        }
        _ => unreachable!("Invalid write command dispatch"),
    }
}

fn dispatch_read_ops(config: &Config, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Department(DepartmentCmd::List { json }) => {
            handlers::department::list(config, json)
        }
        Commands::Template(TemplateCmd::List { department, json }) => {
            handlers::template::list(config, department.as_deref(), json)
        }
        Commands::Resolve { templates, json } => {
            handlers::resolve::handle(config, &templates, json)
        }
        Commands::Task(TaskCmd::List {
            event,
            actionable,
            json,
        }) => handlers::task::list(config, event, actionable, json),
        Commands::Workflow { event, json } => handlers::workflow::handle(config, event, json),
        Commands::Stalled { event, json } => handlers::stalled::handle(config, event, json),
        _ => unreachable!("Invalid read command dispatch"),
    }
}
