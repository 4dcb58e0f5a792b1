//! Database bootstrap: opening connections and applying the schema.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default location of the state database, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".eventflow/state.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[(&str, &str)] = &[
    (
        "departments",
        "CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY,
            key TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL
        )",
    ),
    (
        "templates",
        "CREATE TABLE IF NOT EXISTS templates (
            id INTEGER PRIMARY KEY,
            department_id INTEGER NOT NULL REFERENCES departments(id),
            title TEXT NOT NULL,
            title_localized TEXT,
            is_default INTEGER NOT NULL DEFAULT 0,
            notify TEXT NOT NULL DEFAULT '[]',
            due_offset_days INTEGER NOT NULL DEFAULT 0,
            priority TEXT NOT NULL DEFAULT 'medium',
            UNIQUE (department_id, title)
        )",
    ),
    (
        "template_prerequisites",
        "CREATE TABLE IF NOT EXISTS template_prerequisites (
            template_id INTEGER NOT NULL REFERENCES templates(id),
            prerequisite_id INTEGER NOT NULL REFERENCES templates(id),
            PRIMARY KEY (template_id, prerequisite_id),
            CHECK (template_id <> prerequisite_id)
        )",
    ),
    (
        "events",
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL
        )",
    ),
    (
        "assignments",
        "CREATE TABLE IF NOT EXISTS assignments (
            id INTEGER PRIMARY KEY,
            event_id INTEGER NOT NULL REFERENCES events(id),
            department_id INTEGER NOT NULL REFERENCES departments(id),
            UNIQUE (event_id, department_id)
        )",
    ),
    (
        "tasks",
        "CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY,
            event_id INTEGER NOT NULL REFERENCES events(id),
            assignment_id INTEGER NOT NULL REFERENCES assignments(id),
            template_id INTEGER REFERENCES templates(id),
            title TEXT NOT NULL,
            title_localized TEXT,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            due_date TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ),
    (
        "workflows",
        "CREATE TABLE IF NOT EXISTS workflows (
            id INTEGER PRIMARY KEY,
            event_id INTEGER NOT NULL REFERENCES events(id)
        )",
    ),
    (
        "workflow_tasks",
        "CREATE TABLE IF NOT EXISTS workflow_tasks (
            workflow_id INTEGER NOT NULL REFERENCES workflows(id),
            task_id INTEGER NOT NULL UNIQUE REFERENCES tasks(id),
            prerequisite_task_id INTEGER REFERENCES tasks(id),
            order_index INTEGER NOT NULL,
            PRIMARY KEY (workflow_id, task_id)
        )",
    ),
    (
        "workflow_edges",
        "CREATE TABLE IF NOT EXISTS workflow_edges (
            workflow_id INTEGER NOT NULL REFERENCES workflows(id),
            task_id INTEGER NOT NULL REFERENCES tasks(id),
            prerequisite_task_id INTEGER NOT NULL REFERENCES tasks(id),
            PRIMARY KEY (task_id, prerequisite_task_id)
        )",
    ),
];

pub struct Db;

impl Db {
    /// Creates the database file (and its directory) and applies the schema.
    ///
    /// # Errors
    /// Returns error if directory creation, DB opening, or migration fails.
    pub fn init(path: &Path) -> Result<Connection> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        let conn = Self::open(path)?;
        Self::migrate(&conn)?;
        Ok(conn)
    }

    /// Connects to an existing database.
    ///
    /// # Errors
    /// Returns error if the database file does not exist or cannot be opened.
    pub fn connect(path: &Path) -> Result<Connection> {
        if !path.exists() {
            bail!(
                "No database at {}. Run `eventflow init` first.",
                path.display()
            );
        }
        Self::open(path)
    }

    /// Opens a fresh in-memory database with the schema applied.
    ///
    /// # Errors
    /// Returns error if migration fails.
    pub fn open_in_memory() -> Result<Connection> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::configure(&conn)?;
        Self::migrate(&conn)?;
        Ok(conn)
    }

    fn open(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path).context("Failed to open database")?;
        Self::configure(&conn)?;
        Ok(conn)
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        Ok(())
    }

    /// Applies the schema migrations.
    fn migrate(conn: &Connection) -> Result<()> {
        for (table, ddl) in SCHEMA {
            conn.execute(ddl, [])
                .with_context(|| format!("Failed to create {table} table"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        assert!(Db::connect(&path).is_err());

        Db::init(&path).unwrap();
        assert!(path.exists());
        let conn = Db::connect(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM workflows", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        Db::init(&path).unwrap();
        Db::init(&path).unwrap();
    }

    #[test]
    fn test_self_prerequisite_rejected_by_schema() {
        let conn = Db::open_in_memory().unwrap();
        conn.execute("INSERT INTO departments (key, name) VALUES ('ops', 'Ops')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO templates (department_id, title) VALUES (1, 'Book venue')",
            [],
        )
        .unwrap();
        let res = conn.execute(
            "INSERT INTO template_prerequisites (template_id, prerequisite_id) VALUES (1, 1)",
            [],
        );
        assert!(res.is_err());
    }
}
