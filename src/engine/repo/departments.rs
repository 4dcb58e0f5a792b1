//! Department Repository.

use crate::engine::error::EngineResult;
use crate::engine::types::Department;
use rusqlite::{params, Connection, OptionalExtension};

const DEPARTMENT_SELECT: &str = "SELECT id, key, name FROM departments";

pub struct DepartmentRepo<'a> {
    conn: &'a Connection,
}

impl<'a> DepartmentRepo<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Adds a department.
    ///
    /// # Errors
    /// Returns an error if the key is taken or the insert fails.
    pub fn add(&self, key: &str, name: &str) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO departments (key, name) VALUES (?1, ?2)",
            params![key, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Finds a department by its key (case-insensitive).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_by_key(&self, key: &str) -> EngineResult<Option<Department>> {
        let sql = format!("{DEPARTMENT_SELECT} WHERE LOWER(key) = LOWER(?1)");
        Ok(self
            .conn
            .query_row(&sql, params![key], row_to_department)
            .optional()?)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_by_id(&self, id: i64) -> EngineResult<Option<Department>> {
        let sql = format!("{DEPARTMENT_SELECT} WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_department)
            .optional()?)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_all(&self) -> EngineResult<Vec<Department>> {
        let sql = format!("{DEPARTMENT_SELECT} ORDER BY key");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_department)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn row_to_department(row: &rusqlite::Row) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        key: row.get(1)?,
        name: row.get(2)?,
    })
}
