//! Event Repository: the minimal event and department-assignment records.

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::Event;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

pub struct EventRepo<'a> {
    conn: &'a Connection,
}

impl<'a> EventRepo<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub fn add(&self, name: &str, start_date: NaiveDate) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO events (name, start_date) VALUES (?1, ?2)",
            params![name, start_date],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// # Errors
    /// Returns `NotFound` or a database error.
    pub fn get(&self, id: i64) -> EngineResult<Event> {
        self.conn
            .query_row(
                "SELECT id, name, start_date FROM events WHERE id = ?1",
                params![id],
                |r| {
                    Ok(Event {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        start_date: r.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found("event", id))
    }

    /// Returns the assignment of a department to an event, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if either side does not exist or the insert fails.
    pub fn ensure_assignment(&self, event_id: i64, department_id: i64) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO assignments (event_id, department_id) VALUES (?1, ?2)",
            params![event_id, department_id],
        )?;
        Ok(self.conn.query_row(
            "SELECT id FROM assignments WHERE event_id = ?1 AND department_id = ?2",
            params![event_id, department_id],
            |r| r.get(0),
        )?)
    }
}
