//! Template Repository: authoring templates and their prerequisite edges.
//!
//! Human-readable `department:title` keys are resolved here and only here;
//! everything downstream works on template ids.

use super::DepartmentRepo;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::graph::TemplateGraph;
use crate::engine::types::{NewTemplate, TaskTemplate};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

pub const TEMPLATE_SELECT: &str = "SELECT id, department_id, title, title_localized, is_default, \
     notify, due_offset_days, priority FROM templates";

pub struct TemplateRepo<'a> {
    conn: &'a Connection,
}

impl<'a> TemplateRepo<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Adds a template to its department.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown department, or a database error.
    pub fn add(&self, template: &NewTemplate) -> EngineResult<i64> {
        if DepartmentRepo::new(self.conn)
            .find_by_id(template.department_id)?
            .is_none()
        {
            return Err(EngineError::not_found("department", template.department_id));
        }

        self.conn.execute(
            "INSERT INTO templates (department_id, title, title_localized, is_default, notify,
                                    due_offset_days, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                template.department_id,
                template.title,
                template.title_localized,
                template.is_default,
                serde_json::to_string(&template.notify)?,
                template.due_offset_days,
                template.priority,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Makes `template_id` require `prerequisite_id`.
    ///
    /// Returns `false` if the edge already existed.
    ///
    /// # Errors
    /// Returns `NotFound`, `SelfPrerequisite` or `CycleDetected`; nothing is
    /// written in those cases.
    pub fn add_prerequisite(&self, template_id: i64, prerequisite_id: i64) -> EngineResult<bool> {
        for id in [template_id, prerequisite_id] {
            if self.find_by_id(id)?.is_none() {
                return Err(EngineError::not_found("template", id));
            }
        }

        let graph = TemplateGraph::load(self.conn)?;
        graph.check_new_edge(template_id, prerequisite_id)?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO template_prerequisites (template_id, prerequisite_id)
             VALUES (?1, ?2)",
            params![template_id, prerequisite_id],
        )?;
        if inserted > 0 {
            info!(template_id, prerequisite_id, "prerequisite edge added");
        }
        Ok(inserted > 0)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_by_id(&self, id: i64) -> EngineResult<Option<TaskTemplate>> {
        let sql = format!("{TEMPLATE_SELECT} WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_template)
            .optional()?)
    }

    /// Like `find_by_id`, but a missing template is an error.
    ///
    /// # Errors
    /// Returns `NotFound` or a database error.
    pub fn get(&self, id: i64) -> EngineResult<TaskTemplate> {
        self.find_by_id(id)?
            .ok_or_else(|| EngineError::not_found("template", id))
    }

    /// Finds a template by its `department:title` key (case-insensitive).
    ///
    /// # Errors
    /// Returns `UnknownKey` if the key is malformed or matches nothing.
    pub fn find_by_key(&self, key: &str) -> EngineResult<TaskTemplate> {
        let unknown = || EngineError::UnknownKey {
            key: key.to_string(),
        };
        let (department, title) = key.split_once(':').ok_or_else(unknown)?;

        let sql = format!(
            "{TEMPLATE_SELECT}
             WHERE department_id = (SELECT id FROM departments WHERE LOWER(key) = LOWER(?1))
             AND LOWER(title) = LOWER(?2)"
        );
        self.conn
            .query_row(&sql, params![department.trim(), title.trim()], row_to_template)
            .optional()?
            .ok_or_else(unknown)
    }

    /// Loads several templates, preserving the order of `ids`.
    ///
    /// # Errors
    /// Returns `NotFound` for the first missing id.
    pub fn get_many(&self, ids: impl IntoIterator<Item = i64>) -> EngineResult<Vec<TaskTemplate>> {
        ids.into_iter().map(|id| self.get(id)).collect()
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_all(&self) -> EngineResult<Vec<TaskTemplate>> {
        let sql = format!("{TEMPLATE_SELECT} ORDER BY department_id, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_template)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_by_department(&self, department_id: i64) -> EngineResult<Vec<TaskTemplate>> {
        let sql = format!("{TEMPLATE_SELECT} WHERE department_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![department_id], row_to_template)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn row_to_template(row: &rusqlite::Row) -> rusqlite::Result<TaskTemplate> {
    let notify: String = row.get(5)?;
    let notify = serde_json::from_str(&notify)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(TaskTemplate {
        id: row.get(0)?,
        department_id: row.get(1)?,
        title: row.get(2)?,
        title_localized: row.get(3)?,
        is_default: row.get(4)?,
        notify,
        due_offset_days: row.get(6)?,
        priority: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db::Db;
    use crate::engine::types::Priority;

    fn setup() -> Connection {
        let conn = Db::open_in_memory().unwrap();
        let departments = DepartmentRepo::new(&conn);
        departments.add("venue", "Venue").unwrap();
        departments.add("catering", "Catering").unwrap();
        conn
    }

    fn template(department_id: i64, title: &str) -> NewTemplate {
        NewTemplate {
            department_id,
            title: title.to_string(),
            ..NewTemplate::default()
        }
    }

    #[test]
    fn test_add_and_find_by_key() {
        let conn = setup();
        let repo = TemplateRepo::new(&conn);
        let id = repo
            .add(&NewTemplate {
                title_localized: Some("Réserver la salle".to_string()),
                is_default: true,
                notify: vec!["ops@example.org".to_string()],
                due_offset_days: -30,
                priority: Priority::High,
                ..template(1, "Book venue")
            })
            .unwrap();

        let found = repo.find_by_key("Venue:book VENUE").unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.notify, vec!["ops@example.org".to_string()]);
        assert_eq!(found.due_offset_days, -30);
        assert_eq!(found.priority, Priority::High);
        assert!(found.is_default);

        assert!(matches!(
            repo.find_by_key("catering:Book venue"),
            Err(EngineError::UnknownKey { .. })
        ));
        assert!(matches!(
            repo.find_by_key("no-colon"),
            Err(EngineError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_add_rejects_unknown_department() {
        let conn = setup();
        let err = TemplateRepo::new(&conn).add(&template(9, "x")).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "department", id: 9 }));
    }

    #[test]
    fn test_cross_department_edge_and_cycle_rejection() {
        let conn = setup();
        let repo = TemplateRepo::new(&conn);
        let a = repo.add(&template(1, "Book venue")).unwrap();
        let b = repo.add(&template(1, "Floor plan")).unwrap();
        let c = repo.add(&template(2, "Menu tasting")).unwrap();

        assert!(repo.add_prerequisite(b, a).unwrap());
        assert!(repo.add_prerequisite(c, b).unwrap());
        assert!(!repo.add_prerequisite(c, b).unwrap());

        assert!(matches!(
            repo.add_prerequisite(a, c),
            Err(EngineError::CycleDetected { .. })
        ));
        assert!(matches!(
            repo.add_prerequisite(a, a),
            Err(EngineError::SelfPrerequisite { .. })
        ));
        assert!(matches!(
            repo.add_prerequisite(a, 99),
            Err(EngineError::NotFound { kind: "template", id: 99 })
        ));

        let graph = TemplateGraph::load(&conn).unwrap();
        assert_eq!(graph.edges(), vec![(b, a), (c, b)]);
    }

    #[test]
    fn test_get_many_keeps_order() {
        let conn = setup();
        let repo = TemplateRepo::new(&conn);
        let a = repo.add(&template(1, "A")).unwrap();
        let b = repo.add(&template(2, "B")).unwrap();
        let titles: Vec<_> = repo
            .get_many([b, a])
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["B", "A"]);
        assert_eq!(repo.list_by_department(2).unwrap().len(), 1);
    }
}
