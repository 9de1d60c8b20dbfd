use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use spindle_core::error::{Result, SpindleError};

use crate::value::{from_database, ParameterValue};

/// One row of the parameter-value table, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValueRow {
    pub class: String,
    pub object: String,
    pub parameter: String,
    pub alternative: String,
    pub value: ParameterValue,
}

/// SQLite-backed parameter-value database behind a `sqlite://` URL.
///
/// Import helpers are idempotent upserts; `commit_session` flushes pending
/// imports into a commit record. Consumers open mappings independently, so
/// the engine's one-writer-at-a-time policy is what keeps writers serialized.
pub struct ParameterDb {
    conn: Mutex<Connection>,
    pending: Mutex<usize>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS object_class (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS object (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        class_id INTEGER NOT NULL REFERENCES object_class(id),
        name TEXT NOT NULL,
        UNIQUE(class_id, name)
    );

    CREATE TABLE IF NOT EXISTS parameter_definition (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        class_id INTEGER NOT NULL REFERENCES object_class(id),
        name TEXT NOT NULL,
        UNIQUE(class_id, name)
    );

    CREATE TABLE IF NOT EXISTS alternative (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    INSERT OR IGNORE INTO alternative (name) VALUES ('Base');

    CREATE TABLE IF NOT EXISTS parameter_value (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        parameter_id INTEGER NOT NULL REFERENCES parameter_definition(id),
        object_id INTEGER NOT NULL REFERENCES object(id),
        alternative_id INTEGER NOT NULL REFERENCES alternative(id),
        value TEXT NOT NULL,
        type TEXT,
        UNIQUE(parameter_id, object_id, alternative_id)
    );

    CREATE TABLE IF NOT EXISTS scenario (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS scenario_alternative (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scenario_id INTEGER NOT NULL REFERENCES scenario(id),
        alternative_id INTEGER NOT NULL REFERENCES alternative(id),
        rank INTEGER NOT NULL,
        UNIQUE(scenario_id, alternative_id),
        UNIQUE(scenario_id, rank)
    );

    CREATE TABLE IF NOT EXISTS commit_record (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message TEXT NOT NULL,
        date TEXT NOT NULL
    );";

/// Resolve a `sqlite:///path` URL (or a bare path) to the backing file.
pub fn url_to_path(url: &str) -> Result<PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite:///") {
        Ok(Path::new("/").join(rest))
    } else if let Some(rest) = url.strip_prefix("sqlite://") {
        Ok(PathBuf::from(rest))
    } else if url.starts_with("sqlite:") {
        Err(SpindleError::Database(format!("unsupported database URL: {}", url)))
    } else {
        Ok(PathBuf::from(url))
    }
}

impl ParameterDb {
    /// Open the database behind `url`. With `create`, missing files (and
    /// parent directories) are created and the schema installed; without it,
    /// a missing file is an error.
    pub fn create_mapping(url: &str, create: bool) -> Result<Self> {
        let path = url_to_path(url)?;
        if !create && !path.exists() {
            return Err(SpindleError::Database(format!(
                "database does not exist: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpindleError::Database(format!("cannot create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| SpindleError::Database(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| SpindleError::Database(e.to_string()))?;

        debug!(path = %path.display(), "Parameter database opened");
        Ok(Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(0),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| SpindleError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(0),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SpindleError::Database(e.to_string()))
    }

    fn mark_pending(&self, count: usize) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending += count;
        }
    }

    pub fn import_object_classes(&self, names: &[&str]) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for name in names {
            imported += conn
                .execute("INSERT OR IGNORE INTO object_class (name) VALUES (?1)", params![name])
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    pub fn import_objects(&self, objects: &[(&str, &str)]) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for (class, name) in objects {
            imported += conn
                .execute(
                    "INSERT OR IGNORE INTO object (class_id, name)
                     SELECT id, ?2 FROM object_class WHERE name = ?1",
                    params![class, name],
                )
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    pub fn import_object_parameters(&self, parameters: &[(&str, &str)]) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for (class, name) in parameters {
            imported += conn
                .execute(
                    "INSERT OR IGNORE INTO parameter_definition (class_id, name)
                     SELECT id, ?2 FROM object_class WHERE name = ?1",
                    params![class, name],
                )
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    pub fn import_alternatives(&self, names: &[&str]) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for name in names {
            imported += conn
                .execute("INSERT OR IGNORE INTO alternative (name) VALUES (?1)", params![name])
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    pub fn import_scenarios(&self, names: &[&str]) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for name in names {
            imported += conn
                .execute("INSERT OR IGNORE INTO scenario (name) VALUES (?1)", params![name])
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    pub fn import_scenario_alternatives(
        &self,
        links: &[(&str, &str, i64)],
    ) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for (scenario, alternative, rank) in links {
            imported += conn
                .execute(
                    "INSERT OR REPLACE INTO scenario_alternative (scenario_id, alternative_id, rank)
                     SELECT s.id, a.id, ?3 FROM scenario s, alternative a
                     WHERE s.name = ?1 AND a.name = ?2",
                    params![scenario, alternative, rank],
                )
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    /// Import parameter values, replacing on (class, object, parameter,
    /// alternative). The last write for a key wins, which is what gives the
    /// merger its write-order guarantee.
    pub fn import_object_parameter_values(
        &self,
        values: &[(&str, &str, &str, &str, ParameterValue)],
    ) -> Result<usize> {
        let conn = self.lock()?;
        let mut imported = 0;
        for (class, object, parameter, alternative, value) in values {
            let (encoded, type_tag) = value.to_database();
            imported += conn
                .execute(
                    "INSERT OR REPLACE INTO parameter_value
                         (parameter_id, object_id, alternative_id, value, type)
                     SELECT p.id, o.id, a.id, ?5, ?6
                     FROM parameter_definition p
                     JOIN object_class c ON c.id = p.class_id
                     JOIN object o ON o.class_id = c.id
                     JOIN alternative a ON a.name = ?4
                     WHERE c.name = ?1 AND o.name = ?2 AND p.name = ?3",
                    params![class, object, parameter, alternative, encoded, type_tag],
                )
                .map_err(|e| SpindleError::Database(e.to_string()))?;
        }
        drop(conn);
        self.mark_pending(imported);
        Ok(imported)
    }

    /// Record a commit for the pending imports. Committing with nothing
    /// pending is an error.
    pub fn commit_session(&self, message: &str) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        if *pending == 0 {
            return Err(SpindleError::DatabaseCommitFailed(
                "nothing to commit".into(),
            ));
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO commit_record (message, date) VALUES (?1, ?2)",
            params![message, Utc::now().to_rfc3339()],
        )
        .map_err(|e| SpindleError::DatabaseCommitFailed(e.to_string()))?;
        *pending = 0;
        debug!(message, "Session committed");
        Ok(())
    }

    /// All parameter values, optionally narrowed to a scenario: only the
    /// scenario's alternatives are visible, and for one (class, object,
    /// parameter) the highest-rank alternative shadows the rest.
    pub fn parameter_value_rows(&self, scenario: Option<&str>) -> Result<Vec<ParameterValueRow>> {
        let conn = self.lock()?;
        let mut rows = Vec::new();
        let mut push_row = |class: String,
                            object: String,
                            parameter: String,
                            alternative: String,
                            encoded: String,
                            tag: Option<String>|
         -> Result<()> {
            rows.push(ParameterValueRow {
                class,
                object,
                parameter,
                alternative,
                value: from_database(&encoded, tag.as_deref())?,
            });
            Ok(())
        };

        match scenario {
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT c.name, o.name, p.name, a.name, v.value, v.type
                         FROM parameter_value v
                         JOIN parameter_definition p ON p.id = v.parameter_id
                         JOIN object_class c ON c.id = p.class_id
                         JOIN object o ON o.id = v.object_id
                         JOIN alternative a ON a.id = v.alternative_id
                         ORDER BY c.name, o.name, p.name, a.name",
                    )
                    .map_err(|e| SpindleError::Database(e.to_string()))?;
                let mut raw = stmt
                    .query([])
                    .map_err(|e| SpindleError::Database(e.to_string()))?;
                while let Some(row) = raw.next().map_err(|e| SpindleError::Database(e.to_string()))? {
                    push_row(
                        row.get(0).map_err(|e| SpindleError::Database(e.to_string()))?,
                        row.get(1).map_err(|e| SpindleError::Database(e.to_string()))?,
                        row.get(2).map_err(|e| SpindleError::Database(e.to_string()))?,
                        row.get(3).map_err(|e| SpindleError::Database(e.to_string()))?,
                        row.get(4).map_err(|e| SpindleError::Database(e.to_string()))?,
                        row.get(5).map_err(|e| SpindleError::Database(e.to_string()))?,
                    )?;
                }
            }
            Some(scenario) => {
                // Highest scenario rank shadows lower ranks per
                // (class, object, parameter).
                let mut stmt = conn
                    .prepare(
                        "SELECT c.name, o.name, p.name, a.name, v.value, v.type, sa.rank
                         FROM parameter_value v
                         JOIN parameter_definition p ON p.id = v.parameter_id
                         JOIN object_class c ON c.id = p.class_id
                         JOIN object o ON o.id = v.object_id
                         JOIN alternative a ON a.id = v.alternative_id
                         JOIN scenario_alternative sa ON sa.alternative_id = a.id
                         JOIN scenario s ON s.id = sa.scenario_id
                         WHERE s.name = ?1
                         ORDER BY c.name, o.name, p.name, sa.rank",
                    )
                    .map_err(|e| SpindleError::Database(e.to_string()))?;
                let mut raw = stmt
                    .query(params![scenario])
                    .map_err(|e| SpindleError::Database(e.to_string()))?;
                let mut shadowed: Vec<ParameterValueRow> = Vec::new();
                while let Some(row) = raw.next().map_err(|e| SpindleError::Database(e.to_string()))? {
                    let candidate = ParameterValueRow {
                        class: row.get(0).map_err(|e| SpindleError::Database(e.to_string()))?,
                        object: row.get(1).map_err(|e| SpindleError::Database(e.to_string()))?,
                        parameter: row.get(2).map_err(|e| SpindleError::Database(e.to_string()))?,
                        alternative: row.get(3).map_err(|e| SpindleError::Database(e.to_string()))?,
                        value: {
                            let encoded: String =
                                row.get(4).map_err(|e| SpindleError::Database(e.to_string()))?;
                            let tag: Option<String> =
                                row.get(5).map_err(|e| SpindleError::Database(e.to_string()))?;
                            from_database(&encoded, tag.as_deref())?
                        },
                    };
                    // Rank order within the key: replace keeps the highest.
                    if let Some(existing) = shadowed.iter_mut().find(|r| {
                        r.class == candidate.class
                            && r.object == candidate.object
                            && r.parameter == candidate.parameter
                    }) {
                        *existing = candidate;
                    } else {
                        shadowed.push(candidate);
                    }
                }
                return Ok(shadowed);
            }
        }
        Ok(rows)
    }

    pub fn scenarios(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM scenario ORDER BY id")
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SpindleError::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        Ok(names)
    }

    pub fn alternatives(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM alternative ORDER BY id")
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SpindleError::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        Ok(names)
    }

    /// Every (scenario, alternative, rank) link, in scenario then rank order.
    pub fn scenario_alternative_links(&self) -> Result<Vec<(String, String, i64)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.name, a.name, sa.rank
                 FROM scenario_alternative sa
                 JOIN scenario s ON s.id = sa.scenario_id
                 JOIN alternative a ON a.id = sa.alternative_id
                 ORDER BY s.name, sa.rank",
            )
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        let links = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| SpindleError::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SpindleError::Database(e.to_string()))?;
        Ok(links)
    }

    pub fn commit_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM commit_record", [], |row| row.get(0))
            .optional()
            .map_err(|e| SpindleError::Database(e.to_string()))?
            .unwrap_or(0);
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ParameterDb {
        let db = ParameterDb::in_memory().unwrap();
        db.import_object_classes(&["Widget"]).unwrap();
        db.import_objects(&[("Widget", "spoon")]).unwrap();
        db.import_object_parameters(&[("Widget", "volume")]).unwrap();
        db
    }

    #[test]
    fn test_import_and_query() {
        let db = seeded();
        db.import_object_parameter_values(&[(
            "Widget",
            "spoon",
            "volume",
            "Base",
            ParameterValue::Float(1.0),
        )])
        .unwrap();
        let rows = db.parameter_value_rows(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, ParameterValue::Float(1.0));
        assert_eq!(rows[0].alternative, "Base");
    }

    #[test]
    fn test_replace_on_same_key() {
        let db = seeded();
        db.import_object_parameter_values(&[(
            "Widget",
            "spoon",
            "volume",
            "Base",
            ParameterValue::Float(1.0),
        )])
        .unwrap();
        db.import_object_parameter_values(&[(
            "Widget",
            "spoon",
            "volume",
            "Base",
            ParameterValue::Float(99.0),
        )])
        .unwrap();
        let rows = db.parameter_value_rows(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, ParameterValue::Float(99.0));
    }

    #[test]
    fn test_scenario_narrowing() {
        let db = seeded();
        db.import_alternatives(&["alternative"]).unwrap();
        db.import_object_parameter_values(&[
            ("Widget", "spoon", "volume", "Base", ParameterValue::Float(1.0)),
            ("Widget", "spoon", "volume", "alternative", ParameterValue::Float(2.0)),
        ])
        .unwrap();
        db.import_scenarios(&["scenario"]).unwrap();
        db.import_scenario_alternatives(&[("scenario", "alternative", 1)])
            .unwrap();

        let rows = db.parameter_value_rows(Some("scenario")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alternative, "alternative");
        assert_eq!(rows[0].value, ParameterValue::Float(2.0));
    }

    #[test]
    fn test_scenario_rank_shadowing() {
        let db = seeded();
        db.import_alternatives(&["low", "high"]).unwrap();
        db.import_object_parameter_values(&[
            ("Widget", "spoon", "volume", "low", ParameterValue::Float(1.0)),
            ("Widget", "spoon", "volume", "high", ParameterValue::Float(9.0)),
        ])
        .unwrap();
        db.import_scenarios(&["both"]).unwrap();
        db.import_scenario_alternatives(&[("both", "low", 1), ("both", "high", 2)])
            .unwrap();

        let rows = db.parameter_value_rows(Some("both")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alternative, "high");
    }

    #[test]
    fn test_commit_session() {
        let db = seeded();
        assert!(matches!(
            db.commit_session("empty").unwrap_err(),
            SpindleError::DatabaseCommitFailed(_)
        ));
        db.import_alternatives(&["x"]).unwrap();
        db.commit_session("add x").unwrap();
        assert_eq!(db.commit_count().unwrap(), 1);
        // Idempotent import leaves nothing pending
        db.import_alternatives(&["x"]).unwrap();
        assert!(db.commit_session("again").is_err());
    }

    #[test]
    fn test_create_mapping_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store/Data.sqlite");
        let url = format!("sqlite://{}", path.display());

        assert!(ParameterDb::create_mapping(&url, false).is_err());
        let db = ParameterDb::create_mapping(&url, true).unwrap();
        db.import_object_classes(&["Widget"]).unwrap();
        drop(db);

        let reopened = ParameterDb::create_mapping(&url, false).unwrap();
        let classes: Vec<String> = {
            let conn = reopened.lock().unwrap();
            let mut stmt = conn.prepare("SELECT name FROM object_class").unwrap();
            let names = stmt
                .query_map([], |row| row.get(0))
                .unwrap()
                .collect::<std::result::Result<Vec<String>, _>>()
                .unwrap();
            names
        };
        assert_eq!(classes, vec!["Widget"]);
    }

    #[test]
    fn test_url_to_path() {
        assert_eq!(
            url_to_path("sqlite:///tmp/a.sqlite").unwrap(),
            PathBuf::from("/tmp/a.sqlite")
        );
        assert!(url_to_path("sqlite::memory:").is_err());
        assert_eq!(url_to_path("/plain/path.sqlite").unwrap(), PathBuf::from("/plain/path.sqlite"));
    }
}
