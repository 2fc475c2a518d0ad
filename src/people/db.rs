//! `SQLite` table the import job writes into.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, params};

use super::Person;

const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS people (
    person_id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL
);
";

/// Shared handle on the `people` database.
///
/// Clones share one connection, so the writer and the report listener see the
/// same rows.
#[derive(Clone)]
pub struct PeopleDb {
    conn: Arc<Mutex<Connection>>,
}

impl PeopleDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open people db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("people db lock poisoned"))
    }

    /// Insert `people` in one transaction: all rows land or none do.
    pub fn insert_batch(&self, people: &[Person]) -> Result<()> {
        self.insert_batch_unless(people, &AtomicBool::new(false))
    }

    /// Like [`insert_batch`](Self::insert_batch), but rolls back instead of
    /// committing once `abandoned` is set.
    pub fn insert_batch_unless(&self, people: &[Person], abandoned: &AtomicBool) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO people (first_name, last_name) VALUES (?1, ?2)")?;
            for person in people {
                stmt.execute(params![person.first_name, person.last_name])?;
            }
        }
        if abandoned.load(Ordering::SeqCst) {
            bail!("insert of {} people abandoned before commit", people.len());
        }
        tx.commit()?;
        Ok(())
    }

    /// Every stored person in insertion order.
    pub fn all(&self) -> Result<Vec<Person>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT first_name, last_name FROM people ORDER BY person_id")?;
        let people = stmt
            .query_map([], |row| {
                Ok(Person {
                    first_name: row.get(0)?,
                    last_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(people)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_insert_keeps_order() {
        let db = PeopleDb::in_memory().unwrap();
        db.insert_batch(&[Person::new("JILL", "DOE"), Person::new("JOE", "DOE")])
            .unwrap();
        db.insert_batch(&[Person::new("JANE", "DOE")]).unwrap();

        let names: Vec<String> = db.all().unwrap().into_iter().map(|p| p.first_name).collect();
        assert_eq!(names, vec!["JILL", "JOE", "JANE"]);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn abandoned_batch_is_rolled_back() {
        let db = PeopleDb::in_memory().unwrap();
        let err = db
            .insert_batch_unless(&[Person::new("JILL", "DOE")], &AtomicBool::new(true))
            .unwrap_err();

        assert!(err.to_string().contains("abandoned"));
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("people.db");
        PeopleDb::open(&path)
            .unwrap()
            .insert_batch(&[Person::new("JOHN", "DOE")])
            .unwrap();

        let reopened = PeopleDb::open(&path).unwrap();
        assert_eq!(reopened.all().unwrap(), vec![Person::new("JOHN", "DOE")]);
    }
}
