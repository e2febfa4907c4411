//! Schema steps for the sample school store.
//!
//! Each step runs inside the migration transaction and the schema version
//! (`PRAGMA user_version`) is its 1-based position in `STEPS`. Append only.

use crate::db::{ensure_entity_table, DbError, DbResult};
use crate::model::entity::Entity;
use crate::model::school::{ClassRoom, Student, Teacher};
use log::{debug, info};
use rusqlite::{Connection, Transaction};
use std::time::Instant;

type Step = fn(&Transaction<'_>) -> DbResult<()>;

const STEPS: &[(&str, Step)] = &[("school_documents", create_school_documents)];

/// Schema version this build migrates to.
pub fn latest_version() -> u32 {
    u32::try_from(STEPS.len()).unwrap_or(u32::MAX)
}

/// Runs every step past the stored version in one transaction.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }
    if from == latest {
        debug!("event=db_migrate module=db status=skipped version={}", from);
        return Ok(());
    }

    let started_at = Instant::now();
    let tx = conn.transaction()?;
    for (version, (name, step)) in (1u32..).zip(STEPS).skip(from as usize) {
        step(&tx)?;
        tx.pragma_update(None, "user_version", version)?;
        debug!(
            "event=db_migrate_step module=db status=ok version={} step={}",
            version, name
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} duration_ms={}",
        from,
        latest,
        started_at.elapsed().as_millis()
    );
    Ok(())
}

fn create_school_documents(tx: &Transaction<'_>) -> DbResult<()> {
    for kind in [Teacher::KIND, Student::KIND, ClassRoom::KIND] {
        ensure_entity_table(tx, kind)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version};
    use crate::model::entity::Entity;
    use crate::model::school::{ClassRoom, Student, Teacher};
    use rusqlite::Connection;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn tables_follow_entity_kinds() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        let mut expected = vec![
            ClassRoom::KIND.to_string(),
            Student::KIND.to_string(),
            Teacher::KIND.to_string(),
        ];
        expected.sort();
        assert_eq!(table_names(&conn), expected);
    }

    #[test]
    fn second_run_leaves_version_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        apply_migrations(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, latest_version());
    }
}
