//! Schema versioning for the SQLite document store.
//!
//! The applied version lives in `PRAGMA user_version`. Each `NNN_name.sql`
//! file in the migrations directory with `NNN` above that version is run in
//! its own transaction, which also bumps `user_version`.

use rusqlite::Connection;
use std::fs;
use std::path::Path;

use crate::error::{ComicdeskError, Result};

#[derive(Debug)]
struct SchemaStep {
    version: u32,
    file_name: String,
    sql: String,
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// `003_units.sql` -> 3
fn step_version(file_name: &str) -> Result<u32> {
    file_name
        .split_once('_')
        .and_then(|(prefix, _)| prefix.parse().ok())
        .ok_or_else(|| {
            ComicdeskError::Config(format!(
                "Schema file '{}' must be named NNN_description.sql",
                file_name
            ))
        })
}

fn read_steps(dir: &Path) -> Result<Vec<SchemaStep>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ComicdeskError::Config(format!("Cannot read migrations directory {}: {}", dir.display(), e))
    })?;

    let mut steps = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
            continue;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        steps.push(SchemaStep {
            version: step_version(&file_name)?,
            sql: fs::read_to_string(&path)?,
            file_name,
        });
    }
    steps.sort_by_key(|step| step.version);

    if let Some(pair) = steps.windows(2).find(|pair| pair[0].version == pair[1].version) {
        return Err(ComicdeskError::Config(format!(
            "Schema files {} and {} share version {}",
            pair[0].file_name, pair[1].file_name, pair[0].version
        )));
    }
    Ok(steps)
}

/// Bring the document store schema up to the newest file in `dir`
pub fn run_migrations(conn: &mut Connection, dir: &Path) -> Result<()> {
    let current = schema_version(conn)?;
    let pending: Vec<SchemaStep> = read_steps(dir)?
        .into_iter()
        .filter(|step| step.version > current)
        .collect();

    if pending.is_empty() {
        log::debug!("Document store schema at version {}", current);
        return Ok(());
    }

    for step in pending {
        log::info!("Upgrading document store schema to version {} ({})", step.version, step.file_name);
        let tx = conn.transaction()?;
        tx.execute_batch(&step.sql).map_err(|e| {
            ComicdeskError::Documents(format!("Schema file {} failed: {}", step.file_name, e))
        })?;
        tx.pragma_update(None, "user_version", step.version)?;
        tx.commit()?;
    }

    log::info!("Document store schema at version {}", schema_version(conn)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_bundled_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("catalog.db")).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        run_migrations(&mut conn, Path::new("migrations")).unwrap();
        run_migrations(&mut conn, Path::new("migrations")).unwrap();

        assert_eq!(table_names(&conn), vec!["documents".to_string()]);
        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_only_newer_files_run() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("schema");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("002_tags.sql"), "CREATE TABLE tags (name TEXT);").unwrap();
        fs::write(dir.join("001_docs.sql"), "CREATE TABLE docs (id TEXT);").unwrap();
        fs::write(dir.join("notes.txt"), "not sql").unwrap();

        let mut conn = Connection::open(temp_dir.path().join("catalog.db")).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        run_migrations(&mut conn, &dir).unwrap();
        assert_eq!(table_names(&conn), vec!["tags".to_string()]);
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_failed_file_keeps_previous_version() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("schema");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("001_docs.sql"), "CREATE TABLE docs (id TEXT);").unwrap();
        fs::write(dir.join("002_broken.sql"), "CREATE TABLE oops (;").unwrap();

        let mut conn = Connection::open(temp_dir.path().join("catalog.db")).unwrap();
        let result = run_migrations(&mut conn, &dir);

        assert!(matches!(result, Err(ComicdeskError::Documents(_))));
        assert_eq!(schema_version(&conn).unwrap(), 1);
        assert_eq!(table_names(&conn), vec!["docs".to_string()]);
    }

    #[test]
    fn test_bad_schema_file_names() {
        assert_eq!(step_version("010_units.sql").unwrap(), 10);
        assert!(matches!(step_version("units.sql"), Err(ComicdeskError::Config(_))));

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("schema");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("001_a.sql"), "").unwrap();
        fs::write(dir.join("001_b.sql"), "").unwrap();
        assert!(matches!(read_steps(&dir), Err(ComicdeskError::Config(_))));
    }

    #[test]
    fn test_missing_migrations_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("catalog.db")).unwrap();
        let result = run_migrations(&mut conn, &temp_dir.path().join("nope"));
        assert!(matches!(result, Err(ComicdeskError::Config(_))));
    }
}
