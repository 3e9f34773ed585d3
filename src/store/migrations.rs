//! Idempotent schema loader

use crate::pipeline::error::{PipelineError, PipelineResult};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Run schema migrations from SQL files
///
/// Reads every `.sql` file in `schema_dir`, sorted by file name
/// (`00_`, `01_`, ...), and executes each one as a batch. Files must use
/// `IF NOT EXISTS` so the loader can run on every start.
///
/// ```no_run
/// use rankboard::store::run_schema_migrations;
///
/// let mut conn = rusqlite::Connection::open("rankboard.db")?;
/// run_schema_migrations(&mut conn, "sql")?;
/// # Ok::<(), rankboard::PipelineError>(())
/// ```
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> PipelineResult<()> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(PipelineError::config(format!(
            "schema directory not found: {}",
            schema_dir
        )));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;

        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_migrations_are_idempotent() {
        let schema_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");
        let mut conn = Connection::open_in_memory().unwrap();

        run_schema_migrations(&mut conn, schema_dir).unwrap();
        run_schema_migrations(&mut conn, schema_dir).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('asset_class', 'product', 'price_record', 'news_headline', 'news_release')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_files_run_in_name_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("01_child.sql"), "CREATE TABLE IF NOT EXISTS child (id INTEGER REFERENCES parent(id));").unwrap();
        fs::write(dir.path().join("00_parent.sql"), "CREATE TABLE IF NOT EXISTS parent (id INTEGER PRIMARY KEY);").unwrap();
        fs::write(dir.path().join("notes.txt"), "not sql").unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        run_schema_migrations(&mut conn, dir.path().to_str().unwrap()).unwrap();

        conn.execute("INSERT INTO parent (id) VALUES (1)", []).unwrap();
        conn.execute("INSERT INTO child (id) VALUES (1)", []).unwrap();
    }

    #[test]
    fn test_missing_schema_dir() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = run_schema_migrations(&mut conn, "/nonexistent/schema").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
