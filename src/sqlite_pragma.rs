//! SQLite connection tuning applied to every store connection

use rusqlite::Connection;
use std::time::Duration;

/// Apply connection pragmas
///
/// - `foreign_keys = ON`: protect-on-delete for entity tables is enforced
///   by SQLite itself, it is off by default per connection
/// - `journal_mode = WAL` and `synchronous = NORMAL` for batch imports
/// - 5s busy timeout so a report run does not fail on a held write lock
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // journal_mode answers with the resulting mode ("memory" for in-memory databases)
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    log::debug!("📊 SQLite pragmas applied (foreign_keys=ON, journal_mode={})", mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_optimized_pragmas(&conn).unwrap();

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
