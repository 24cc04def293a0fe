use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "roster.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    // One row per storage key; values are opaque JSON text.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_stamped_store_and_reopens() {
        let dir = std::env::temp_dir().join(format!("rosterd-db-{}", uuid::Uuid::new_v4()));
        let conn = open_db(&dir).expect("open");
        conn.execute(
            "INSERT INTO kv_store(key, value, updated_at) VALUES('k', '[]', '2024-03-05T00:00:00Z')",
            [],
        )
        .expect("insert with stamp");
        drop(conn);

        let conn = open_db(&dir).expect("reopen");
        let stamp: Option<String> = conn
            .query_row("SELECT updated_at FROM kv_store WHERE key = 'k'", [], |r| r.get(0))
            .expect("row");
        assert_eq!(stamp.as_deref(), Some("2024-03-05T00:00:00Z"));
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }
}
