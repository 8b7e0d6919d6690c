//! Table definitions.

use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS commits (
    hash          BLOB PRIMARY KEY,
    parent_hashes BLOB NOT NULL,
    seq           INTEGER NOT NULL,
    data          BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS contents (
    content_id TEXT NOT NULL,
    version    BLOB NOT NULL,
    data       BLOB NOT NULL,
    PRIMARY KEY (content_id, version)
);
CREATE TABLE IF NOT EXISTS refs (
    name       TEXT PRIMARY KEY,
    hash       BLOB NOT NULL,
    generation INTEGER NOT NULL,
    data       BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS key_lists (
    commit_hash BLOB PRIMARY KEY,
    data        BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS global_state (
    content_id TEXT PRIMARY KEY,
    data       BLOB NOT NULL
);
";

/// Tables in deletion order for an erase.
pub(crate) const TABLES: &[&str] = &["refs", "global_state", "key_lists", "contents", "commits"];

pub(crate) fn setup(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
