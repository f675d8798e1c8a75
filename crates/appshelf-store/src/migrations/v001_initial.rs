//! v001 -- Initial schema creation.
//!
//! Creates the `app_metadata` table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- App metadata
-- ----------------------------------------------------------------
-- AUTOINCREMENT keeps ids from being reused after a delete, which
-- matters because artifacts on disk are keyed by id.
CREATE TABLE IF NOT EXISTS app_metadata (
    id              INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    app_name        TEXT NOT NULL,                -- <= 256 chars
    package_name    TEXT NOT NULL UNIQUE,         -- <= 512 chars
    version_code    INTEGER NOT NULL,
    version_name    TEXT NOT NULL,                -- <= 32 chars
    min_api_level   INTEGER NOT NULL,
    max_api_level   INTEGER,                      -- most apps don't declare it
    apk_file_size   INTEGER NOT NULL,             -- bytes
    added_at        TEXT NOT NULL,                -- RFC-3339
    last_updated_at TEXT NOT NULL                 -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_app_metadata_app_name ON app_metadata(app_name);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
