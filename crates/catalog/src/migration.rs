use common::StoreResult;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

/// Brings an existing database forward to the current schema. Both steps
/// are idempotent no-ops against a database already created by
/// [`crate::schema::CREATE_TABLES`].
pub fn run(conn: &Connection) -> StoreResult<()> {
    migrate_file_types_unique(conn)?;
    migrate_tags_column(conn)?;
    Ok(())
}

/// If `file_types` still carries the older `UNIQUE(mime)` constraint,
/// rebuild it with `UNIQUE(mime, category, subtype)` (spec §4.3).
fn migrate_file_types_unique(conn: &Connection) -> StoreResult<()> {
    let table_sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'file_types'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let Some(table_sql) = table_sql else {
        return Ok(());
    };
    if table_sql.contains("category") {
        return Ok(());
    }

    info!("migrating file_types unique constraint to (mime, category, subtype)");
    conn.execute_batch(
        "BEGIN;
         ALTER TABLE file_types RENAME TO file_types_old;
         CREATE TABLE file_types (
             id       INTEGER PRIMARY KEY AUTOINCREMENT,
             mime     TEXT NOT NULL,
             category TEXT NOT NULL,
             subtype  TEXT NOT NULL,
             UNIQUE(mime, category, subtype)
         );
         INSERT INTO file_types (id, mime, category, subtype)
             SELECT id, mime, COALESCE(category, ''), COALESCE(subtype, '') FROM file_types_old;
         DROP TABLE file_types_old;
         COMMIT;",
    )?;
    Ok(())
}

/// Adds the `tags` column to `files` if an older database predates it.
fn migrate_tags_column(conn: &Connection) -> StoreResult<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(files)")?;
    let has_tags = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == "tags");
    drop(stmt);
    if !has_tags {
        info!("adding tags column to files");
        conn.execute("ALTER TABLE files ADD COLUMN tags TEXT NOT NULL DEFAULT ''", [])?;
    }
    Ok(())
}
