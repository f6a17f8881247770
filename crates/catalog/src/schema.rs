/// Logical schema of spec §6, realised on rusqlite. Created with
/// `IF NOT EXISTS` so opening an already-current database is a no-op; older
/// layouts are brought forward by [`crate::migration`].
pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS file_types (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    mime     TEXT NOT NULL,
    category TEXT NOT NULL,
    subtype  TEXT NOT NULL,
    UNIQUE(mime, category, subtype)
);

CREATE TABLE IF NOT EXISTS blobs (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    hash             TEXT NOT NULL UNIQUE,
    volume_id        INTEGER,
    offset           INTEGER,
    size_raw         INTEGER,
    size_compressed  INTEGER,
    compression_alg  TEXT,
    file_type_id     INTEGER REFERENCES file_types(id),
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    blob_id         INTEGER NOT NULL REFERENCES blobs(id),
    old_cumulus_id  INTEGER,
    expires_at      INTEGER,
    created_at      INTEGER NOT NULL,
    tags            TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_files_expires_at ON files(expires_at);
CREATE INDEX IF NOT EXISTS idx_files_old_cumulus_id ON files(old_cumulus_id);

CREATE TABLE IF NOT EXISTS volumes (
    id           INTEGER PRIMARY KEY,
    size_total   INTEGER NOT NULL DEFAULT 0,
    size_deleted INTEGER NOT NULL DEFAULT 0
);
";
