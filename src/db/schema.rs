//! Database schema and migrations for skyvault.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. The schema_version table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Users and their directory trees
    r#"
-- Users own exactly one root directory. root_dir_id is filled in by the
-- same transaction that inserts the user.
CREATE TABLE users (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL,
    email               TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password            TEXT,                    -- Argon2 hash, NULL for provider accounts
    picture             TEXT NOT NULL DEFAULT '',
    role                TEXT NOT NULL DEFAULT 'user',  -- 'user', 'manager', 'admin'
    max_storage_bytes   INTEGER NOT NULL,
    root_dir_id         INTEGER,
    deleted             INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_users_deleted ON users(deleted);

-- size is the aggregate of all confirmed files beneath the directory
CREATE TABLE directories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    parent_id   INTEGER REFERENCES directories(id),
    owner_id    INTEGER NOT NULL REFERENCES users(id),
    size        INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_directories_parent_id ON directories(parent_id);
CREATE INDEX idx_directories_owner_id ON directories(owner_id);
"#,
    // v2: Files
    r#"
-- Files in is_uploading = 1 are allocated but not yet charged to any
-- ancestor directory.
CREATE TABLE files (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    extension       TEXT NOT NULL DEFAULT '',
    parent_id       INTEGER NOT NULL REFERENCES directories(id),
    owner_id        INTEGER NOT NULL REFERENCES users(id),
    size            INTEGER NOT NULL,
    content_type    TEXT NOT NULL DEFAULT 'application/octet-stream',
    is_uploading    INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_files_parent_id ON files(parent_id);
CREATE INDEX idx_files_owner_id ON files(owner_id);
CREATE INDEX idx_files_uploading ON files(is_uploading, created_at);
"#,
    // v3: Durable session index
    r#"
-- Advisory per-user index of sessions. The expiring cache is authoritative
-- for validity; rows here may outlive their cache entry.
CREATE TABLE sessions (
    session_id  TEXT PRIMARY KEY,
    user_id     INTEGER NOT NULL REFERENCES users(id),
    root_dir_id INTEGER NOT NULL,
    auth_method TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

CREATE INDEX idx_sessions_user_id ON sessions(user_id);
CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
"#,
    // v4: Email verification codes
    r#"
-- One outstanding code per email; a code is spent by deleting its row.
CREATE TABLE one_time_codes (
    email       TEXT PRIMARY KEY COLLATE NOCASE,
    code        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

CREATE INDEX idx_one_time_codes_expires_at ON one_time_codes(expires_at);
"#,
];
