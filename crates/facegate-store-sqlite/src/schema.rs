//! SQL schema for the Facegate SQLite store.
//!
//! Executed once at connection startup. Older databases are first brought up
//! to date by the migration matching their `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Workers are deactivated, never deleted.
CREATE TABLE IF NOT EXISTS workers (
    worker_id      TEXT PRIMARY KEY,
    display_name   TEXT NOT NULL,
    active         INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    deactivated_at TEXT
);

-- One row per enrolled vector. `vector` holds AES-256-GCM ciphertext unless
-- `encryption` says plaintext. Encodings are deactivated, never deleted.
CREATE TABLE IF NOT EXISTS encodings (
    encoding_id TEXT PRIMARY KEY,
    worker_id   TEXT NOT NULL REFERENCES workers(worker_id),
    dimension   INTEGER NOT NULL,
    captured_at TEXT NOT NULL,
    encryption  TEXT NOT NULL,     -- JSON-encoded EncryptionState
    nonce       BLOB,              -- 96-bit GCM nonce; NULL when plaintext
    vector      BLOB NOT NULL,
    variant     TEXT NOT NULL DEFAULT 'default',
    quality     REAL,
    active         INTEGER NOT NULL DEFAULT 1,
    deactivated_at TEXT
);

-- Attendance events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS events (
    event_id       TEXT PRIMARY KEY,
    worker_id      TEXT NOT NULL REFERENCES workers(worker_id),
    kind           TEXT NOT NULL,      -- 'check_in' | 'check_out'
    occurred_at    TEXT NOT NULL,      -- ISO 8601 UTC
    occurred_at_us INTEGER NOT NULL,   -- same instant, for ordering
    confidence     REAL NOT NULL,
    origin         TEXT NOT NULL,      -- 'recognized' | 'session_timeout'
    evidence_photo TEXT,
    recorded_at    TEXT NOT NULL,
    dedup_bucket   INTEGER NOT NULL
);

-- An event withdrawn by a later correction.
CREATE TABLE IF NOT EXISTS event_voids (
    void_id     TEXT PRIMARY KEY,
    event_id    TEXT NOT NULL REFERENCES events(event_id),
    reason      TEXT,
    recorded_at TEXT NOT NULL,
    UNIQUE (event_id)
);

-- Single row rewritten by health checks to prove the file accepts writes.
CREATE TABLE IF NOT EXISTS heartbeat (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    checked_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS encodings_worker_idx ON encodings(worker_id);
CREATE INDEX IF NOT EXISTS events_worker_idx    ON events(worker_id, occurred_at_us);
CREATE INDEX IF NOT EXISTS events_time_idx      ON events(occurred_at_us);
CREATE INDEX IF NOT EXISTS events_dedup_idx     ON events(worker_id, kind, dedup_bucket);

PRAGMA user_version = 2;
";

/// Version 1 had no per-encoding deactivation.
pub const MIGRATE_V1: &str = "
ALTER TABLE encodings ADD COLUMN active INTEGER NOT NULL DEFAULT 1;
ALTER TABLE encodings ADD COLUMN deactivated_at TEXT;
";
