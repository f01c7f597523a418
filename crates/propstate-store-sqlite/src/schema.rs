//! SQL schema for the SQLite property store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per canonical record. Rows are never deleted; removal is a
-- terminal status.
CREATE TABLE IF NOT EXISTS properties (
    property_id           TEXT PRIMARY KEY,
    listing_id            TEXT UNIQUE,     -- external (MLS) id; NULL allowed
    address_sealed        TEXT,            -- encrypted envelope, never plaintext
    city                  TEXT,
    state                 TEXT,
    postal_code           TEXT,
    bedrooms              INTEGER,
    bathrooms             REAL,
    square_feet           INTEGER,
    property_type         TEXT,
    price                 REAL,
    description           TEXT,
    media                 TEXT NOT NULL DEFAULT '[]',  -- JSON array
    listing_agent         TEXT,
    listing_office        TEXT,
    source_url            TEXT,
    available_for_showing INTEGER,
    internal_notes        TEXT,
    status                TEXT NOT NULL,
    provenance            TEXT NOT NULL DEFAULT '{}',  -- JSON field -> {source, written_at}
    version               INTEGER NOT NULL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS status_transitions (
    property_id TEXT NOT NULL REFERENCES properties(property_id),
    seq         INTEGER NOT NULL,
    from_status TEXT,                -- NULL for the initial status
    to_status   TEXT NOT NULL,
    source      TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (property_id, seq)
);

CREATE INDEX IF NOT EXISTS properties_status_idx  ON properties(status);
CREATE INDEX IF NOT EXISTS properties_created_idx ON properties(created_at);

PRAGMA user_version = 1;
";
