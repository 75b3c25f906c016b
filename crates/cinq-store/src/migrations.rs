//! Store migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.
//! Upgrades are additive only: new tables, columns, and indexes may be
//! introduced on a version bump, but no destructive path is defined.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running store migrations");

    if current_version < 1 {
        migrate_v1_initial_schema(conn)?;
    }
    if current_version < 2 {
        migrate_v2_sent_log(conn)?;
    }
    if current_version < 3 {
        migrate_v3_contact_display_names(conn)?;
    }

    info!("Store migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: Initial schema - queued messages, pending actions, contact cache,
/// sync metadata.
fn migrate_v1_initial_schema(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: initial schema");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queued_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_ref TEXT NOT NULL UNIQUE,
            contact_id TEXT NOT NULL,
            content TEXT,
            is_ping INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            retries INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_queued_messages_status
            ON queued_messages(status);
        ",
    )?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pending_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            body TEXT,
            priority INTEGER NOT NULL DEFAULT 5,
            status TEXT NOT NULL DEFAULT 'pending',
            retries INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pending_actions_status
            ON pending_actions(status);
        CREATE INDEX IF NOT EXISTS idx_pending_actions_priority
            ON pending_actions(priority, id);
        ",
    )?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cached_contacts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            cached_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        ",
    )?;

    record_migration(conn, 1, "initial_schema")
}

/// V2: Sent log. Delivered messages move here instead of lingering in the
/// queue table, keeping the queue small while retaining history.
fn migrate_v2_sent_log(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v2: sent log");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sent_messages (
            id INTEGER PRIMARY KEY,
            client_ref TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            content TEXT,
            is_ping INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            sent_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sent_messages_sent_at
            ON sent_messages(sent_at);
        ",
    )?;

    record_migration(conn, 2, "sent_log")
}

/// V3: Contact display names, carried from the contacts payload.
fn migrate_v3_contact_display_names(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v3: contact display names");

    conn.execute("ALTER TABLE cached_contacts ADD COLUMN display_name TEXT", [])?;

    record_migration(conn, 3, "contact_display_names")
}
