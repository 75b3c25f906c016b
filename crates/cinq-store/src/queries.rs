//! Query helpers for the four store collections and the sent log.
//!
//! Free functions over a borrowed connection, meant to run inside
//! [`Store::call`](crate::Store::call). Multi-record operations (the contact
//! cache replace and the sent-log move) open their own transaction; every
//! other write is a single atomic statement.

use crate::models::{
    CachedContact, DeliveryStatus, NewCachedContact, NewPendingAction, NewQueuedMessage,
    PendingAction, QueuedMessage, SentMessage, SyncMetaEntry,
};
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

// ==========================================
// Queued messages
// ==========================================

/// Insert a new message with `status = pending` and `retries = 0`.
pub fn insert_queued_message(
    conn: &Connection,
    message: &NewQueuedMessage,
) -> StoreResult<QueuedMessage> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO queued_messages (client_ref, contact_id, content, is_ping, status, retries, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)",
        params![
            message.client_ref,
            message.contact_id,
            message.content,
            message.is_ping,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_queued_message(conn, id)?
        .ok_or_else(|| StoreError::NotFound("queued message missing after insert".to_string()))
}

/// Get a queued message by local id.
pub fn get_queued_message(conn: &Connection, id: i64) -> StoreResult<Option<QueuedMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, client_ref, contact_id, content, is_ping, status, retries, last_error, created_at, updated_at
         FROM queued_messages WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], map_queued_message);
    match result {
        Ok(message) => Ok(Some(message)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All `pending` messages in insertion order (ascending id).
pub fn get_pending_messages(conn: &Connection) -> StoreResult<Vec<QueuedMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, client_ref, contact_id, content, is_ping, status, retries, last_error, created_at, updated_at
         FROM queued_messages WHERE status = 'pending' ORDER BY id",
    )?;

    let messages = stmt
        .query_map([], map_queued_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Quarantined messages (terminal `failed`), in insertion order.
pub fn get_quarantined_messages(conn: &Connection) -> StoreResult<Vec<QueuedMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, client_ref, contact_id, content, is_ping, status, retries, last_error, created_at, updated_at
         FROM queued_messages WHERE status = 'failed' ORDER BY id",
    )?;

    let messages = stmt
        .query_map([], map_queued_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Count of messages with `status = pending`.
pub fn count_pending_messages(conn: &Connection) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM queued_messages WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Count of quarantined messages.
pub fn count_quarantined_messages(conn: &Connection) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM queued_messages WHERE status = 'failed'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Transition a message's status, stamping `updated_at`.
///
/// `last_error`, when given, replaces the stored error; `bump_retries` adds
/// one failed attempt. Returns false if the id does not exist.
pub fn set_message_status(
    conn: &Connection,
    id: i64,
    status: DeliveryStatus,
    last_error: Option<&str>,
    bump_retries: bool,
) -> StoreResult<bool> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE queued_messages
         SET status = ?1,
             updated_at = ?2,
             retries = retries + ?3,
             last_error = COALESCE(?4, last_error)
         WHERE id = ?5",
        params![status.as_str(), now, i32::from(bump_retries), last_error, id],
    )?;
    Ok(count > 0)
}

/// Return a quarantined message to service: `pending`, zeroed retries,
/// cleared error. Returns false if the id does not exist.
pub fn requeue_message(conn: &Connection, id: i64) -> StoreResult<bool> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE queued_messages
         SET status = 'pending', retries = 0, last_error = NULL, updated_at = ?1
         WHERE id = ?2",
        params![now, id],
    )?;
    Ok(count > 0)
}

/// Reset rows stuck in `sending` back to `pending`.
///
/// Crash recovery: a process that died mid-pass leaves its in-flight item
/// marked `sending`; run this once at startup before the first pass.
pub fn reset_sending_messages(conn: &Connection) -> StoreResult<usize> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE queued_messages SET status = 'pending', updated_at = ?1 WHERE status = 'sending'",
        params![now],
    )?;
    Ok(count)
}

/// Hard-delete a queued message. Deleting a missing id is not an error.
pub fn delete_queued_message(conn: &Connection, id: i64) -> StoreResult<bool> {
    let count = conn.execute("DELETE FROM queued_messages WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Move a delivered message to the sent log and drop the queue row, in one
/// transaction. The queue never retains a `sent` row past this point.
pub fn complete_message(
    conn: &Connection,
    message: &QueuedMessage,
    sent_at: DateTime<Utc>,
) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO sent_messages (id, client_ref, contact_id, content, is_ping, created_at, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message.id,
            message.client_ref,
            message.contact_id,
            message.content,
            message.is_ping,
            message.created_at.to_rfc3339(),
            sent_at.to_rfc3339(),
        ],
    )?;
    tx.execute(
        "DELETE FROM queued_messages WHERE id = ?1",
        params![message.id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Most recent sent-log rows, newest first.
pub fn list_sent_messages(conn: &Connection, limit: i64) -> StoreResult<Vec<SentMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, client_ref, contact_id, content, is_ping, created_at, sent_at
         FROM sent_messages ORDER BY sent_at DESC, id DESC LIMIT ?1",
    )?;

    let messages = stmt
        .query_map(params![limit], |row| {
            Ok(SentMessage {
                id: row.get(0)?,
                client_ref: row.get(1)?,
                contact_id: row.get(2)?,
                content: row.get(3)?,
                is_ping: row.get(4)?,
                created_at: parse_datetime(row.get::<_, String>(5)?),
                sent_at: parse_datetime(row.get::<_, String>(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

// ==========================================
// Pending actions
// ==========================================

/// Insert a new action with `status = pending` and `retries = 0`.
pub fn insert_pending_action(
    conn: &Connection,
    action: &NewPendingAction,
) -> StoreResult<PendingAction> {
    let now = Utc::now().to_rfc3339();
    let body = action
        .body
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO pending_actions (kind, endpoint, method, body, priority, status, retries, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
        params![
            action.kind,
            action.endpoint,
            action.method,
            body,
            action.priority,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_pending_action(conn, id)?
        .ok_or_else(|| StoreError::NotFound("pending action missing after insert".to_string()))
}

/// Get an action by local id.
pub fn get_pending_action(conn: &Connection, id: i64) -> StoreResult<Option<PendingAction>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, endpoint, method, body, priority, status, retries, last_error, created_at
         FROM pending_actions WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], map_pending_action);
    match result {
        Ok(action) => Ok(Some(action)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All `pending` actions in drain order: ascending priority, then id.
pub fn get_pending_actions(conn: &Connection) -> StoreResult<Vec<PendingAction>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, endpoint, method, body, priority, status, retries, last_error, created_at
         FROM pending_actions WHERE status = 'pending' ORDER BY priority, id",
    )?;

    let actions = stmt
        .query_map([], map_pending_action)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(actions)
}

/// Count of actions with `status = pending`.
pub fn count_pending_actions(conn: &Connection) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM pending_actions WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Transition an action's status. Returns false if the id does not exist.
pub fn set_action_status(
    conn: &Connection,
    id: i64,
    status: DeliveryStatus,
    last_error: Option<&str>,
    bump_retries: bool,
) -> StoreResult<bool> {
    let count = conn.execute(
        "UPDATE pending_actions
         SET status = ?1,
             retries = retries + ?2,
             last_error = COALESCE(?3, last_error)
         WHERE id = ?4",
        params![status.as_str(), i32::from(bump_retries), last_error, id],
    )?;
    Ok(count > 0)
}

/// Hard-delete an action. Deleting a missing id is not an error.
pub fn delete_pending_action(conn: &Connection, id: i64) -> StoreResult<bool> {
    let count = conn.execute("DELETE FROM pending_actions WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ==========================================
// Contact cache
// ==========================================

/// Replace the whole contact cache with a fresh snapshot.
///
/// Clear-then-insert-all inside one transaction: readers see either the old
/// snapshot or the new one, never a mix.
pub fn replace_contacts(
    conn: &Connection,
    contacts: &[NewCachedContact],
) -> StoreResult<usize> {
    let cached_at = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM cached_contacts", [])?;
    for contact in contacts {
        tx.execute(
            "INSERT INTO cached_contacts (id, email, display_name, cached_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![contact.id, contact.email, contact.display_name, cached_at],
        )?;
    }
    tx.commit()?;
    Ok(contacts.len())
}

/// The current contact snapshot, ordered by email.
pub fn list_contacts(conn: &Connection) -> StoreResult<Vec<CachedContact>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, cached_at FROM cached_contacts ORDER BY email",
    )?;

    let contacts = stmt
        .query_map([], map_cached_contact)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(contacts)
}

/// Look up a cached contact by its unique email.
pub fn get_contact_by_email(conn: &Connection, email: &str) -> StoreResult<Option<CachedContact>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, cached_at FROM cached_contacts WHERE email = ?1",
    )?;

    let result = stmt.query_row(params![email], map_cached_contact);
    match result {
        Ok(contact) => Ok(Some(contact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==========================================
// Sync metadata
// ==========================================

/// Upsert a metadata key.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sync_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
        params![key, value, now],
    )?;
    Ok(())
}

/// Read a metadata key.
pub fn get_meta(conn: &Connection, key: &str) -> StoreResult<Option<SyncMetaEntry>> {
    let mut stmt =
        conn.prepare("SELECT key, value, updated_at FROM sync_meta WHERE key = ?1")?;

    let result = stmt.query_row(params![key], |row| {
        Ok(SyncMetaEntry {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: parse_datetime(row.get::<_, String>(2)?),
        })
    });
    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete a metadata key. Deleting a missing key is not an error.
pub fn delete_meta(conn: &Connection, key: &str) -> StoreResult<bool> {
    let count = conn.execute("DELETE FROM sync_meta WHERE key = ?1", params![key])?;
    Ok(count > 0)
}

// ==========================================
// Row mapping
// ==========================================

fn map_queued_message(row: &Row<'_>) -> rusqlite::Result<QueuedMessage> {
    Ok(QueuedMessage {
        id: row.get(0)?,
        client_ref: row.get(1)?,
        contact_id: row.get(2)?,
        content: row.get(3)?,
        is_ping: row.get(4)?,
        status: DeliveryStatus::from_str(&row.get::<_, String>(5)?),
        retries: row.get(6)?,
        last_error: row.get(7)?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn map_pending_action(row: &Row<'_>) -> rusqlite::Result<PendingAction> {
    let body: Option<String> = row.get(4)?;
    Ok(PendingAction {
        id: row.get(0)?,
        kind: row.get(1)?,
        endpoint: row.get(2)?,
        method: row.get(3)?,
        body: body.and_then(|raw| serde_json::from_str(&raw).ok()),
        priority: row.get(5)?,
        status: DeliveryStatus::from_str(&row.get::<_, String>(6)?),
        retries: row.get(7)?,
        last_error: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn map_cached_contact(row: &Row<'_>) -> rusqlite::Result<CachedContact> {
    Ok(CachedContact {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        cached_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

/// Parse an RFC 3339 timestamp, falling back to now on malformed data.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
