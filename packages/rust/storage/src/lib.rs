//! libSQL-backed note collection (offline mode).
//!
//! The [`Collection`] struct wraps a local database holding notes, their
//! cards, and a log of applied operations. Every mutation goes through
//! [`Collection::apply`], which writes a whole [`ChangeSet`] in a single
//! transaction and rolls it back if any statement fails.

mod migrations;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use notemerge_shared::{
    Card, CardId, CardKind, ChangeSet, DeckId, Field, NewNote, Note, NoteId, NoteMergeError,
    Result,
};
use tracing::{debug, info, instrument};

/// Primary storage handle wrapping a libSQL database.
pub struct Collection {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Summary of an applied [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReceipt {
    /// Row id in the operation log.
    pub op_id: i64,
    pub updated: usize,
    pub removed: usize,
    pub added: usize,
}

/// An entry of the operation log.
#[derive(Debug, Clone)]
pub struct OpRecord {
    pub id: i64,
    pub label: String,
    pub updated: i64,
    pub removed: i64,
    pub added: i64,
    pub applied_at: DateTime<Utc>,
}

impl Collection {
    /// Open or create a collection at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| NoteMergeError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(NoteMergeError::storage)?;

        let conn = db.connect().map_err(NoteMergeError::storage)?;

        let collection = Self {
            db,
            conn,
            readonly: false,
        };
        collection.run_migrations().await?;
        Ok(collection)
    }

    /// Open a collection at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(NoteMergeError::storage)?;

        let conn = db.connect().map_err(NoteMergeError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NoteMergeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NoteMergeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Note lookups
    // -----------------------------------------------------------------------

    /// Get a note by id.
    pub async fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, guid, notetype, fields_json, sort_field, tags_json, modified
                 FROM notes WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(NoteMergeError::storage)?;

        match rows.next().await.map_err(NoteMergeError::storage)? {
            Some(row) => Ok(Some(row_to_note(&row)?)),
            None => Ok(None),
        }
    }

    /// Fetch the notes for `ids`, in first-seen order and without repeats.
    ///
    /// Ids that no longer exist are skipped. With `has_field`, notes lacking
    /// that field are skipped too.
    pub async fn get_notes(&self, ids: &[NoteId], has_field: Option<&str>) -> Result<Vec<Note>> {
        let mut seen = HashSet::new();
        let mut notes = Vec::new();

        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.get_note(id).await? {
                Some(note) if has_field.is_none_or(|f| note.has_field(f)) => notes.push(note),
                Some(_) => debug!(%id, field = ?has_field, "note lacks field, skipping"),
                None => debug!(%id, "note not found, skipping"),
            }
        }
        Ok(notes)
    }

    /// List every note, ordered by id.
    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, guid, notetype, fields_json, sort_field, tags_json, modified
                 FROM notes ORDER BY id",
                params![],
            )
            .await
            .map_err(NoteMergeError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(NoteMergeError::storage)? {
            results.push(row_to_note(&row)?);
        }
        Ok(results)
    }

    /// Notes that have `field` and, when `search` is non-empty, contain it
    /// (case-insensitively) in any field.
    pub async fn find_notes(&self, search: &str, field: &str) -> Result<Vec<Note>> {
        let needle = search.trim().to_lowercase();
        let notes = self
            .list_notes()
            .await?
            .into_iter()
            .filter(|n| n.has_field(field))
            .filter(|n| {
                needle.is_empty()
                    || n.fields
                        .iter()
                        .any(|f| f.value.to_lowercase().contains(&needle))
            })
            .collect();
        Ok(notes)
    }

    // -----------------------------------------------------------------------
    // Card lookups
    // -----------------------------------------------------------------------

    /// Get a card by id.
    pub async fn get_card(&self, id: CardId) -> Result<Option<Card>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, note_id, deck_id, kind, due, ivl FROM cards WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(NoteMergeError::storage)?;

        match rows.next().await.map_err(NoteMergeError::storage)? {
            Some(row) => Ok(Some(row_to_card(&row)?)),
            None => Ok(None),
        }
    }

    /// Cards of a note, ordered by id.
    pub async fn cards_of_note(&self, note_id: NoteId) -> Result<Vec<Card>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, note_id, deck_id, kind, due, ivl FROM cards
                 WHERE note_id = ?1 ORDER BY id",
                params![note_id.0],
            )
            .await
            .map_err(NoteMergeError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(NoteMergeError::storage)? {
            results.push(row_to_card(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Id allocation
    // -----------------------------------------------------------------------

    /// First free note id: the current time in milliseconds, or one past the
    /// largest existing id if that is later.
    pub async fn next_note_id(&self) -> Result<NoteId> {
        Ok(NoteId(self.next_id("notes").await?))
    }

    /// First free card id, allocated like [`Self::next_note_id`].
    pub async fn next_card_id(&self) -> Result<CardId> {
        Ok(CardId(self.next_id("cards").await?))
    }

    async fn next_id(&self, table: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COALESCE(MAX(id), 0) FROM {table}"), params![])
            .await
            .map_err(NoteMergeError::storage)?;

        let max = match rows.next().await.map_err(NoteMergeError::storage)? {
            Some(row) => row.get::<i64>(0).map_err(NoteMergeError::storage)?,
            None => 0,
        };
        Ok(Utc::now().timestamp_millis().max(max + 1))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Apply `changes` atomically and record the operation under `label`.
    ///
    /// Updates to notes that no longer exist are skipped. Any failure rolls
    /// back the whole change set.
    #[instrument(skip(self, changes), fields(
        updated = changes.updated.len(),
        removed = changes.removed.len(),
        added = changes.added.len(),
    ))]
    pub async fn apply(&self, label: &str, changes: &ChangeSet) -> Result<OpReceipt> {
        self.check_writable()?;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(NoteMergeError::storage)?;

        match write_changes(&tx, label, changes).await {
            Ok(receipt) => {
                tx.commit().await.map_err(NoteMergeError::storage)?;
                info!(op_id = receipt.op_id, label, "operation applied");
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    debug!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Most recent operations, newest first.
    pub async fn recent_ops(&self, limit: u32) -> Result<Vec<OpRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, label, updated, removed, added, applied_at
                 FROM op_log ORDER BY id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(NoteMergeError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(NoteMergeError::storage)? {
            results.push(OpRecord {
                id: row.get::<i64>(0).map_err(NoteMergeError::storage)?,
                label: row.get::<String>(1).map_err(NoteMergeError::storage)?,
                updated: row.get::<i64>(2).map_err(NoteMergeError::storage)?,
                removed: row.get::<i64>(3).map_err(NoteMergeError::storage)?,
                added: row.get::<i64>(4).map_err(NoteMergeError::storage)?,
                applied_at: parse_timestamp(
                    &row.get::<String>(5).map_err(NoteMergeError::storage)?,
                )?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Transaction body
// ---------------------------------------------------------------------------

async fn write_changes(conn: &Connection, label: &str, changes: &ChangeSet) -> Result<OpReceipt> {
    let mut updated = 0;
    for note in &changes.updated {
        let affected = conn
            .execute(
                "UPDATE notes SET fields_json = ?1, tags_json = ?2, modified = ?3 WHERE id = ?4",
                params![
                    to_json(&note.fields)?,
                    to_json(&note.tags)?,
                    note.modified.to_rfc3339(),
                    note.id.0,
                ],
            )
            .await
            .map_err(NoteMergeError::storage)?;
        if affected == 0 {
            debug!(id = %note.id, "note vanished before update, skipping");
        } else {
            updated += 1;
        }
    }

    let mut removed = 0;
    for id in &changes.removed {
        conn.execute("DELETE FROM cards WHERE note_id = ?1", params![id.0])
            .await
            .map_err(NoteMergeError::storage)?;
        let affected = conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id.0])
            .await
            .map_err(NoteMergeError::storage)?;
        removed += affected as usize;
    }

    for new in &changes.added {
        insert_note(conn, new).await?;
    }
    let added = changes.added.len();

    conn.execute(
        "INSERT INTO op_log (label, updated, removed, added, applied_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            label,
            updated as i64,
            removed as i64,
            added as i64,
            Utc::now().to_rfc3339(),
        ],
    )
    .await
    .map_err(NoteMergeError::storage)?;

    Ok(OpReceipt {
        op_id: conn.last_insert_rowid(),
        updated,
        removed,
        added,
    })
}

async fn insert_note(conn: &Connection, new: &NewNote) -> Result<()> {
    let note = &new.note;
    conn.execute(
        "INSERT INTO notes (id, guid, notetype, fields_json, sort_field, tags_json, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            note.id.0,
            note.guid.as_str(),
            note.notetype.as_str(),
            to_json(&note.fields)?,
            note.sort_field as i64,
            to_json(&note.tags)?,
            note.modified.to_rfc3339(),
        ],
    )
    .await
    .map_err(NoteMergeError::storage)?;

    for card in &new.cards {
        conn.execute(
            "INSERT INTO cards (id, note_id, deck_id, kind, due, ivl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                card.id.0,
                note.id.0,
                card.deck_id.0,
                card.kind.as_i64(),
                card.due,
                card.interval,
            ],
        )
        .await
        .map_err(NoteMergeError::storage)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(NoteMergeError::storage)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NoteMergeError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`Note`].
fn row_to_note(row: &libsql::Row) -> Result<Note> {
    let fields_json: String = row.get(3).map_err(NoteMergeError::storage)?;
    let fields: Vec<Field> = serde_json::from_str(&fields_json)
        .map_err(|e| NoteMergeError::parse(format!("corrupt fields column: {e}")))?;
    let tags_json: String = row.get(5).map_err(NoteMergeError::storage)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| NoteMergeError::parse(format!("corrupt tags column: {e}")))?;

    Ok(Note {
        id: NoteId(row.get::<i64>(0).map_err(NoteMergeError::storage)?),
        guid: row.get::<String>(1).map_err(NoteMergeError::storage)?,
        notetype: row.get::<String>(2).map_err(NoteMergeError::storage)?,
        fields,
        sort_field: row.get::<i64>(4).map_err(NoteMergeError::storage)?.max(0) as usize,
        tags,
        modified: parse_timestamp(&row.get::<String>(6).map_err(NoteMergeError::storage)?)?,
    })
}

/// Convert a database row to a [`Card`].
fn row_to_card(row: &libsql::Row) -> Result<Card> {
    Ok(Card {
        id: CardId(row.get::<i64>(0).map_err(NoteMergeError::storage)?),
        note_id: NoteId(row.get::<i64>(1).map_err(NoteMergeError::storage)?),
        deck_id: DeckId(row.get::<i64>(2).map_err(NoteMergeError::storage)?),
        kind: CardKind::from_i64(row.get::<i64>(3).map_err(NoteMergeError::storage)?),
        due: row.get::<i64>(4).map_err(NoteMergeError::storage)?,
        interval: row.get::<i64>(5).map_err(NoteMergeError::storage)?,
    })
}
