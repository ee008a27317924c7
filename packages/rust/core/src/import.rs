//! JSON import of notes and cards into a collection.
//!
//! ```json
//! { "notes": [ { "notetype": "Basic",
//!                "fields": [{ "name": "Front", "value": "cat" }],
//!                "tags": ["animal"],
//!                "cards": [{ "deck_id": 1, "kind": "review", "due": 3 }] } ] }
//! ```
//!
//! Missing ids are allocated like the host does; missing guids are generated.

use serde::Deserialize;
use tracing::{info, instrument};

use notemerge_shared::{
    Card, CardId, CardKind, ChangeSet, DeckId, Field, NewNote, Note, NoteId, NoteMergeError,
    Result,
};
use notemerge_storage::Collection;

/// Root of an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportFile {
    pub notes: Vec<ImportNote>,
}

/// A note as written in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportNote {
    #[serde(default)]
    pub id: Option<NoteId>,
    #[serde(default)]
    pub guid: Option<String>,
    pub notetype: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub sort_field: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub cards: Vec<ImportCard>,
}

/// A card as written in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportCard {
    #[serde(default)]
    pub id: Option<CardId>,
    pub deck_id: DeckId,
    #[serde(default)]
    pub kind: CardKind,
    #[serde(default)]
    pub due: i64,
    #[serde(default)]
    pub interval: i64,
}

/// Parse the contents of an import file.
pub fn parse_import(json: &str) -> Result<ImportFile> {
    serde_json::from_str(json)
        .map_err(|e| NoteMergeError::parse(format!("invalid import file: {e}")))
}

/// Add every note of `file` to the collection in one transaction.
/// Returns the ids of the imported notes.
#[instrument(skip_all, fields(notes = file.notes.len()))]
pub async fn import_notes(collection: &Collection, file: &ImportFile) -> Result<Vec<NoteId>> {
    let mut next_note = collection.next_note_id().await?.0;
    let mut next_card = collection.next_card_id().await?.0;
    let mut changes = ChangeSet::default();

    for entry in &file.notes {
        if entry.fields.is_empty() {
            return Err(NoteMergeError::validation(format!(
                "note of type '{}' has no fields",
                entry.notetype
            )));
        }

        let id = entry.id.unwrap_or_else(|| {
            let id = NoteId(next_note);
            next_note += 1;
            id
        });

        let mut note = Note::new(id, entry.notetype.clone(), entry.fields.clone());
        if let Some(guid) = &entry.guid {
            note.guid = guid.clone();
        }
        note.sort_field = entry.sort_field.min(entry.fields.len() - 1);
        for tag in &entry.tags {
            note.add_tag(tag);
        }

        let cards = entry
            .cards
            .iter()
            .map(|c| Card {
                id: c.id.unwrap_or_else(|| {
                    let id = CardId(next_card);
                    next_card += 1;
                    id
                }),
                note_id: id,
                deck_id: c.deck_id,
                kind: c.kind,
                due: c.due,
                interval: c.interval,
            })
            .collect();

        changes.added.push(NewNote { note, cards });
    }

    let label = format!("Import {} notes", changes.added.len());
    collection.apply(&label, &changes).await?;
    info!(count = changes.added.len(), "notes imported");

    Ok(changes.added.iter().map(|n| n.note.id).collect())
}
