//! Core domain types: notes, their fields and tags, cards, and change sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag that marks problem cards; never carried over by merges or copies.
pub const LEECH_TAG: &str = "leech";

/// Tag the host uses to flag notes for review; dropped on duplication.
pub const MARKED_TAG: &str = "marked";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

id_type!(
    /// Note identifier (millisecond timestamp at creation, like the host).
    NoteId
);
id_type!(
    /// Card identifier.
    CardId
);
id_type!(
    /// Deck identifier.
    DeckId
);

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

/// A named text slot within a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A note: stable id, ordered fields fixed by its notetype, and a tag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    /// Globally unique id used by the host for syncing.
    pub guid: String,
    /// Notetype name. Two notes of the same notetype share a field list.
    pub notetype: String,
    pub fields: Vec<Field>,
    /// Index into `fields` of the notetype's sort field.
    #[serde(default)]
    pub sort_field: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

impl Note {
    /// Create a note with a fresh guid and no tags.
    pub fn new(id: NoteId, notetype: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id,
            guid: uuid::Uuid::now_v7().simple().to_string(),
            notetype: notetype.into(),
            fields,
            sort_field: 0,
            tags: Vec::new(),
            modified: Utc::now(),
        }
    }

    /// Value of the named field, if the note has it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Value of the sort field, or `""` when the index is out of range.
    pub fn sort_field_value(&self) -> &str {
        self.fields
            .get(self.sort_field)
            .map(|f| f.value.as_str())
            .unwrap_or("")
    }

    /// Case-insensitive tag membership, matching the host.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| tag_eq(t, tag))
    }

    /// Add a tag unless an equal one (ignoring case) is already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| !tag_eq(t, tag));
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// Tag comparison used everywhere tags are matched.
pub fn tag_eq(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// Scheduling state of a card, ordered the way the host's browser lists them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

impl CardKind {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::New => 0,
            Self::Learning => 1,
            Self::Review => 2,
            Self::Relearning => 3,
        }
    }

    /// Unknown values are treated as new cards.
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Self::Learning,
            2 => Self::Review,
            3 => Self::Relearning,
            _ => Self::New,
        }
    }
}

/// A card belonging to a note. Only used for ordering and duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    #[serde(default)]
    pub kind: CardKind,
    #[serde(default)]
    pub due: i64,
    /// Current interval in days.
    #[serde(default)]
    pub interval: i64,
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

/// A note to be created together with its cards.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub note: Note,
    pub cards: Vec<Card>,
}

/// Mutations applied to the collection as one transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub updated: Vec<Note>,
    pub removed: Vec<NoteId>,
    pub added: Vec<NewNote>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty() && self.added.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_note() -> Note {
        Note::new(
            NoteId(1),
            "Basic",
            vec![Field::new("Front", "question"), Field::new("Back", "answer")],
        )
    }

    #[test]
    fn note_id_roundtrip() {
        let id: NoteId = " 1700000000000 ".parse().expect("parse NoteId");
        assert_eq!(id, NoteId(1_700_000_000_000));
        assert_eq!(id.to_string(), "1700000000000");
    }

    #[test]
    fn field_access() {
        let note = sample_note();
        assert_eq!(note.get("Front"), Some("question"));
        assert_eq!(note.get("Extra"), None);
        assert!(note.has_field("Back"));
        assert_eq!(note.sort_field_value(), "question");
    }

    #[test]
    fn tags_have_set_semantics() {
        let mut note = sample_note();
        note.add_tag("verb");
        note.add_tag("Verb");
        note.add_tag("leech");
        assert_eq!(note.tags, vec!["verb", "leech"]);
        note.remove_tag("LEECH");
        assert!(!note.has_tag("leech"));
    }

    #[test]
    fn note_serialization() {
        let note = sample_note();
        let json = serde_json::to_string(&note).expect("serialize");
        let parsed: Note = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, note);
    }

    #[test]
    fn card_kind_ordering() {
        assert!(CardKind::New < CardKind::Review);
        assert_eq!(CardKind::from_i64(2), CardKind::Review);
        assert_eq!(CardKind::from_i64(42), CardKind::New);
        assert_eq!(CardKind::Relearning.as_i64(), 3);
    }
}
