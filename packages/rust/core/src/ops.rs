//! Collection operations: merge selected cards, find and merge duplicates,
//! duplicate notes.
//!
//! Each operation reads what it needs from the [`Collection`], computes the
//! result with the pure engine, and applies it as one labelled transaction.

use std::collections::HashMap;

use tracing::{debug, info, instrument};

use notemerge_shared::{
    Card, CardId, CardKind, ChangeSet, DeckId, LEECH_TAG, MARKED_TAG, MergeConfig, NewNote,
    NormalizeOptions, Note, NoteId, NoteMergeError, Result, tag_eq,
};
use notemerge_storage::Collection;

use crate::dupes::{DuplicateGroup, group_duplicates};
use crate::merge::{MergeOptions, merge};
use crate::ordering::{SortOrder, Sorter};

/// Operation log label for merging selected cards.
pub const MERGE_SELECTED_LABEL: &str = "Merge fields of selected cards";

/// Operation log label for merging duplicate groups.
pub const MERGE_DUPLICATES_LABEL: &str = "Merge Duplicates";

/// Deck used for copies of notes that have no cards.
const DEFAULT_DECK: DeckId = DeckId(1);

// ---------------------------------------------------------------------------
// Results & progress
// ---------------------------------------------------------------------------

/// Result of a merge operation.
#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    /// Groups that were merged (1 for a selection).
    pub groups: usize,
    /// Notes that took part in a merge.
    pub notes_merged: usize,
    /// Notes written back.
    pub updated: usize,
    /// Notes deleted.
    pub removed: usize,
    /// Operation log entry, `None` when nothing was applied.
    pub op_id: Option<i64>,
}

/// Result of duplicating notes.
#[derive(Debug, Clone)]
pub struct DuplicateSummary {
    /// Ids of the created notes, in input order.
    pub created: Vec<NoteId>,
    pub op_id: i64,
}

/// Progress callback for operations that walk many groups.
pub trait ProgressReporter: Send + Sync {
    /// Called after each group has been merged.
    fn group_merged(&self, current: usize, total: usize);
    /// Called when the operation completes.
    fn done(&self, summary: &MergeSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn group_merged(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &MergeSummary) {}
}

// ---------------------------------------------------------------------------
// Merge selected
// ---------------------------------------------------------------------------

/// Merge the notes behind the selected cards.
///
/// Cards are ordered with the configured ordering; each note takes the
/// position of its first card. Missing cards and notes are skipped.
#[instrument(skip_all, fields(cards = card_ids.len()))]
pub async fn merge_selected(
    collection: &Collection,
    card_ids: &[CardId],
    config: &MergeConfig,
) -> Result<MergeSummary> {
    if card_ids.len() < 2 {
        return Err(NoteMergeError::validation(
            "at least two cards must be selected",
        ));
    }

    let mut cards = Vec::with_capacity(card_ids.len());
    for &id in card_ids {
        match collection.get_card(id).await? {
            Some(card) => cards.push(card),
            None => debug!(%id, "card not found, skipping"),
        }
    }

    let note_ids: Vec<NoteId> = cards.iter().map(|c| c.note_id).collect();
    let notes = collection.get_notes(&note_ids, None).await?;

    let sorter = sorter_for(config);
    let ordered = sorter.notes_by_cards(&cards, notes);
    if ordered.len() < 2 {
        return Err(NoteMergeError::validation(
            "at least two distinct notes must be selected",
        ));
    }

    let notes_merged = ordered.len();
    let mut changes = ChangeSet::default();
    merge(ordered, &MergeOptions::from(config)).extend_into(&mut changes);

    let receipt = collection.apply(MERGE_SELECTED_LABEL, &changes).await?;
    info!(notes_merged, "notes merged");

    Ok(MergeSummary {
        groups: 1,
        notes_merged,
        updated: receipt.updated,
        removed: receipt.removed,
        op_id: Some(receipt.op_id),
    })
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

/// Find notes whose `field` holds the same content.
///
/// `search` narrows the candidates to notes containing it (empty matches
/// all). With `apply_when_searching_duplicates` off, only HTML is ignored,
/// like the host's own duplicate finder.
#[instrument(skip(collection, config))]
pub async fn find_duplicates(
    collection: &Collection,
    field: &str,
    search: &str,
    config: &MergeConfig,
) -> Result<Vec<DuplicateGroup>> {
    let opts = if config.apply_when_searching_duplicates {
        NormalizeOptions::from(config)
    } else {
        NormalizeOptions::html_only()
    };

    let notes = collection.find_notes(search, field).await?;
    Ok(group_duplicates(&notes, field, &opts))
}

/// Merge every duplicate group in a single transaction.
///
/// Notes that no longer exist are skipped; groups left with fewer than two
/// notes are skipped too.
#[instrument(skip_all, fields(groups = groups.len()))]
pub async fn merge_duplicates(
    collection: &Collection,
    groups: &[DuplicateGroup],
    config: &MergeConfig,
    progress: &dyn ProgressReporter,
) -> Result<MergeSummary> {
    let mut summary = MergeSummary::default();
    if groups.is_empty() {
        info!("no duplicate groups, nothing to do");
        progress.done(&summary);
        return Ok(summary);
    }

    let sorter = sorter_for(config);
    let options = MergeOptions::from(config);
    let mut changes = ChangeSet::default();

    for (i, group) in groups.iter().enumerate() {
        let notes = collection.get_notes(&group.note_ids, None).await?;
        if notes.len() < 2 {
            debug!(key = %group.key, "fewer than two notes left in group, skipping");
            progress.group_merged(i + 1, groups.len());
            continue;
        }

        let mut cards: HashMap<NoteId, Vec<Card>> = HashMap::new();
        for note in &notes {
            cards.insert(note.id, collection.cards_of_note(note.id).await?);
        }

        let ordered = sorter.notes_by_min_card(notes, &cards);
        debug!(key = %group.key, notes = ordered.len(), "merging group");
        summary.groups += 1;
        summary.notes_merged += ordered.len();
        merge(ordered, &options).extend_into(&mut changes);
        progress.group_merged(i + 1, groups.len());
    }

    if !changes.is_empty() {
        let receipt = collection.apply(MERGE_DUPLICATES_LABEL, &changes).await?;
        summary.updated = receipt.updated;
        summary.removed = receipt.removed;
        summary.op_id = Some(receipt.op_id);
    }

    info!(
        groups = summary.groups,
        notes = summary.notes_merged,
        "duplicate groups merged"
    );
    progress.done(&summary);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Duplicate notes
// ---------------------------------------------------------------------------

/// Create a copy of each note: same notetype and field values, tags without
/// `leech` and `marked`, one new card in the deck of the source's first card.
#[instrument(skip_all, fields(notes = note_ids.len()))]
pub async fn duplicate_notes(
    collection: &Collection,
    note_ids: &[NoteId],
) -> Result<DuplicateSummary> {
    let sources = collection.get_notes(note_ids, None).await?;
    if sources.is_empty() {
        return Err(NoteMergeError::validation("no existing notes selected"));
    }

    let mut next_note = collection.next_note_id().await?.0;
    let mut next_card = collection.next_card_id().await?.0;
    let mut changes = ChangeSet::default();

    for source in &sources {
        let deck_id = collection
            .cards_of_note(source.id)
            .await?
            .first()
            .map(|c| c.deck_id)
            .unwrap_or(DEFAULT_DECK);

        let mut copy = Note::new(NoteId(next_note), source.notetype.clone(), source.fields.clone());
        copy.sort_field = source.sort_field;
        copy.tags = source
            .tags
            .iter()
            .filter(|t| !tag_eq(t, LEECH_TAG) && !tag_eq(t, MARKED_TAG))
            .cloned()
            .collect();

        let card = Card {
            id: CardId(next_card),
            note_id: copy.id,
            deck_id,
            kind: CardKind::New,
            due: 0,
            interval: 0,
        };
        debug!(source = %source.id, copy = %copy.id, "duplicating note");
        changes.added.push(NewNote {
            note: copy,
            cards: vec![card],
        });

        next_note += 1;
        next_card += 1;
    }

    let label = if sources.len() > 1 {
        format!("Duplicate {} notes", sources.len())
    } else {
        "Duplicate note".to_string()
    };
    let receipt = collection.apply(&label, &changes).await?;

    Ok(DuplicateSummary {
        created: changes.added.iter().map(|n| n.note.id).collect(),
        op_id: receipt.op_id,
    })
}

fn sorter_for(config: &MergeConfig) -> Sorter {
    Sorter::new(
        SortOrder::from_config(&config.ordering),
        config.custom_sort_field.clone(),
        config.reverse_order,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notemerge_shared::Field;
    use uuid::Uuid;

    async fn test_collection() -> Collection {
        let tmp = std::env::temp_dir().join(format!("nm_ops_{}.db", Uuid::now_v7()));
        Collection::open(&tmp).await.expect("open test db")
    }

    fn new_note(id: i64, front: &str, back: &str, due: i64) -> NewNote {
        let note = Note::new(
            NoteId(id),
            "Basic",
            vec![Field::new("Front", front), Field::new("Back", back)],
        );
        NewNote {
            note,
            cards: vec![Card {
                id: CardId(id * 10),
                note_id: NoteId(id),
                deck_id: DeckId(7),
                kind: CardKind::Review,
                due,
                interval: 1,
            }],
        }
    }

    async fn seed(collection: &Collection, notes: Vec<NewNote>) {
        let changes = ChangeSet {
            added: notes,
            ..ChangeSet::default()
        };
        collection.apply("seed", &changes).await.expect("seed");
    }

    #[tokio::test]
    async fn merge_selected_pairwise() {
        let collection = test_collection().await;
        seed(
            &collection,
            vec![new_note(1, "cat", "", 2), new_note(2, "", "neko", 1)],
        )
        .await;

        let config = MergeConfig::default();
        let summary = merge_selected(&collection, &[CardId(10), CardId(20)], &config)
            .await
            .expect("merge");
        assert_eq!(summary.notes_merged, 2);
        assert_eq!(summary.removed, 0);

        // Due order puts note 2 first, so note 1 receives its content.
        let note = collection.get_note(NoteId(1)).await.unwrap().unwrap();
        assert_eq!(note.get("Front"), Some("cat"));
        assert_eq!(note.get("Back"), Some("neko"));
    }

    #[tokio::test]
    async fn merge_selected_deletes_originals() {
        let collection = test_collection().await;
        seed(
            &collection,
            vec![new_note(1, "a", "", 1), new_note(2, "b", "", 2), new_note(3, "c", "", 3)],
        )
        .await;

        let config = MergeConfig {
            delete_original_notes: true,
            field_separator: " / ".into(),
            ..MergeConfig::default()
        };
        let summary = merge_selected(&collection, &[CardId(30), CardId(10), CardId(20)], &config)
            .await
            .expect("merge");
        assert_eq!(summary.removed, 2);

        assert!(collection.get_note(NoteId(1)).await.unwrap().is_none());
        assert!(collection.get_note(NoteId(2)).await.unwrap().is_none());
        let survivor = collection.get_note(NoteId(3)).await.unwrap().unwrap();
        assert_eq!(survivor.get("Front"), Some("a / b / c"));

        let ops = collection.recent_ops(1).await.unwrap();
        assert_eq!(ops[0].label, MERGE_SELECTED_LABEL);
    }

    #[tokio::test]
    async fn merge_selected_needs_two_notes() {
        let collection = test_collection().await;
        let mut note = new_note(1, "a", "", 1);
        let second = Card {
            id: CardId(11),
            ..note.cards[0].clone()
        };
        note.cards.push(second);
        seed(&collection, vec![note]).await;

        let config = MergeConfig::default();
        let err = merge_selected(&collection, &[CardId(10)], &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("two cards"));

        let err = merge_selected(&collection, &[CardId(10), CardId(11)], &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("two distinct notes"));
    }

    #[tokio::test]
    async fn find_and_merge_duplicates() {
        let collection = test_collection().await;
        seed(
            &collection,
            vec![
                new_note(1, "Hello", "first", 3),
                new_note(2, "<b>Hello</b>", "second", 1),
                new_note(3, "World", "alone", 2),
            ],
        )
        .await;

        let config = MergeConfig {
            delete_original_notes: true,
            field_separator: "; ".into(),
            ..MergeConfig::default()
        };
        let groups = find_duplicates(&collection, "Front", "", &config).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].note_ids, vec![NoteId(1), NoteId(2)]);

        let summary = merge_duplicates(&collection, &groups, &config, &SilentProgress)
            .await
            .expect("merge dupes");
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.removed, 1);

        // Note 2 has the earlier due card, so note 1 survives.
        assert!(collection.get_note(NoteId(2)).await.unwrap().is_none());
        let survivor = collection.get_note(NoteId(1)).await.unwrap().unwrap();
        assert_eq!(survivor.get("Front"), Some("<b>Hello</b>"));
        assert_eq!(survivor.get("Back"), Some("second; first"));
    }

    #[tokio::test]
    async fn native_duplicate_search_ignores_extra_switches() {
        let collection = test_collection().await;
        seed(
            &collection,
            vec![new_note(1, "１", "", 1), new_note(2, "1", "", 2)],
        )
        .await;

        let mut config = MergeConfig::default();
        assert_eq!(find_duplicates(&collection, "Front", "", &config).await.unwrap().len(), 1);

        config.apply_when_searching_duplicates = false;
        assert!(find_duplicates(&collection, "Front", "", &config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_duplicates_skips_missing_notes() {
        let collection = test_collection().await;
        seed(
            &collection,
            vec![new_note(1, "x", "a", 1), new_note(2, "x", "b", 2)],
        )
        .await;

        let groups = vec![
            DuplicateGroup {
                key: "x".into(),
                note_ids: vec![NoteId(1), NoteId(99), NoteId(2)],
            },
            DuplicateGroup {
                key: "gone".into(),
                note_ids: vec![NoteId(98), NoteId(99)],
            },
        ];
        let config = MergeConfig::default();
        let summary = merge_duplicates(&collection, &groups, &config, &SilentProgress)
            .await
            .expect("merge dupes");
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.notes_merged, 2);
        assert_eq!(summary.updated, 2);
    }

    #[tokio::test]
    async fn merge_duplicates_with_nothing_to_do() {
        let collection = test_collection().await;
        let summary = merge_duplicates(&collection, &[], &MergeConfig::default(), &SilentProgress)
            .await
            .expect("empty");
        assert_eq!(summary.groups, 0);
        assert!(summary.op_id.is_none());
    }

    #[tokio::test]
    async fn duplicate_notes_copies_content() {
        let collection = test_collection().await;
        let mut source = new_note(1, "front", "back", 1);
        source.note.tags = vec!["leech".into(), "marked".into(), "verb".into()];
        seed(&collection, vec![source]).await;

        let summary = duplicate_notes(&collection, &[NoteId(1), NoteId(404)])
            .await
            .expect("duplicate");
        assert_eq!(summary.created.len(), 1);

        let copy = collection.get_note(summary.created[0]).await.unwrap().unwrap();
        assert_ne!(copy.id, NoteId(1));
        assert_eq!(copy.get("Front"), Some("front"));
        assert_eq!(copy.get("Back"), Some("back"));
        assert_eq!(copy.tags, vec!["verb".to_string()]);

        let cards = collection.cards_of_note(copy.id).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].deck_id, DeckId(7));
        assert_eq!(cards[0].kind, CardKind::New);

        let ops = collection.recent_ops(1).await.unwrap();
        assert_eq!(ops[0].label, "Duplicate note");
    }

    #[tokio::test]
    async fn duplicate_notes_requires_existing_notes() {
        let collection = test_collection().await;
        assert!(duplicate_notes(&collection, &[NoteId(5)]).await.is_err());
    }
}
