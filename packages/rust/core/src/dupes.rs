//! Duplicate detection by exact match on normalized field content.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, instrument};

use notemerge_normalize::{is_blank, normalize};
use notemerge_shared::{NormalizeOptions, Note, NoteId};

/// Notes whose field normalizes to the same `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub note_ids: Vec<NoteId>,
}

/// Bucket notes by the normalized value of `field_name` and keep the buckets
/// with at least two notes.
///
/// Notes lacking the field, or whose value is blank or normalizes to nothing,
/// are ignored. Groups come out in order of first appearance and ids keep the
/// input order.
#[instrument(skip(notes, opts), fields(notes = notes.len()))]
pub fn group_duplicates(
    notes: &[Note],
    field_name: &str,
    opts: &NormalizeOptions,
) -> Vec<DuplicateGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<DuplicateGroup> = Vec::new();

    for note in notes {
        let Some(value) = note.get(field_name) else {
            continue;
        };
        if is_blank(value) {
            continue;
        }
        let key = normalize(value, opts);
        if key.is_empty() {
            continue;
        }

        match index.get(&key) {
            Some(&i) => buckets[i].note_ids.push(note.id),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push(DuplicateGroup {
                    key,
                    note_ids: vec![note.id],
                });
            }
        }
    }

    let groups: Vec<_> = buckets
        .into_iter()
        .filter(|g| g.note_ids.len() >= 2)
        .collect();
    debug!(groups = groups.len(), "duplicate search complete");
    groups
}
