//! Field and tag merge engine.
//!
//! Given notes already in the caller's preferred order, computes the notes to
//! write back and the notes to delete. Nothing here touches storage.

use std::collections::HashSet;

use tracing::{debug, instrument};

use notemerge_normalize::{interpret_special_chars, is_blank, normalize};
use notemerge_shared::{ChangeSet, LEECH_TAG, MergeConfig, NormalizeOptions, Note, NoteId, tag_eq};

/// Policy knobs for a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Inserted between concatenated field values.
    pub separator: String,
    /// Union tags into the receiving note.
    pub merge_tags: bool,
    /// Leave fields that already hold text untouched.
    pub skip_if_target_nonempty: bool,
    /// Collapse the group into its last note and delete the others.
    pub delete_originals: bool,
    /// Stably move notes with fewer shared fields to the front first.
    pub reorder_by_shared_fields: bool,
    /// How values are compared for equality.
    pub normalize: NormalizeOptions,
}

impl From<&MergeConfig> for MergeOptions {
    fn from(config: &MergeConfig) -> Self {
        Self {
            separator: interpret_special_chars(&config.field_separator),
            merge_tags: config.merge_tags,
            skip_if_target_nonempty: config.only_empty,
            delete_originals: config.delete_original_notes,
            reorder_by_shared_fields: config.avoid_content_loss,
            normalize: NormalizeOptions::from(config),
        }
    }
}

/// What a merge wants done to the collection.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Notes to write back with their new field values and tags.
    pub updated: Vec<Note>,
    /// Notes to delete.
    pub to_delete: Vec<NoteId>,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.to_delete.is_empty()
    }

    /// Append this outcome to a change set being built for one transaction.
    pub fn extend_into(self, changes: &mut ChangeSet) {
        changes.updated.extend(self.updated);
        changes.removed.extend(self.to_delete);
    }
}

/// Merge a group of notes.
///
/// Fewer than two notes is "nothing to do" and yields an empty outcome.
#[instrument(skip_all, fields(notes = notes.len(), delete = opts.delete_originals))]
pub fn merge(mut notes: Vec<Note>, opts: &MergeOptions) -> MergeOutcome {
    if notes.len() < 2 {
        debug!("fewer than two notes, nothing to merge");
        return MergeOutcome::default();
    }

    if opts.reorder_by_shared_fields {
        reorder_by_shared_fields(&mut notes);
    }

    let mut outcome = if opts.delete_originals {
        collapse_into_last(notes, opts)
    } else {
        fold_pairwise(notes, opts)
    };

    for note in &mut outcome.updated {
        note.remove_tag(LEECH_TAG);
        note.touch();
    }

    debug!(
        updated = outcome.updated.len(),
        deleted = outcome.to_delete.len(),
        "merge computed"
    );
    outcome
}

/// Stable ascending sort by how many of a note's fields occur in the union
/// of all field names in the group.
fn reorder_by_shared_fields(notes: &mut [Note]) {
    let all_fields: HashSet<String> = notes
        .iter()
        .flat_map(|n| n.field_names().map(str::to_owned))
        .collect();

    notes.sort_by_key(|n| n.field_names().filter(|f| all_fields.contains(*f)).count());
}

/// Walk adjacent pairs, folding each note into the one after it.
fn fold_pairwise(mut notes: Vec<Note>, opts: &MergeOptions) -> MergeOutcome {
    for i in 1..notes.len() {
        let (head, tail) = notes.split_at_mut(i);
        let earlier = &head[i - 1];
        let later = &mut tail[0];

        fold_fields(later, earlier, opts);
        if opts.merge_tags {
            merge_tags(later, std::slice::from_ref(earlier));
        }
    }

    MergeOutcome {
        updated: notes,
        to_delete: Vec::new(),
    }
}

/// Add `donor`'s field values to `target`, field by field.
fn fold_fields(target: &mut Note, donor: &Note, opts: &MergeOptions) {
    for field in &mut target.fields {
        if opts.skip_if_target_nonempty && !is_blank(&field.value) {
            continue;
        }
        let Some(donated) = donor.get(&field.name) else {
            continue;
        };
        if is_blank(donated) {
            continue;
        }
        let merged = join_distinct([field.value.as_str(), donated], opts);
        field.value = merged;
    }
}

/// Keep the last note, fill it from every note in the group, delete the rest.
fn collapse_into_last(mut notes: Vec<Note>, opts: &MergeOptions) -> MergeOutcome {
    let Some(mut survivor) = notes.pop() else {
        return MergeOutcome::default();
    };

    for idx in 0..survivor.fields.len() {
        let field = &survivor.fields[idx];
        if opts.skip_if_target_nonempty && !is_blank(&field.value) {
            continue;
        }
        let values = notes
            .iter()
            .filter_map(|n| n.get(&field.name))
            .chain(std::iter::once(field.value.as_str()));
        let merged = join_distinct(values, opts);
        survivor.fields[idx].value = merged;
    }

    if opts.merge_tags {
        merge_tags(&mut survivor, &notes);
    }

    MergeOutcome {
        to_delete: notes.iter().map(|n| n.id).collect(),
        updated: vec![survivor],
    }
}

/// Join the non-blank values, keeping only the first of each set of values
/// that normalize to the same string. Stored text is kept as written.
fn join_distinct<'a>(values: impl IntoIterator<Item = &'a str>, opts: &MergeOptions) -> String {
    let mut seen = HashSet::new();
    let mut out = String::new();

    for value in values {
        if is_blank(value) || !seen.insert(normalize(value, &opts.normalize)) {
            continue;
        }
        if !out.is_empty() {
            out.push_str(&opts.separator);
        }
        out.push_str(value);
    }
    out
}

fn merge_tags(target: &mut Note, donors: &[Note]) {
    for tag in donors.iter().flat_map(|n| n.tags.iter()) {
        if !tag_eq(tag, LEECH_TAG) {
            target.add_tag(tag);
        }
    }
}
