//! Orderings applied to notes before they are merged.
//!
//! The merge engine folds each note into the next one, so the order decides
//! which note ends up receiving the content. Keys are computed per card,
//! mirroring how the host's browser lists cards.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::warn;

use notemerge_shared::{Card, CardKind, Note, NoteId};

/// A named ordering from the `ordering` config key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Card type, then due number: new cards first.
    #[default]
    Due,
    IntervalLength,
    CardId,
    DeckId,
    SortField,
    SortFieldNumeric,
    /// The configured custom field, or the sort field when the note lacks it.
    CustomField,
    CustomFieldNumeric,
}

impl SortOrder {
    pub const ALL: [SortOrder; 8] = [
        Self::Due,
        Self::IntervalLength,
        Self::CardId,
        Self::DeckId,
        Self::SortField,
        Self::SortFieldNumeric,
        Self::CustomField,
        Self::CustomFieldNumeric,
    ];

    /// The name used in the config file.
    pub fn name(self) -> &'static str {
        match self {
            Self::Due => "Due",
            Self::IntervalLength => "Interval length",
            Self::CardId => "Card ID",
            Self::DeckId => "Deck ID",
            Self::SortField => "Sort Field",
            Self::SortFieldNumeric => "Sort Field (numeric)",
            Self::CustomField => "Custom field",
            Self::CustomFieldNumeric => "Custom field (numeric)",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.name() == name)
    }

    /// Resolve a configured name, falling back to [`SortOrder::Due`].
    pub fn from_config(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(ordering = name, fallback = Self::Due.name(), "unknown ordering");
            Self::Due
        })
    }
}

/// Comparable key of one card under a [`SortOrder`].
///
/// Keys from one ordering always share a variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Due(CardKind, i64),
    Int(i64),
    Text(String),
    /// Parsed integer, or `i64::MAX` when the text is not a number, paired
    /// with the text so unparseable values still order among themselves.
    Numeric(i64, String),
}

/// Builds [`SortKey`]s for one ordering.
#[derive(Debug, Clone)]
pub struct Sorter {
    order: SortOrder,
    custom_field: String,
    reverse: bool,
}

impl Sorter {
    pub fn new(order: SortOrder, custom_field: impl Into<String>, reverse: bool) -> Self {
        Self {
            order,
            custom_field: custom_field.into(),
            reverse,
        }
    }

    pub fn key(&self, card: &Card, note: &Note) -> SortKey {
        match self.order {
            SortOrder::Due => SortKey::Due(card.kind, card.due),
            SortOrder::IntervalLength => SortKey::Int(card.interval),
            SortOrder::CardId => SortKey::Int(card.id.0),
            SortOrder::DeckId => SortKey::Int(card.deck_id.0),
            SortOrder::SortField => SortKey::Text(note.sort_field_value().to_string()),
            SortOrder::SortFieldNumeric => numeric_key(note.sort_field_value()),
            SortOrder::CustomField => SortKey::Text(self.custom_value(note).to_string()),
            SortOrder::CustomFieldNumeric => numeric_key(self.custom_value(note)),
        }
    }

    fn custom_value<'n>(&self, note: &'n Note) -> &'n str {
        note.get(&self.custom_field)
            .unwrap_or_else(|| note.sort_field_value())
    }

    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        if self.reverse { b.cmp(a) } else { a.cmp(b) }
    }

    /// Order notes by their cards: sort the cards, then take each note at the
    /// position of its first card. Cards whose note is not in `notes` are
    /// ignored.
    pub fn notes_by_cards(&self, cards: &[Card], notes: Vec<Note>) -> Vec<Note> {
        let mut by_id: HashMap<NoteId, Note> = notes.into_iter().map(|n| (n.id, n)).collect();

        let mut keyed: Vec<(SortKey, NoteId)> = cards
            .iter()
            .filter_map(|c| by_id.get(&c.note_id).map(|n| (self.key(c, n), c.note_id)))
            .collect();
        keyed.sort_by(|a, b| self.compare(&a.0, &b.0));

        keyed
            .into_iter()
            .filter_map(|(_, id)| by_id.remove(&id))
            .collect()
    }

    /// Order notes by the smallest key among their cards. Notes without
    /// cards go last.
    pub fn notes_by_min_card(
        &self,
        notes: Vec<Note>,
        cards: &HashMap<NoteId, Vec<Card>>,
    ) -> Vec<Note> {
        let mut keyed: Vec<(Option<SortKey>, Note)> = notes
            .into_iter()
            .map(|n| {
                let key = cards
                    .get(&n.id)
                    .and_then(|cs| cs.iter().map(|c| self.key(c, &n)).min());
                (key, n)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => self.compare(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        keyed.into_iter().map(|(_, n)| n).collect()
    }
}

fn numeric_key(s: &str) -> SortKey {
    match s.trim().parse::<i64>() {
        Ok(n) => SortKey::Numeric(n, s.to_string()),
        Err(_) => SortKey::Numeric(i64::MAX, s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notemerge_shared::{CardId, DeckId, Field};

    fn note(id: i64, sort: &str) -> Note {
        Note::new(
            NoteId(id),
            "Basic",
            vec![Field::new("Front", sort), Field::new("Back", "")],
        )
    }

    fn card(id: i64, note_id: i64, kind: CardKind, due: i64) -> Card {
        Card {
            id: CardId(id),
            note_id: NoteId(note_id),
            deck_id: DeckId(1),
            kind,
            due,
            interval: 0,
        }
    }

    fn ids(notes: &[Note]) -> Vec<i64> {
        notes.iter().map(|n| n.id.0).collect()
    }

    #[test]
    fn names_roundtrip() {
        for order in SortOrder::ALL {
            assert_eq!(SortOrder::from_name(order.name()), Some(order));
        }
        assert_eq!(SortOrder::from_config("Bogus"), SortOrder::Due);
        assert_eq!(SortOrder::from_config("Card ID"), SortOrder::CardId);
    }

    #[test]
    fn numeric_keys_put_text_last() {
        let mut keys = vec![
            numeric_key("10"),
            numeric_key("abc"),
            numeric_key("9"),
            numeric_key("abb"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SortKey::Numeric(9, "9".into()),
                SortKey::Numeric(10, "10".into()),
                SortKey::Numeric(i64::MAX, "abb".into()),
                SortKey::Numeric(i64::MAX, "abc".into()),
            ]
        );
    }

    #[test]
    fn due_puts_new_cards_first() {
        let sorter = Sorter::new(SortOrder::Due, "", false);
        let notes = vec![note(1, "a"), note(2, "b"), note(3, "c")];
        let cards = vec![
            card(10, 1, CardKind::Review, 5),
            card(20, 2, CardKind::New, 100),
            card(30, 3, CardKind::Review, 1),
        ];
        assert_eq!(ids(&sorter.notes_by_cards(&cards, notes)), vec![2, 3, 1]);
    }

    #[test]
    fn reverse_flips_order() {
        let sorter = Sorter::new(SortOrder::CardId, "", true);
        let notes = vec![note(1, "a"), note(2, "b")];
        let cards = vec![card(10, 1, CardKind::New, 0), card(20, 2, CardKind::New, 0)];
        assert_eq!(ids(&sorter.notes_by_cards(&cards, notes)), vec![2, 1]);
    }

    #[test]
    fn notes_taken_once_at_first_card() {
        let sorter = Sorter::new(SortOrder::CardId, "", false);
        let notes = vec![note(1, "a"), note(2, "b")];
        let cards = vec![
            card(30, 1, CardKind::New, 0),
            card(10, 2, CardKind::New, 0),
            card(5, 1, CardKind::New, 0),
        ];
        assert_eq!(ids(&sorter.notes_by_cards(&cards, notes)), vec![1, 2]);
    }

    #[test]
    fn sort_field_numeric() {
        let sorter = Sorter::new(SortOrder::SortFieldNumeric, "", false);
        let notes = vec![note(1, "x"), note(2, "10"), note(3, "9")];
        let cards = vec![
            card(1, 1, CardKind::New, 0),
            card(2, 2, CardKind::New, 0),
            card(3, 3, CardKind::New, 0),
        ];
        assert_eq!(ids(&sorter.notes_by_cards(&cards, notes)), vec![3, 2, 1]);
    }

    #[test]
    fn custom_field_falls_back_to_sort_field() {
        let sorter = Sorter::new(SortOrder::CustomField, "Rank", false);
        let mut ranked = note(1, "zzz");
        ranked.fields.push(Field::new("Rank", "a"));
        let plain = note(2, "b");
        let c1 = card(1, 1, CardKind::New, 0);
        let c2 = card(2, 2, CardKind::New, 0);
        assert_eq!(sorter.key(&c1, &ranked), SortKey::Text("a".into()));
        assert_eq!(sorter.key(&c2, &plain), SortKey::Text("b".into()));
    }

    #[test]
    fn min_card_key_orders_notes() {
        let sorter = Sorter::new(SortOrder::Due, "", false);
        let notes = vec![note(1, "a"), note(2, "b"), note(3, "c")];
        let mut cards = HashMap::new();
        cards.insert(
            NoteId(1),
            vec![card(10, 1, CardKind::Review, 50), card(11, 1, CardKind::Review, 2)],
        );
        cards.insert(NoteId(2), vec![card(20, 2, CardKind::Review, 10)]);
        assert_eq!(ids(&sorter.notes_by_min_card(notes, &cards)), vec![1, 2, 3]);
    }

    #[test]
    fn reversed_min_card_key_keeps_cardless_notes_last() {
        let sorter = Sorter::new(SortOrder::Due, "", true);
        let notes = vec![note(1, "a"), note(2, "b"), note(3, "c")];
        let mut cards = HashMap::new();
        cards.insert(
            NoteId(1),
            vec![card(10, 1, CardKind::Review, 50), card(11, 1, CardKind::Review, 2)],
        );
        cards.insert(NoteId(2), vec![card(20, 2, CardKind::Review, 10)]);
        assert_eq!(ids(&sorter.notes_by_min_card(notes, &cards)), vec![2, 1, 3]);
    }
}
