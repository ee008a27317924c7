//! Shared types, error model, and configuration for notemerge.
//!
//! Every other notemerge crate builds on this one: the [`NoteMergeError`]
//! type, the note model ([`Note`], [`Card`], [`ChangeSet`]) and the
//! `notemerge.toml` layer ([`AppConfig`], [`MergeConfig`]).

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectionConfig, MergeConfig, NormalizeOptions, collection_path, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{NoteMergeError, Result};
pub use types::{
    Card, CardId, CardKind, ChangeSet, DeckId, Field, LEECH_TAG, MARKED_TAG, NewNote, Note,
    NoteId, tag_eq,
};
