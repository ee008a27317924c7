//! Merge engine and collection operations for notemerge.
//!
//! The pure parts ([`merge`], [`dupes`], [`ordering`]) compute what notes
//! should look like; [`ops`] and [`import`] read from and apply results to a
//! [`notemerge_storage::Collection`].

pub mod dupes;
pub mod import;
pub mod merge;
pub mod ops;
pub mod ordering;
