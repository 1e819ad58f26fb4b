//! Core services: the collection registry and entry CRUD.

mod collections;
mod entries;

pub use collections::CollectionRegistry;
pub use entries::{CollectionView, DeletedEntries, EntryService, UpdatedEntry};
