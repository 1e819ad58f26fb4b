//! Modulux: a headless content backend built around schema-driven
//! collections.
//!
//! Operators define a collection with a JSON field schema. Entries are
//! stored as schema-less JSON documents, and every schema change is
//! diffed against the previous version so existing entries are migrated
//! (renamed or removed keys, including inside composite and array fields)
//! in the same transaction that stores the new schema.

pub mod app;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod images;
pub mod migration;
pub mod objects;
pub mod schema;
pub mod server;
pub mod services;

pub use error::{CmsError, CmsResult};
