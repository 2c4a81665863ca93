//! # nest-store
//!
//! Persistence for harmony-nest: three logical tables (users, couples,
//! rewards) behind the [`NestStore`] trait, accessed with point lookups
//! and simple filtered lists. Writes are single-row; there are no
//! cross-table transactions and none are assumed.
//!
//! Two implementations:
//!
//! - [`RestStore`] — a PostgREST-style managed row store over HTTP.
//! - [`MemoryStore`] — in-process, for development and tests.
//!
//! A lookup that finds nothing is `Ok(None)`, never an error; errors
//! mean the store itself misbehaved.

mod error;
mod memory;
mod rest;
mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rest::{RestStore, StoreConfig};
pub use store::{CoupleChanges, NestStore};
