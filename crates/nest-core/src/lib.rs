//! # nest-core
//!
//! Domain models for harmony-nest: an email-addressed identity, the
//! shared couple record it can belong to, the harmony streak counted
//! since the couple's last reset, and the milestone rewards a couple
//! defines for itself.
//!
//! Everything here is plain data plus small invariant-preserving
//! mutators. Persistence and payments live in their own crates.

pub mod invite;
pub mod model;

pub use model::{Couple, Reward, Theme, User};
