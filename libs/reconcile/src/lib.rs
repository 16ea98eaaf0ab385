//! Reconciliation loop primitives.
//!
//! This library provides the building blocks of a level-triggered controller:
//!
//! - **Work queue**: a keyed queue that coalesces duplicate keys and never
//!   hands the same key to two workers at once ([`WorkQueue`]).
//! - **Rate limiting**: per-key exponential delay for requeues after failure
//!   ([`ItemExponentialRateLimiter`]).
//! - **Conflict retry**: re-run a read-modify-write when an optimistic
//!   concurrency check fails ([`retry_on_conflict`]).
//! - **Patches**: two-way JSON merge patches so writes only touch the fields
//!   that changed ([`create_merge_patch`]).
//!
//! # Invariants
//!
//! - A key is processed by at most one worker at a time
//! - A key added while it is being processed is processed again afterwards
//! - An empty patch means no write is needed

mod backoff;
mod patch;
mod queue;
mod rate_limit;

pub use backoff::{retry_on_conflict, Backoff, Conflict};
pub use patch::{apply_merge_patch, create_merge_patch, is_empty_patch};
pub use queue::WorkQueue;
pub use rate_limit::ItemExponentialRateLimiter;
