//! blockidx - a concurrent, mutable, in-memory domain-blocklist index.
//!
//! This crate answers "is this domain blocked, and how" at high query
//! rates while concurrently accepting streamed add/delete updates, with
//! best-effort durability to an append-only journal.
//!
//! # Architecture
//!
//! - **Two-level index**: a fixed hash table of 65535 buckets, each owning
//!   an order-8 B-tree keyed by a 64-bit tree hash; each tree key holds a
//!   chain of exact-match records absorbing hash collisions across
//!   distinct domains.
//! - **Write cache**: quick updates are admitted O(1) to per-lock-group
//!   pending lists and merged into the trees by a later drain; searches
//!   consult the cache first so the newest write always wins, and a
//!   pending delete masks an older tree entry.
//! - **Lock groups**: buckets share 10 reader/writer tree locks and 10
//!   cache locks (`bucket_hash % 10`), bounding the lock count
//!   independently of the bucket count.
//! - **Journal**: accepted batches are appended to a flat file of wire
//!   records and replayed (memory-mapped) on startup.
//!
//! # Quick Start
//!
//! ```
//! use blockidx::{Config, ControlAction, DomainIndex, Lookup, Opcode, UpdateMode};
//!
//! let index = DomainIndex::open(Config::in_memory()).unwrap();
//!
//! // Encode one Add record and apply it.
//! let mut batch = Vec::new();
//! blockidx::wire::encode_record(
//!     &mut batch,
//!     Opcode::Add,
//!     ControlAction::Drop,
//!     "ads.example.com",
//!     None,
//! )
//! .unwrap();
//! index.update(&batch, UpdateMode::Normal);
//!
//! assert!(index.search("ads.example.com").unwrap().is_found());
//! assert_eq!(index.search("other.com").unwrap(), Lookup::NotFound);
//! ```
//!
//! # Update modes
//!
//! - **Normal**: each record is applied directly to the owning B-tree
//!   under its group's exclusive tree lock.
//! - **Quick**: records are buffered in the write cache without touching
//!   any tree lock and reach the trees on the next
//!   [`flush_cache`](DomainIndex::flush_cache).

mod action;
mod config;
mod error;
mod record;
mod service;

pub mod btree;
pub mod bucket;
pub mod cache;
pub mod hash;
pub mod journal;
pub mod wire;

// Re-export core types
pub use action::{ControlAction, Opcode, UpdateMode};
pub use config::{Config, DEFAULT_REDIRECT};
pub use error::{Error, Result};
pub use record::{DomainRecord, Lookup};
pub use service::DomainIndex;
