//! The scan coordinator.
//!
//! This module is the top-level state machine external callers drive. Per
//! incoming credential: verify → debounce → (queue if offline) → rule-check
//! → (batch-collect or commit) → emit result, with the offline queue
//! draining into the same commit path once connectivity returns.
//!
//! # Architecture
//!
//! ```text
//! raw scan input
//!      ↓
//! CredentialVerifier ──invalid──▶ terminal result
//!      ↓
//! DebounceGuard ──duplicate──▶ silent drop
//!      ↓
//! offline? ──yes──▶ OfflineQueue (durable journal) ──▶ queued result
//!      ↓ no                         │ sync worker drains FIFO
//! RuleEngine ◀───────────────────────┘
//!      ↓
//! Blocked │ AllowedWithOverride │ Allowed
//!      ↓            ↓                ↓
//!   result   reason + audit log   commit (or BatchCollector)
//!                   ↓                ↓
//!                 commit      capacity recompute → result
//! ```
//!
//! All shared mutable state (capacity, override session, debounce sets,
//! queues) lives in [`ScanState`] and is mutated only inside the reducer,
//! which the store runs under its write lock; one serialized commit path,
//! no ambient globals.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod store;
pub mod types;

pub use actions::{AdmittedEntry, EntryResolution, ScanAction, ScanSource};
pub use environment::ScanEnv;
pub use reducer::ScanReducer;
pub use store::{Gate, QueueStatus, ScanResponse};
pub use types::{PendingScan, ScanPhase, ScanState};
