//! Gatecheck - real-time ticket scan validation for venue entry control
//!
//! The engine decides, in real time and at gate throughput, whether a
//! presented ticket credential grants entry. It verifies a signed
//! credential, enforces layered business rules (refund, duplicate-use,
//! transfer, capacity, mandatory ID verification), stays correct when the
//! network is gone, supports a supervised batch-approve workflow for
//! groups, and supports an audited emergency-override mode.
//!
//! # Architecture
//!
//! ```text
//! raw scan input → CredentialVerifier → DebounceGuard
//!                                            │
//!                              offline? ─────┤
//!                               │            │ online
//!                               ▼            ▼
//!                         OfflineQueue   RuleEngine ◀─ OverrideSession
//!                          (journal)         │
//!                               │            ▼
//!                    sync worker drains  commit ──▶ BatchCollector
//!                               └──────────▶ │        (batch mode)
//!                                            ▼
//!                                     ScanResult out
//! ```
//!
//! Everything is driven by one reducer ([`scan::ScanReducer`]) running under
//! the store's write lock, the single-writer commit path that keeps
//! capacity and override state consistent across concurrent input sources.
//! Backend access (ticket store, capacity provider, audit sink) happens in
//! effects whose feedback events re-enter the reducer.
//!
//! # Key behaviors
//!
//! - **Fail toward the queue, never toward denial**: a transient backend
//!   failure routes the scan to the durable offline queue; only the rule
//!   engine produces denials.
//! - **Override accountability**: no rule bypass commits without an
//!   operator-supplied reason and a paired [`overrides::OverrideLogEntry`],
//!   written before the ticket-state write.
//! - **Idempotent sync**: queued scans replay through the same rule path as
//!   live scans, so ticket state is the deduplication mechanism; a ticket
//!   scanned elsewhere while this device was offline resolves as `used`.
//!
//! # Usage
//!
//! ```ignore
//! let config = Config::from_env()?;
//! let gate = Gate::new(&config, clock, tickets, capacity, audit, journal)?;
//! gate.restore_from_journal().await?;
//!
//! match gate.process_scan(payload, ScanMethod::Qr, staff).await? {
//!     ScanResponse::Completed(result) => show(result),
//!     ScanResponse::AwaitingOverrideReason { attempt_id, .. } => {
//!         let reason = prompt_operator()?;
//!         let result = gate.supply_override_reason(attempt_id, reason, None).await?;
//!         show(result);
//!     }
//!     ScanResponse::Ignored => {} // duplicate rapid scan
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod connectivity;
pub mod credential;
pub mod debounce;
pub mod error;
pub mod journal;
pub mod overrides;
pub mod providers;
pub mod queue;
pub mod rules;
pub mod scan;
pub mod sync;
pub mod types;

pub use batch::{BatchCollector, BatchRejection};
pub use config::Config;
pub use connectivity::ConnectivityMonitor;
pub use credential::{CredentialVerifier, VerifiedCredential};
pub use debounce::DebounceGuard;
pub use error::{CollaboratorError, ScanError};
pub use journal::{FileJournal, MemoryJournal, ScanJournal};
pub use overrides::{OverrideLogEntry, OverrideSession};
pub use providers::{AuditSink, CapacityProvider, ScanLogEntry, TicketStore};
pub use queue::{OfflineQueue, QueuedScan, QueuedScanId, SyncStatus, SyncSummary};
pub use rules::{Decision, Evaluation, RuleEngine};
pub use scan::{Gate, QueueStatus, ScanAction, ScanResponse};
pub use sync::SyncWorker;
pub use types::*;
