//! file-courier - Directory Spool Courier
//!
//! Polls a spool directory and delivers every file to a destination
//! directory using a pool of worker threads. Discovered files feed a
//! concurrent work backlog; workers claim batches, move the files, and
//! commit each batch as done or roll it back for retry.
//!
//! # Features
//!
//! - **Concurrent backlog**: a single lock-guarded structure tracks
//!   pending, in-flight, and done items, handing disjoint batches to
//!   concurrent workers with atomic commit/rollback per batch.
//!
//! - **Crash-safe claims**: a claimed batch is a lease; dropping an
//!   unresolved lease (worker panic) rolls its items back automatically.
//!
//! - **Retry by rollback**: failed batches return to the head of the
//!   backlog and are retried before fresh discoveries. No retry counters,
//!   no lost files.
//!
//! - **Audit journal**: every delivery and failure is one JSON line in an
//!   append-only journal, written off the worker threads.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Source Directory                        │
//! └─────────────────────────────┬────────────────────────────────┘
//!                               │ poll interval
//!                               ▼
//!                     ┌──────────────────┐
//!                     │      Poller      │
//!                     │  snapshot names  │
//!                     └────────┬─────────┘
//!                              │ process_snapshot
//!                              ▼
//!                 ┌─────────────────────────┐
//!                 │         Backlog         │
//!                 │  pending │ out │ done   │
//!                 │    (single mutex)       │
//!                 └───┬──────────┬──────┬───┘
//!                     │ lease    │      │
//!       ┌─────────────┘          │      └────────────┐
//!       ▼                        ▼                   ▼
//! ┌───────────┐            ┌───────────┐       ┌───────────┐
//! │  Worker 1 │            │  Worker 2 │  ...  │  Worker N │
//! │ move files│            │ move files│       │ move files│
//! └─────┬─────┘            └─────┬─────┘       └─────┬─────┘
//!       │   commit / rollback    │                   │
//!       └────────────────────────┼───────────────────┘
//!                                ▼
//!                     ┌──────────────────┐
//!                     │  Journal Writer  │
//!                     │  (JSON lines)    │
//!                     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Continuous delivery
//! file-courier /var/spool/inbox /var/spool/outbox -w 8
//!
//! # Drain the spool once and exit
//! file-courier ./inbox ./outbox --once
//! ```

pub mod backlog;
pub mod config;
pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod journal;
pub mod poller;
pub mod progress;
pub mod worker;

pub use backlog::{Backlog, BacklogCounts, Claimant, Lease};
pub use config::{CliArgs, CourierConfig};
pub use coordinator::{Coordinator, CourierProgress, CourierResult};
pub use delivery::{DeliveryAgent, MoveDelivery};
pub use error::{BacklogError, CourierError, Result};
