//! # POS Replication
//!
//! Offline-first outbound replication for point-of-sale stations.
//!
//! ## Architecture
//!
//! Business logic writes records to the station's local database with
//! `sync_status = 'pending'`. The engine periodically pushes them to the
//! remote authority and flips confirmed ones to `'sent'`:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                            pos-replication                                │
//! │                                                                           │
//! │  ┌───────────┐   ┌───────────────────────── ReplicationEngine ─────────┐  │
//! │  │ Scheduler │──►│ Probe ─► Selector ─► Transmitter ─► StateCommitter  │  │
//! │  │ (timer)   │   │ (HTTP)   (SQLite)     (HTTP+retry)   (SQLite)       │  │
//! │  └───────────┘   └─────────────────────────────────────────────────────┘  │
//! │        ▲                     │                              │             │
//! │        │                     ▼                              ▼             │
//! │  ┌────────────────┐   ┌──────────────┐              ┌──────────────┐      │
//! │  │ SyncController │   │ LocalStore   │              │ Remote       │      │
//! │  │ (host API)     │   │ (pending →   │              │ Authority    │      │
//! │  └────────────────┘   │  sent only)  │              │ (bulk POST)  │      │
//! │                       └──────────────┘              └──────────────┘      │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! 1. **Offline-first**: an unreachable authority skips the cycle and never
//!    touches local state.
//! 2. **At-least-once**: a record becomes `sent` only after the authority
//!    accepted the batch containing it; an acknowledgement lost in transit
//!    means the batch is sent again next cycle.
//! 3. **Single-flight**: one cycle per engine instance at a time; extra
//!    triggers are rejected, never queued.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pos_replication::{EntityKind, ReplicationConfig, ReplicationEngine, SyncController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pos_replication::Result<()> {
//!     let config = ReplicationConfig::catalog("https://pos.example.com");
//!     let engine = ReplicationEngine::open(config, EntityKind::catalog()).await?;
//!
//!     let controller = SyncController::new(Arc::new(engine));
//!     controller.start_loop().await;
//!
//!     let forced = controller.force_sync(Some(100)).await;
//!     println!("{}", forced.message);
//!
//!     controller.stop_loop().await;
//!     Ok(())
//! }
//! ```

pub mod committer;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod kind;
pub mod metrics;
pub mod probe;
pub mod record;
pub mod remote;
pub mod resilience;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod transmit;

// Re-exports for convenience
pub use config::{
    BatchConfig, HealthConfig, RemoteConfig, ReplicationConfig, RetrySettings, ScheduleConfig, StoreConfig,
};
pub use control::{ControlResponse, ForceSyncResponse, StatsView, SyncController};
pub use coordinator::{CycleOutcome, CyclePhase, CycleReport, PhaseReport, ReplicationEngine, SyncStats};
pub use error::{ReplicationError, Result};
pub use kind::{EntityKind, NestedKind};
pub use record::{NestedRecord, SyncRecord, SyncStatus};
pub use remote::{HttpRemote, ProbeTarget, RemoteAuthority};
pub use resilience::RetryConfig;
pub use scheduler::Scheduler;
pub use selector::BatchLimit;
pub use store::{CommitReceipt, CommitSet, LocalStore, MemoryStore, SqliteStore};
