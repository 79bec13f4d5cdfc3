//! Versioned state storage and checkpoints (§4.5).
//!
//! [`in_memory::InMemoryStateStore`] is the default for single-process
//! deployments. [`durable`] provides a `sqlx`-backed store over the same
//! `StateStore` trait for deployments that need state to survive a restart,
//! plus the [`locks::DistributedLock`] it uses to guard `update`.
//! [`snapshot::SnapshotManager`] layers named checkpoints on top of either.

pub mod durable;
pub mod in_memory;
pub mod locks;
pub mod snapshot;

pub use durable::{DurableStateStore, KvBackend, SqliteKvBackend};
pub use in_memory::InMemoryStateStore;
pub use locks::{DistributedLock, LockGuard};
pub use snapshot::SnapshotManager;
