//! watchstore - shared transactional key-value state
//!
//! A small store abstraction for state that several processes mutate
//! concurrently. All mutations that must be atomic with respect to other
//! writers go through optimistic watch/commit transactions: snapshot the
//! watched keys, compute the writes, and commit them only if nothing changed
//! in between. Conflicts retry a bounded number of times and then surface to
//! the caller instead of spinning.
//!
//! # Modules
//!
//! - [`store`] - the [`KvStore`] trait and the [`transact`] retry helper
//! - [`redis`] - Redis backend
//! - [`memory`] - single-process in-memory backend for tests and local runs
//! - [`lock`] - set-if-absent advisory lock for cross-instance exclusion

pub mod error;
pub mod lock;
pub mod memory;
pub mod redis;
pub mod store;

pub use error::StoreError;
pub use lock::StoreLock;
pub use memory::MemoryStore;
pub use store::{CommitOutcome, KvStore, MAX_TXN_ATTEMPTS, TxnDecision, Watched, WriteOp, transact};

pub use self::redis::RedisStore;
