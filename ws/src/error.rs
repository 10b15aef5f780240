//! Store error types

use thiserror::Error;

/// Errors surfaced by store backends and transactions
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend connectivity or protocol failure
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// An optimistic transaction lost its watch on every attempt
    #[error("transaction conflicted on all {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
