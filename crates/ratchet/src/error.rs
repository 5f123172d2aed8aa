//! Structured error types.
//!
//! The core has deliberately few: reduction is total, capability
//! construction is total, and routing misses are no-ops by construction.
//! What remains is the store boundary — talking to a worker that has been
//! shut down.

use thiserror::Error;

/// Errors surfaced by [`StoreHandle`](crate::store::StoreHandle) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store worker is gone; no further actions or queries can be
    /// processed.
    #[error("store is closed")]
    Closed,
}
