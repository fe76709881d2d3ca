//! Backing stores behind named interfaces.
//!
//! The durable stores (nonces, secrets material, test results) are external
//! collaborators; this module defines their interfaces plus in-process
//! engines with the semantics the request core relies on: conditional create
//! (first-writer-wins) and TTL eviction. Callers treat store errors as
//! fail-closed.

use thiserror::Error;

pub mod nonce;
pub mod results;
pub mod secrets;

/// Errors surfaced by any backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
