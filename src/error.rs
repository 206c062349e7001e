//! Error kinds produced by the allocator's internal plumbing.
//!
//! None of these ever reach a caller of the public facade directly: per the
//! facade's coarse contract, allocation-shaped operations collapse failures
//! to a null pointer and `init` collapses them to `Err(AllocError)`. The
//! enum exists so the internal call chain (os -> node pool -> thread cache
//! -> facade) can propagate a specific reason with `?` instead of threading
//! booleans, and so `init`'s caller can distinguish "called twice" from a
//! genuine platform failure.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("allocator already initialized")]
    AlreadyInitialized,

    #[error("NUMA topology unavailable, degraded to single node")]
    TopologyUnavailable,

    #[error("failed to reserve address space")]
    VmReserveFailed,

    #[error("failed to commit pages")]
    VmCommitFailed,

    #[error("node pool exhausted")]
    NodeExhausted,

    #[error("allocation failed")]
    AllocFailed,

    #[error("arena request exceeds reserved range")]
    OutOfReserve,

    #[error("failed to create arena")]
    ArenaCreateFailed,
}
