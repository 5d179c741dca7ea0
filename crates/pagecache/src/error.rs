use std::io;

/// Errors that can occur during page reconciliation.
///
/// These map directly onto the kinds described for the reconciliation
/// core: memory exhaustion and block I/O are propagated immediately,
/// an unknown page type at dispatch is a programmer error, and invariant
/// violations are only checked (and fatal) in debug builds.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A buffer allocation could not be satisfied. Any boundaries
    /// already written to disk before this point are left in place;
    /// the caller's eviction path will simply re-reconcile on retry.
    #[error("out of memory during reconciliation")]
    OutOfMemory,

    /// The block manager failed a `block_write` or `block_free` call.
    #[error("block i/o error: {0}")]
    BlockIo(#[from] io::Error),

    /// Dispatch encountered a page type with no registered writer.
    /// Unreachable by construction; surfaced rather than panicking so
    /// callers can decide how to report a corrupted page header.
    #[error("invalid or unrecognized page type")]
    InvalidFormat,

    /// A `debug_assert!`-guarded invariant did not hold. Only produced
    /// in debug builds; release builds trust the invariant.
    #[error("reconciliation invariant violated: {0}")]
    AssertionFailure(String),

    /// The active configuration failed validation.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

/// Convenience alias used throughout the reconciliation core.
pub type Result<T> = std::result::Result<T, Error>;
