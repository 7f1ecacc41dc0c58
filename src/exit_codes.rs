//! Exit code constants for the leasehold CLI.
//!
//! - 0: Success (for `acquire`, the lease id is on stdout)
//! - 1: Unexpected error (backend failure, cancellation, shutdown)
//! - 2: Validation failure (bad arguments, malformed lock id, bad config)
//! - 3: Lock unavailable (held by another agent, or the wait budget ran out)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Unexpected error: storage backend failure or an aborted operation.
pub const UNEXPECTED_ERROR: i32 = 1;

/// Validation failure: malformed input or mutually exclusive options.
pub const VALIDATION_FAILURE: i32 = 2;

/// The lock is currently held by another agent.
pub const LOCK_UNAVAILABLE: i32 = 3;
