//! Lease data model.
//!
//! - [`LockRecord`]: one per lock id, owned by the store
//! - [`ClientSession`]: per-client bookkeeping owned by the server process
//! - Outcome enums for every contended operation
//!
//! Identifiers that cross the wire or become file names are validated here,
//! once, before any store sees them.

mod record;
mod session;
mod types;

pub use record::LockRecord;
pub use session::ClientSession;
pub use types::{
    AcquireOutcome, AddSignalOutcome, CreateOutcome, FoundLock, MaintenanceReport,
    ReclaimOutcome, ReleaseOutcome, RemoveSignalOutcome, StoreStats, UnreleaseReport,
};

use crate::error::{LeaseError, Result};

/// Longest accepted lock id, in bytes.
pub const MAX_LOCK_ID_LEN: usize = 255;

/// Longest accepted lease, in seconds (ten years).
pub const MAX_LEASE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Generate an opaque lease id.
pub fn new_lease_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reject lock ids that cannot be stored or sent on a line.
pub fn validate_lock_id(lock_id: &str) -> Result<()> {
    validate_token("lock id", lock_id, MAX_LOCK_ID_LEN)
}

/// Reject zero-length leases and leases too long to land on a timestamp.
pub fn validate_lease_duration(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(LeaseError::Validation(
            "lease duration must be greater than 0".to_string(),
        ));
    }
    if secs > MAX_LEASE_SECS {
        return Err(LeaseError::Validation(format!(
            "lease duration {}s exceeds the limit of {}s",
            secs, MAX_LEASE_SECS
        )));
    }
    Ok(())
}

pub fn validate_client_id(client_id: &str) -> Result<()> {
    validate_token("client id", client_id, MAX_LOCK_ID_LEN)
}

/// Validate and lower-case a signal name.
pub fn normalize_signal(signal: &str) -> Result<String> {
    validate_token("signal", signal, MAX_LOCK_ID_LEN)?;
    Ok(signal.to_lowercase())
}

fn validate_token(what: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(LeaseError::Validation(format!("{} must not be empty", what)));
    }
    if value.len() > max_len {
        return Err(LeaseError::Validation(format!(
            "{} is {} bytes long; the limit is {}",
            what,
            value.len(),
            max_len
        )));
    }
    if let Some(bad) = value.chars().find(|c| c.is_control() || c.is_whitespace()) {
        return Err(LeaseError::Validation(format!(
            "{} '{}' contains an invalid character {:?}",
            what,
            value.escape_debug(),
            bad
        )));
    }
    Ok(())
}

/// Default owner string: `user@HOST`.
pub fn default_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
