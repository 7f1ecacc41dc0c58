//! Leasehold: lease-based distributed locks.
//!
//! A lock is a record keyed by lock id and held under a lease that expires
//! on its own. Storage backends implement [`store::LeaseStore`]; the
//! [`protocol`] module runs the client-side acquire loop over them, and the
//! [`server`] module exposes an in-memory store over a line protocol with
//! delayed release of disconnected clients' locks.

pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod lease;
pub mod logging;
pub mod maintenance;
pub mod protocol;
pub mod release;
pub mod server;
pub mod signals;
pub mod store;

#[cfg(test)]
mod test_support;
