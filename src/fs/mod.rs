//! Filesystem helpers shared by the file-backed store and state dumps.

pub mod atomic;

pub use atomic::{atomic_write, read_optional};
