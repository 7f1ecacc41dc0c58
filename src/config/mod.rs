//! Configuration for leasehold.
//!
//! Settings come from an optional YAML file (unknown fields are ignored so
//! older binaries keep reading newer files), then `LEASEHOLD_*` environment
//! overrides, then CLI flags applied by the command layer.

mod model;
mod operations;

#[cfg(test)]
mod tests;

pub use model::Config;
pub use operations::{CONFIG_FILE_NAME, ENV_PREFIX};
