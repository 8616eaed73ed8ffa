//! Configuration types for upstream signal providers.
//!
//! Includes the identifiers of providers, their serde-tagged configuration and the
//! resolution of credentials from configuration or the process environment.

#![warn(missing_docs)]

mod providers;
mod types;

pub use providers::*;
pub use types::*;
