//! Shared test utilities for the cadence scheduler.
//!
//! # Modules
//!
//! - [`mod@must`] - `must_some`, an `Option` unwrap with `#[track_caller]`
//! - [`mock`] - Workers with scripted timing and failures
//! - [`sink`] - A log sink that records every message
//! - [`wait`] - Polling helpers and tracing setup
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! cadence-test-helpers = { path = "crates/cadence-test-helpers" }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]

pub mod mock;
pub mod must;
pub mod prelude;
pub mod sink;
pub mod wait;

pub use must::*;
