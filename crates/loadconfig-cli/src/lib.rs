//! loadconfig CLI library
//!
//! Exposes the command-line entry points so the binary stays a one-liner
//! and the behaviour can be driven with in-memory streams.

mod cli;

pub use cli::{run, run_with, LOG_ENV};
