//! aso-server library crate.
//!
//! This module exposes the core functionality for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod insights;
pub mod jobs;
pub mod pipeline;
pub mod ratelimit;

pub use error::{Error, Result};
