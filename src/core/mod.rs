//! Core infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`context`] - Request-scoped deadlines
//! - [`time`] - Timestamps and injectable clocks
//! - [`error`] - Error types and kinds

pub mod config;
pub mod context;
pub mod error;
pub mod time;
