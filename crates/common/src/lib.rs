//! Verdant-Common: shared types and error handling for the Verdant hub
//!
//! This crate provides the error taxonomy and small utility functions used
//! across the Verdant workspace.

pub mod error;
pub mod time;

pub use error::{HubError, Result};
pub use time::unix_now;
