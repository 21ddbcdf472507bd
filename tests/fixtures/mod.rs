//! Test fixtures for courier-routing.
//!
//! Provides realistic test data including:
//! - Real Jakarta / Jabodetabek locations
//! - A scripted distance oracle that records every call

#![allow(dead_code)]

pub mod jakarta_locations;
pub mod scripted_oracle;

pub use jakarta_locations::*;
pub use scripted_oracle::*;
