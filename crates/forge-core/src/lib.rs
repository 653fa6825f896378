//! # forge-core
//! Foundation types and traits for the Forge royalty attribution engine.

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
