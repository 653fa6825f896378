//! Shared helpers for Forge integration tests.

pub mod helpers;
