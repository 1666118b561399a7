//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - A recording, scriptable remote authority
//! - Record fixtures for the sales and catalog kinds
//! - Engine builders over the in-memory and SQLite stores

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_remote;

pub use fixtures::*;
pub use mock_remote::*;
