//! Integration test suite for launchkit
//!
//! End-to-end tests that drive the update engine and the `launchkit` binary
//! against mock release servers.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **end_to_end**: Full client updates through the GitHub release API
//! - **concurrency**: Trigger coalescing and the cross-process job lock
//! - **cancellation**: Cancelling downloads and consent prompts
//! - **failures**: Network, integrity, and archive failures leave installs intact
//! - **cli**: The console commands

#[path = "../common/mod.rs"]
mod common;

mod cancellation;
mod cli;
mod concurrency;
mod end_to_end;
mod failures;
