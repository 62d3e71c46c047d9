//! # Broker Testing Utils
//!
//! Shared testing utilities for the rendezvous broker.
//!
//! ## Features
//!
//! - **Mock Channels**: recording, failing and gated implementations of `Channel`
//! - **Event Builders**: utilities for creating inbound events
//! - **Helpers**: fixtures and polling helpers for concurrent tests
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! broker-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! ```rust
//! use broker_testing_utils::*;
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
