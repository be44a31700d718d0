//! Shared storage integration tests.
//!
//! Tests the VersionStore contract against all implementations.
//! Each backend test binary imports these test functions and runs them.

pub mod version_store_tests;
