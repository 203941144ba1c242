//! Manifest Module Integration Tests
//!
//! Organizes all manifest-related integration tests for the flashq-cluster crate into a single test target.
//! Individual test modules are located in the tests/manifest/ directory.

mod manifest {
    pub mod manifest_tests;
}
