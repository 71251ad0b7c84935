//! Common test utilities and helpers
//!
//! Shared fixtures (scratch workspaces, configurations, deploy environments)
//! and mock plugins used by the integration tests.

#![allow(dead_code)]

pub mod mock_plugins;
pub mod test_fixtures;
