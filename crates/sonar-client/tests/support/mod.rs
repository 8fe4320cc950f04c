//! Shared helpers for SONAR client behaviour tests.

pub mod fake_server;
