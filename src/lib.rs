//! apkforge - rule-driven Android package rewriting service
//!
//! This library crate exposes the binary's configuration loader and HTTP
//! surface for integration testing.

pub mod config;
pub mod server;
