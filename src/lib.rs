//! db-warden - natural-language questions answered with verified, read-only SQL.
//!
//! This library exposes the core modules for the `warden` binary and for
//! integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod safety;
