//! Side-effecting operations: project files, subprocesses, the model backend
//! and external connectors.

pub mod config;
pub mod connectors;
pub mod handoff;
pub mod installer;
pub mod manifest;
pub mod materialize;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod runner;
pub mod snapshot;
pub mod store;
