//! Agent-driven project synthesis and self-repair.
//!
//! Given a natural-language task, autocoder asks a language model for a
//! multi-file project, writes it under a sandboxed root, runs it, and repairs
//! it in a bounded loop until it runs cleanly. The architecture keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (response parsing, path
//!   normalization, failure classification). No I/O.
//! - **[`io`]**: Side-effecting operations (project files, subprocesses, the
//!   model backend, connectors). Behind traits where tests need to script them.
//!
//! Orchestration modules ([`fix_loop`], [`create`], [`edit`], [`fleet`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod create;
pub mod edit;
pub mod error;
pub mod exit_codes;
pub mod fix_loop;
pub mod fleet;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
