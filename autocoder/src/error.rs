//! Typed failures that callers need to tell apart.
//!
//! Orchestration code works in `anyhow::Result`; these errors travel inside
//! `anyhow::Error` and are recovered with `downcast_ref` where the kind
//! matters (tests, CLI reporting).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    /// A write/delete/read target resolved outside the project root.
    #[error("refusing to touch '{path}': resolves outside project root {}", root.display())]
    Containment { path: String, root: PathBuf },

    /// The path names a file the orchestration layer owns (the manifest).
    #[error("refusing to touch reserved file '{0}'")]
    Reserved(String),

    /// A file that was expected to exist does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// Model output did not match the structured change-set shape.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// The model backend failed; carries the backend's own diagnostic text.
    #[error("oracle error: {0}")]
    Oracle(String),
}

impl ProjectError {
    pub fn is_containment(&self) -> bool {
        matches!(self, Self::Containment { .. })
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved(_))
    }
}
