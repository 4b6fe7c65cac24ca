//! Bounded textual snapshot of a project, used as model context.
//!
//! Layout:
//!
//! ```text
//! PROJECT TREE:
//! <sorted relative paths, one per line>
//! FILES:
//!
//! ===== <path> =====
//! <content>
//! ```
//!
//! Every emitted byte counts toward the limit. The first piece that would
//! push the total past the limit is replaced by [`TRUNCATION_MARKER`] and
//! emission stops, so a file is either rendered whole or not at all.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::io::store::ProjectStore;

pub const TRUNCATION_MARKER: &str = "\n<<SNAPSHOT TRUNCATED>>\n";

/// Render a snapshot of `store` whose length never exceeds
/// `byte_limit + TRUNCATION_MARKER.len()`.
#[instrument(skip_all, fields(root = %store.root().display(), byte_limit))]
pub fn snapshot(store: &ProjectStore, byte_limit: usize) -> Result<String> {
    let files = store.discover_all()?;
    let mut writer = BoundedWriter::new(byte_limit);

    let mut tree = String::from("PROJECT TREE:\n");
    tree.push_str(&files.join("\n"));
    tree.push_str("\nFILES:\n");
    if !writer.push(&tree) {
        return Ok(writer.finish());
    }

    for path in &files {
        let content = match store.read(path) {
            Ok(content) => content,
            Err(err) => format!("<<unable to read: {err:#}>>"),
        };
        let block = format!("\n===== {path} =====\n{content}\n");
        if !writer.push(&block) {
            break;
        }
    }

    debug!(
        files = files.len(),
        bytes = writer.buf.len(),
        truncated = writer.truncated,
        "snapshot rendered"
    );
    Ok(writer.finish())
}

/// Accumulates whole pieces until the byte budget would be exceeded.
struct BoundedWriter {
    buf: String,
    limit: usize,
    truncated: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Append `piece` if it fits; otherwise mark truncation and return false.
    fn push(&mut self, piece: &str) -> bool {
        if self.truncated {
            return false;
        }
        if self.buf.len() + piece.len() > self.limit {
            self.buf.push_str(TRUNCATION_MARKER);
            self.truncated = true;
            return false;
        }
        self.buf.push_str(piece);
        true
    }

    fn finish(self) -> String {
        self.buf
    }
}
