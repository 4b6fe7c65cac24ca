//! Append-only handoff note at the project root.
//!
//! The note is a human-readable log of what changed and why. Writing it is
//! best effort: a failure is logged and never interrupts the operation that
//! produced the note.

use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, warn};

use crate::io::store::ProjectStore;

/// Append a titled entry stamped with the local time.
pub fn append_note(store: &ProjectStore, title: &str, body: &str) {
    if let Err(err) = try_append(store, title, body) {
        warn!(err = %format!("{err:#}"), title, "failed to append handoff note");
    }
}

fn try_append(store: &ProjectStore, title: &str, body: &str) -> Result<()> {
    let path = store.handoff_path();
    let entry = render_entry(title, &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), body);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(entry.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    debug!(path = %path.display(), title, "handoff note appended");
    Ok(())
}

fn render_entry(title: &str, timestamp: &str, body: &str) -> String {
    format!("# {title}\n\nTime: {timestamp}\n\n{body}\n\n")
}
