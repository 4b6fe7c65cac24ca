//! Turn raw model output into a [`ChangeSet`].
//!
//! Two strategies are tried in order:
//!
//! 1. [`parse_structured`]: the response is a JSON object
//!    `{"entrypoint": ..., "files": [{"path", "content"}], "delete": [...]}`,
//!    optionally wrapped in a triple-backtick fence.
//! 2. [`parse_fenced`]: the response is loose prose with fenced code blocks
//!    whose info string names the target file.
//!
//! [`parse_response`] combines them: any structured failure falls back to
//! fenced parsing. Both tiers are pure and tested independently.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::types::{ChangeSet, FileEdit};
use crate::error::ProjectError;

static FILENAME_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*["']?([^\s"'`]+)["']?"#).expect("filename pattern is valid")
});

/// Settings that shape entrypoint inference for fenced responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Preferred entrypoint file name (e.g. `main.py`).
    pub default_entry: String,
    /// Extensions that mark a file as a runnable script.
    pub script_extensions: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            default_entry: "main.py".to_string(),
            script_extensions: vec![".py".to_string(), ".sh".to_string(), ".bat".to_string()],
        }
    }
}

/// Parse a response, preferring the structured form and falling back to fenced blocks.
pub fn parse_response(text: &str, options: &ParseOptions) -> ChangeSet {
    match parse_structured(text) {
        Ok(change_set) => change_set,
        Err(_) => parse_fenced(text, options),
    }
}

/// Strip surrounding whitespace and an optional fence wrapper (with its tag line).
pub fn strip_fence_wrapper(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let inner = trimmed.trim_matches('`');
    match inner.split_once('\n') {
        Some((_tag, rest)) => rest.trim(),
        None => inner.trim(),
    }
}

/// Parse the structured JSON change-set form.
pub fn parse_structured(text: &str) -> Result<ChangeSet, ProjectError> {
    let body = strip_fence_wrapper(text);
    let value: Value = serde_json::from_str(body)
        .map_err(|err| ProjectError::MalformedResponse(format!("invalid json: {err}")))?;
    let Value::Object(map) = value else {
        return Err(malformed("expected a json object"));
    };

    Ok(ChangeSet {
        entrypoint: structured_entrypoint(&map)?,
        files: structured_files(&map)?,
        deletes: structured_deletes(&map)?,
    })
}

fn structured_entrypoint(map: &Map<String, Value>) -> Result<Option<String>, ProjectError> {
    match map.get("entrypoint") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(entry)) if entry.trim().is_empty() => Ok(None),
        Some(Value::String(entry)) => Ok(Some(entry.trim().to_string())),
        Some(_) => Err(malformed("entrypoint must be a string")),
    }
}

fn structured_files(map: &Map<String, Value>) -> Result<Vec<FileEdit>, ProjectError> {
    let items = match map.get("files") {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed("files must be a list")),
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value::<FileEdit>(item.clone())
                .map_err(|err| malformed(&format!("files[{idx}]: {err}")))
        })
        .collect()
}

fn structured_deletes(map: &Map<String, Value>) -> Result<Vec<String>, ProjectError> {
    let items = match map.get("delete") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed("delete must be a list")),
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::String(path) => Ok(path.clone()),
            _ => Err(malformed(&format!("delete[{idx}] must be a string"))),
        })
        .collect()
}

fn malformed(message: &str) -> ProjectError {
    ProjectError::MalformedResponse(message.to_string())
}

/// Recover files from fenced code blocks tagged with a filename.
///
/// Accepted info strings: `lang path`, `filename=path` (optionally quoted, with
/// or without a leading language tag), `lang:path`, or a bare path-like token.
/// Fences without a filename (plain language tags, an outer wrapper) are skipped
/// and their contents ignored. Unclosed blocks are dropped.
pub fn parse_fenced(text: &str, options: &ParseOptions) -> ChangeSet {
    let mut files = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(info) = fence_info(line) else {
            continue;
        };
        let Some(path) = fence_filename(info) else {
            continue;
        };

        let mut body = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if is_closing_fence(inner) {
                closed = true;
                break;
            }
            body.push(inner);
        }
        if closed {
            files.push(FileEdit::new(path, trim_blank_lines(&body.join("\n"))));
        }
    }

    let entrypoint = infer_entrypoint(&files, options);
    ChangeSet {
        entrypoint,
        files,
        deletes: Vec::new(),
    }
}

/// Pick an entrypoint among script-like paths, preferring the default entry name.
pub fn infer_entrypoint(files: &[FileEdit], options: &ParseOptions) -> Option<String> {
    let candidates: Vec<&str> = files
        .iter()
        .map(|file| file.path.as_str())
        .filter(|path| {
            options
                .script_extensions
                .iter()
                .any(|ext| path.ends_with(ext.as_str()))
        })
        .collect();

    let preferred = file_name(&options.default_entry);
    candidates
        .iter()
        .find(|path| file_name(path) == preferred)
        .or_else(|| candidates.first())
        .map(|path| (*path).to_string())
}

/// Parse the dependency-plan response `{"packages": [...]}`.
pub fn parse_package_plan(text: &str) -> Result<Vec<String>, ProjectError> {
    let value: Value = serde_json::from_str(strip_fence_wrapper(text))
        .map_err(|err| ProjectError::MalformedResponse(format!("invalid json: {err}")))?;
    match value.get("packages") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()),
        Some(_) => Err(malformed("packages must be a list")),
    }
}

fn fence_info(line: &str) -> Option<&str> {
    line.trim_start()
        .strip_prefix("```")
        .map(|rest| rest.trim_start_matches('`'))
}

fn is_closing_fence(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '`')
}

fn fence_filename(info: &str) -> Option<String> {
    let info = info.trim();
    if let Some(caps) = FILENAME_ATTR_RE.captures(info) {
        return Some(caps[1].to_string());
    }

    let tokens: Vec<&str> = info
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '"' || c == '\''))
        .filter(|token| !token.is_empty())
        .collect();
    match tokens.as_slice() {
        [] => None,
        [single] => {
            let candidate = match single.split_once(':') {
                Some((_lang, path)) if looks_like_path(path) => path,
                _ => single,
            };
            looks_like_path(candidate).then(|| candidate.to_string())
        }
        [.., last] => Some((*last).to_string()),
    }
}

fn looks_like_path(token: &str) -> bool {
    token.contains('.') || token.contains('/')
}

fn trim_blank_lines(body: &str) -> String {
    body.trim_matches(|c| c == '\n' || c == '\r').to_string()
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
