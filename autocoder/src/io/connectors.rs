//! Per-project tool connectors declared in `connectors.yaml`.
//!
//! ```yaml
//! tools:
//!   db.users.count:
//!     kind: sqlite
//!     path: data/app.db
//!     query: "SELECT COUNT(*) FROM users WHERE name = '{arg}';"
//!   http.get.github:
//!     kind: http_get
//!     base: "https://api.github.com"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::store::ProjectStore;

const USER_AGENT: &str = concat!("autocoder/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorsFile {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolSpec {
    /// Run one query; `{arg}` in the query is replaced by the call argument.
    Sqlite { path: String, query: String },
    /// GET `<base>/<arg>`.
    HttpGet { base: String },
    /// POST a JSON body; a call argument that parses as JSON replaces it.
    HttpPost {
        url: String,
        #[serde(default = "empty_object")]
        json: Value,
    },
    /// Return a document's text.
    DocRead { path: String },
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Load the connectors file from the project root.
pub fn load_connectors(store: &ProjectStore, file_name: &str) -> Result<ConnectorsFile> {
    let path = store.resolve(file_name)?;
    if !path.is_file() {
        return Err(anyhow!(
            "no {file_name} found in project {}",
            store.root().display()
        ));
    }
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(ConnectorsFile::default());
    }
    serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Invoke connector `tool` and return its textual output.
#[instrument(skip_all, fields(tool = %tool, has_arg = arg.is_some()))]
pub fn call_tool(
    store: &ProjectStore,
    file_name: &str,
    tool: &str,
    arg: Option<&str>,
) -> Result<String> {
    let connectors = load_connectors(store, file_name)?;
    let resolved = connectors
        .tools
        .get(tool)
        .ok_or_else(|| anyhow!("tool '{tool}' not found in {file_name}"))?;
    debug!(tool = ?resolved, "resolved connector");

    match resolved {
        ToolSpec::Sqlite { path, query } => {
            let db_path = local_path(store, path)?;
            let query = match arg {
                Some(arg) => query.replace("{arg}", arg),
                None => query.clone(),
            };
            sqlite_query(&db_path, &query)
        }
        ToolSpec::HttpGet { base } => http_get(&join_url(base, arg)),
        ToolSpec::HttpPost { url, json } => http_post(url, &post_body(json, arg)),
        ToolSpec::DocRead { path } => {
            if Path::new(path).is_absolute() {
                fs::read_to_string(path).with_context(|| format!("read document {path}"))
            } else {
                store
                    .read(path)
                    .with_context(|| format!("read document {path}"))
            }
        }
    }
}

/// Relative connector paths are project files; absolute ones are used as given.
fn local_path(store: &ProjectStore, path: &str) -> Result<PathBuf> {
    if Path::new(path).is_absolute() {
        Ok(PathBuf::from(path))
    } else {
        Ok(store.resolve(path)?)
    }
}

fn sqlite_query(db_path: &Path, query: &str) -> Result<String> {
    info!(db = %db_path.display(), "running sqlite query");
    let conn = Connection::open(db_path)
        .with_context(|| format!("open sqlite database {}", db_path.display()))?;
    let mut stmt = conn
        .prepare(query)
        .with_context(|| format!("prepare query: {query}"))?;
    let columns = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(columns);
            for idx in 0..columns {
                values.push(sql_to_json(row.get_ref(idx)?));
            }
            Ok(Value::Array(values))
        })
        .context("execute query")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("read query rows")?;
    Ok(serde_json::to_string_pretty(&rows)?)
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

fn join_url(base: &str, arg: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match arg.map(|a| a.trim_start_matches('/')) {
        Some(path) if !path.is_empty() => format!("{base}/{path}"),
        _ => base.to_string(),
    }
}

fn post_body(default: &Value, arg: Option<&str>) -> Value {
    arg.and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| default.clone())
}

fn client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("build http client")
}

fn http_get(url: &str) -> Result<String> {
    info!(url, "http get");
    let response = client()?
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?;
    read_body(url, response)
}

fn http_post(url: &str, body: &Value) -> Result<String> {
    info!(url, "http post");
    let response = client()?
        .post(url)
        .json(body)
        .send()
        .with_context(|| format!("POST {url}"))?;
    read_body(url, response)
}

fn read_body(url: &str, response: reqwest::blocking::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        warn!(url, status = %status, "connector request returned an error status");
    }
    response
        .text()
        .with_context(|| format!("read response body from {url}"))
}
