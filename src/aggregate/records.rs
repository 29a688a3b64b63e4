// src/aggregate/records.rs

use anyhow::{bail, Context, Result};
use glob::{glob, Pattern};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::trace;

/// One award: whatever keys the file carried, in file order.
pub type Record = Map<String, Value>;

pub const RECORD_EXTENSION: &str = "json";

/// Every `*.json` file directly inside an immediate subdirectory of
/// `data_dir`, in lexicographic path order. Bucket names are not checked.
pub fn list_record_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        bail!("staging directory {} does not exist", data_dir.display());
    }

    let pattern = format!(
        "{}/*/*.{}",
        Pattern::escape(&data_dir.to_string_lossy()),
        RECORD_EXTENSION
    );
    let mut files = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("bad glob pattern {}", pattern))? {
        let path = entry.context("listing staging directory")?;
        if path.is_file() {
            trace!(file = %path.display(), "found record file");
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse one record file. Anything other than a JSON object is an error.
pub fn read_record(path: &Path) -> Result<Record> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!(
            "{} holds a JSON {} instead of an object",
            path.display(),
            json_kind(&other)
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
