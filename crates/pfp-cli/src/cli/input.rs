//! Identifier list parsing: `.json`, `.csv`, or plain text by file extension.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    /// CSV column: 0-based index or header name.
    pub column: String,
    /// Field read from each object when the JSON root is an array of objects.
    pub json_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputFormat {
    Json,
    Csv,
    Text,
}

impl InputFormat {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => InputFormat::Json,
            Some("csv") => InputFormat::Csv,
            _ => InputFormat::Text,
        }
    }
}

/// Read identifiers from `path`. Entries are trimmed, a leading `@` is
/// dropped, empty entries are skipped and duplicates keep their first position.
pub fn read_identifiers(path: &Path, opts: &InputOptions) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read input file: {}", path.display()))?;
    let entries = match InputFormat::from_path(path) {
        InputFormat::Json => parse_json(&raw, opts.json_key.as_deref())?,
        InputFormat::Csv => parse_csv(&raw, &opts.column)?,
        InputFormat::Text => raw.lines().map(str::to_string).collect(),
    };
    Ok(normalize(entries))
}

fn normalize(entries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|e| e.trim().trim_start_matches('@').trim().to_string())
        .filter(|e| !e.is_empty())
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

fn parse_json(raw: &str, key: Option<&str>) -> Result<Vec<String>> {
    let root: Value = serde_json::from_str(raw).context("parse JSON input")?;
    let Value::Array(items) = root else {
        bail!("JSON root must be an array");
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let value = match (key, item) {
            (Some(k), Value::Object(mut obj)) => match obj.remove(k) {
                Some(v) => v,
                None => continue,
            },
            (None, Value::Object(_)) => bail!("JSON input holds objects; pass --json-key"),
            (_, other) => other,
        };
        match value {
            Value::String(s) => out.push(s),
            Value::Number(n) => out.push(n.to_string()),
            Value::Null => {}
            other => bail!("unsupported JSON identifier: {}", other),
        }
    }
    Ok(out)
}

fn parse_csv(raw: &str, column: &str) -> Result<Vec<String>> {
    let mut rows = raw.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let header = split_row(header);
    let idx = match column.trim().parse::<usize>() {
        Ok(i) => i,
        Err(_) => header
            .iter()
            .position(|h| h == column.trim())
            .with_context(|| format!("CSV column not found: {}", column))?,
    };
    Ok(rows
        .filter_map(|row| split_row(row).into_iter().nth(idx))
        .collect())
}

/// Comma split with surrounding quotes removed. No embedded commas.
fn split_row(row: &str) -> Vec<String> {
    row.split(',')
        .map(|cell| cell.trim().trim_matches('"').to_string())
        .collect()
}
