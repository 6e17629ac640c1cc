use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use extval_common::{Result, error::Error};

/// Keys and values read from a source file, in file order.
///
/// Duplicate keys are kept, the providers built from this resolve them in
/// favor of the last occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedValues {
    pub keys: Vec<i64>,
    pub values: Vec<f64>,
    pub min_key: i64,
    pub max_key: i64,
    pub min_value: f64,
    pub max_value: f64,
}

impl ParsedValues {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Appends an entry, updating the key and value ranges.
    pub fn push(&mut self, key: i64, value: f64) {
        if self.keys.is_empty() {
            self.min_key = key;
            self.max_key = key;
            self.min_value = value;
            self.max_value = value;
        } else {
            self.min_key = self.min_key.min(key);
            self.max_key = self.max_key.max(key);
            // NaN never wins `min`/`max`, which keeps the ranges finite
            // whenever at least one finite value exists.
            self.min_value = self.min_value.min(value);
            self.max_value = self.max_value.max(value);
        }
        self.keys.push(key);
        self.values.push(value);
    }
}

/// Reads a `key=value` source file.
///
/// Surrounding whitespace is ignored, so are blank lines and lines starting
/// with `#`. Every other line must hold exactly one `=` with an `i64` key on
/// its left and an `f64` value on its right.
pub fn parse_values(path: &Path) -> Result<ParsedValues> {
    let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    let mut parsed = ParsedValues::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| Error::parse(path, line_number, e.to_string()))?;
        if let Some((key, value)) = parse_line(&line)
            .map_err(|message| Error::parse(path, line_number, message))?
        {
            parsed.push(key, value);
        }
    }
    log::info!("Parsed {} values from [{}]", parsed.len(), path.display());
    Ok(parsed)
}

fn parse_line(line: &str) -> std::result::Result<Option<(i64, f64)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (key, value) = line
        .split_once('=')
        .ok_or_else(|| "missing '='".to_string())?;
    if value.contains('=') {
        return Err("more than one '='".to_string());
    }
    let key = key
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid key '{}': {e}", key.trim()))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value '{}': {e}", value.trim()))?;
    Ok(Some((key, value)))
}
