//! Parse command implementation

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use extval_store::{ValuesEncoding, parse_values, select_encoding};

use crate::utils;

#[derive(Serialize)]
struct ParseSummary {
    path: String,
    file_size: String,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    ranges: Option<RangesInfo>,
    encoding: EncodingInfo,
}

#[derive(Serialize)]
struct RangesInfo {
    min_key: i64,
    max_key: i64,
    min_value: f64,
    max_value: f64,
}

#[derive(Serialize)]
struct EncodingInfo {
    encoding: ValuesEncoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    scaling_factor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<i64>,
    estimated_size: String,
}

pub fn run(scaling_factor: Option<i64>, file: String) -> Result<()> {
    utils::validate_file_exists(&file)?;
    let path = Path::new(&file);
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata of {file}"))?
        .len();
    let parsed = parse_values(path).with_context(|| format!("Failed to parse {file}"))?;

    let plan = select_encoding(&parsed, scaling_factor);
    let ranges = (!parsed.is_empty()).then(|| RangesInfo {
        min_key: parsed.min_key,
        max_key: parsed.max_key,
        min_value: parsed.min_value,
        max_value: parsed.max_value,
    });
    let summary = ParseSummary {
        path: file,
        file_size: utils::format_size(file_size),
        count: parsed.len(),
        ranges,
        encoding: EncodingInfo {
            encoding: plan.encoding,
            scaling_factor: plan.scale.map(|scale| scale.factor),
            base: plan.scale.map(|scale| scale.base),
            // Duplicates are counted, so this is an upper bound.
            estimated_size: utils::format_size(
                (plan.encoding.entry_size() * parsed.len()) as u64,
            ),
        },
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
