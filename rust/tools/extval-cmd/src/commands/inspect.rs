//! Inspect command implementation

use anyhow::{Context, Result};
use serde::Serialize;

use crate::utils;

#[derive(Serialize)]
struct InspectSummary {
    path: String,
    size: String,
    header: HeaderInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum_valid: Option<bool>,
}

#[derive(Serialize)]
struct HeaderInfo {
    version: u8,
    value_size: u8,
    bitmask_size: u8,
    level_bits: u8,
    entries_count: u64,
    root: u64,
    length: u64,
    checksum: String,
    depth: u64,
}

pub fn run(verify: bool, file: String) -> Result<()> {
    let table = utils::open_table(&file)?;
    let header = table.header();

    let checksum_valid = if verify {
        let result = table.verify();
        if let Err(e) = &result {
            log::error!("{file}: {e}");
        }
        Some(result.is_ok())
    } else {
        None
    };

    let summary = InspectSummary {
        size: utils::format_size(table.size_bytes()),
        header: HeaderInfo {
            version: header.version,
            value_size: header.value_size as u8,
            bitmask_size: header.bitmask_size as u8,
            level_bits: header.level_bits,
            entries_count: header.entries_count,
            root: header.root,
            length: header.length,
            checksum: format!("{:016x}", header.checksum),
            depth: header.depth,
        },
        checksum_valid,
        path: file,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
    );
    if summary.checksum_valid == Some(false) {
        anyhow::bail!("Checksum verification failed");
    }
    Ok(())
}
