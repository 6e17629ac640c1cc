//! Common utilities for extval-cmd

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

use extval_trie::TrieHashTable;
use memmap2::Mmap;

/// Checks if a file exists and is a regular file
pub fn validate_file_exists(path: &str) -> Result<()> {
    let file_path = Path::new(path);
    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", path);
    }
    if !file_path.is_file() {
        anyhow::bail!("Path is not a file: {}", path);
    }
    Ok(())
}

/// Memory-maps a trie hash table file
pub fn open_table(path: &str) -> Result<TrieHashTable<Mmap>> {
    validate_file_exists(path)?;
    let file = File::open(path).with_context(|| format!("Failed to open {path}"))?;
    // SAFETY: the mapping is read-only and the command does not outlive the file.
    let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to map {path}"))?;
    TrieHashTable::open(mmap).with_context(|| format!("Invalid trie hash table: {path}"))
}

/// Formats file size in human-readable format
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
