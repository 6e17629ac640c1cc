//! Build command implementation

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use extval_store::parse_values;
use extval_trie::TrieHashTableWriter;

use crate::utils;

pub fn run(file: String, output: String) -> Result<()> {
    utils::validate_file_exists(&file)?;
    let start_time = Instant::now();

    let parsed = parse_values(Path::new(&file)).with_context(|| format!("Failed to parse {file}"))?;
    let blob = TrieHashTableWriter::default()
        .dump_doubles(&parsed.keys, &parsed.values)
        .context("Failed to encode trie hash table")?;

    let output_path = Path::new(&output);
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temp file in {}", dir.display()))?;
    temp.write_all(&blob)
        .with_context(|| format!("Failed to write {output}"))?;
    temp.persist(output_path)
        .with_context(|| format!("Failed to write {output}"))?;

    println!("Built {output}:");
    println!("  Source entries: {}", parsed.len());
    println!("  Table size: {}", utils::format_size(blob.len() as u64));
    println!(
        "  Total time: {:.3} seconds",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
