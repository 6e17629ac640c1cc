//! Lookup command implementation

use anyhow::Result;

use crate::utils;

pub fn run(file: String, keys: Vec<i64>) -> Result<()> {
    let table = utils::open_table(&file)?;
    let mut found = 0;
    for key in keys.iter().copied() {
        match table.get(key) {
            Some(value) => {
                println!("{key}={value}");
                found += 1;
            }
            None => println!("{key}: not found"),
        }
    }
    log::debug!("{found} of {} keys found in {file}", keys.len());
    Ok(())
}
