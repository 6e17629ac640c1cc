use byteorder::{ByteOrder, LittleEndian};
use xxhash_rust::xxh64::xxh64;

use extval_common::{Result, verify_arg};

use crate::format::{
    BitmaskSize, FORMAT_VERSION, HEADER_SIZE, LEAF_CAPACITY, LEAF_TAG, LEVEL_BITS, MAX_LEVELS,
    TrieHashTableHeader, ValueSize, hash_key, level_chunk,
};

/// A single key/value pair together with its trie hash.
#[derive(Debug, Copy, Clone)]
struct TrieEntry {
    hash: u64,
    key: i64,
    value: f64,
}

/// Serializes 64-bit integer keys and 64-bit float values into a self-contained
/// trie hash table blob (see [`crate::format`] for the layout).
///
/// The blob supports point lookups directly over its bytes, so it can be written
/// to a file and memory-mapped without any deserialization step.
///
/// # Construction Process
///
/// 1. **Deduplication**: entries with equal keys are collapsed, the entry that
///    appears last in the input wins.
/// 2. **Hashing**: every key is mixed with [`hash_key`] to spread dense or
///    strided key ranges evenly across trie slots.
/// 3. **Trie layout**: at each level entries are grouped by the next
///    `LEVEL_BITS` bits of their hash. Groups small enough become leaves,
///    bigger ones become nodes. Children are written before their parent,
///    the root is written last.
pub struct TrieHashTableWriter {
    value_size: ValueSize,
    bitmask_size: BitmaskSize,
}

impl TrieHashTableWriter {
    pub fn new(value_size: ValueSize, bitmask_size: BitmaskSize) -> TrieHashTableWriter {
        TrieHashTableWriter {
            value_size,
            bitmask_size,
        }
    }

    /// Encodes parallel `keys`/`values` arrays into a blob.
    ///
    /// # Errors
    /// Returns an error if the arrays have different lengths.
    pub fn dump_doubles(&self, keys: &[i64], values: &[f64]) -> Result<Vec<u8>> {
        verify_arg!(values, keys.len() == values.len());

        let mut entries = unique_entries(keys, values);
        let mut blob = TrieBlob {
            data: vec![0u8; HEADER_SIZE],
            depth: 0,
        };
        let root = if entries.is_empty() {
            0
        } else {
            blob.write_subtree(&mut entries, 0)
        };

        let header = TrieHashTableHeader {
            version: FORMAT_VERSION,
            value_size: self.value_size,
            bitmask_size: self.bitmask_size,
            level_bits: LEVEL_BITS as u8,
            entries_count: entries.len() as u64,
            root,
            length: blob.data.len() as u64,
            checksum: xxh64(&blob.data[HEADER_SIZE..], 0),
            depth: blob.depth as u64,
        };
        header.write_to(&mut blob.data[..HEADER_SIZE]);
        Ok(blob.data)
    }
}

impl Default for TrieHashTableWriter {
    fn default() -> Self {
        TrieHashTableWriter::new(ValueSize::Long, BitmaskSize::Long)
    }
}

/// Blob under construction.
struct TrieBlob {
    data: Vec<u8>,
    depth: u32,
}

impl TrieBlob {
    /// Writes the subtree holding `entries` (all sharing the hash bits of the
    /// levels above `level`) and returns its reference.
    fn write_subtree(&mut self, entries: &mut [TrieEntry], level: u32) -> u64 {
        self.depth = self.depth.max(level);
        if entries.len() <= LEAF_CAPACITY || level >= MAX_LEVELS {
            return self.write_leaf(entries);
        }

        entries.sort_unstable_by_key(|e| level_chunk(e.hash, level));

        let mut bitmask = 0u64;
        let mut children = Vec::new();
        let mut start = 0;
        while start < entries.len() {
            let chunk = level_chunk(entries[start].hash, level);
            let end = start
                + entries[start..]
                    .iter()
                    .take_while(|e| level_chunk(e.hash, level) == chunk)
                    .count();
            bitmask |= 1u64 << chunk;
            children.push(self.write_subtree(&mut entries[start..end], level + 1));
            start = end;
        }

        let offset = self.data.len() as u64;
        self.push_u64(bitmask);
        for child in children {
            self.push_u64(child);
        }
        offset
    }

    fn write_leaf(&mut self, entries: &mut [TrieEntry]) -> u64 {
        entries.sort_unstable_by_key(|e| e.key);
        let offset = self.data.len() as u64;
        self.push_u64(entries.len() as u64);
        for entry in entries.iter() {
            self.push_u64(entry.key as u64);
            self.push_u64(entry.value.to_bits());
        }
        offset | LEAF_TAG
    }

    #[inline]
    fn push_u64(&mut self, value: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }
}

/// Collapses duplicate keys, keeping the value of the last occurrence.
fn unique_entries(keys: &[i64], values: &[f64]) -> Vec<TrieEntry> {
    let mut order = (0..keys.len()).collect::<Vec<_>>();
    // Stable sort keeps input order within equal keys.
    order.sort_by_key(|&i| keys[i]);

    let mut entries = Vec::<TrieEntry>::with_capacity(order.len());
    for i in order {
        match entries.last_mut() {
            Some(last) if last.key == keys[i] => last.value = values[i],
            _ => entries.push(TrieEntry {
                hash: hash_key(keys[i]),
                key: keys[i],
                value: values[i],
            }),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{LEAF_TAG, TrieHashTableHeader, is_leaf};

    #[test]
    fn test_empty_table() {
        let blob = TrieHashTableWriter::default().dump_doubles(&[], &[]).unwrap();
        assert_eq!(HEADER_SIZE, blob.len());
        let header = TrieHashTableHeader::read_from(&blob).unwrap();
        assert_eq!(0, header.entries_count);
        assert_eq!(0, header.root);
    }

    #[test]
    fn test_small_table_is_single_leaf() {
        let blob = TrieHashTableWriter::default()
            .dump_doubles(&[3, 1, 2], &[30.0, 10.0, 20.0])
            .unwrap();
        let header = TrieHashTableHeader::read_from(&blob).unwrap();
        assert_eq!(3, header.entries_count);
        assert!(is_leaf(header.root));
        assert_eq!(HEADER_SIZE as u64 | LEAF_TAG, header.root);
        assert_eq!(HEADER_SIZE + 8 + 3 * 16, blob.len());
    }

    #[test]
    fn test_large_table_has_nodes() {
        let keys = (0..10_000i64).collect::<Vec<_>>();
        let values = keys.iter().map(|&k| k as f64 * 0.5).collect::<Vec<_>>();
        let blob = TrieHashTableWriter::default()
            .dump_doubles(&keys, &values)
            .unwrap();
        let header = TrieHashTableHeader::read_from(&blob).unwrap();
        assert_eq!(10_000, header.entries_count);
        assert!(!is_leaf(header.root));
        assert!(header.depth >= 2);
        assert_eq!(header.checksum, xxh64(&blob[HEADER_SIZE..], 0));
    }

    #[test]
    fn test_duplicates_last_wins() {
        let entries = unique_entries(&[5, 1, 5, 2, 5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let pairs = entries
            .iter()
            .map(|e| (e.key, e.value))
            .collect::<Vec<_>>();
        assert_eq!(vec![(1, 2.0), (2, 4.0), (5, 5.0)], pairs);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(
            TrieHashTableWriter::default()
                .dump_doubles(&[1, 2], &[1.0])
                .is_err()
        );
    }
}
