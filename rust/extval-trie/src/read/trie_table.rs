use byteorder::{ByteOrder, LittleEndian};
use xxhash_rust::xxh64::xxh64;

use extval_common::{Result, error::ErrorKind};

use crate::format::{
    HEADER_SIZE, MAX_LEVELS, TrieHashTableHeader, hash_key, is_leaf, level_chunk,
    reference_offset,
};

/// A reader for trie hash tables produced by
/// [`TrieHashTableWriter`](crate::TrieHashTableWriter).
///
/// The reader works directly on top of the serialized bytes: `B` is anything
/// exposing a byte slice, typically a read-only memory map of the `.amt` file
/// or a `Vec<u8>`. Opening validates the header only, lookups touch just the
/// nodes on the path to the key and one leaf.
///
/// # Usage
///
/// ```rust,ignore
/// let file = std::fs::File::open(path)?;
/// let mmap = unsafe { memmap2::Mmap::map(&file)? };
/// let table = TrieHashTable::open(mmap)?;
///
/// let price = table.get(42).unwrap_or(f64::NAN);
/// ```
pub struct TrieHashTable<B> {
    data: B,
    header: TrieHashTableHeader,
}

impl<B: AsRef<[u8]>> TrieHashTable<B> {
    /// Wraps the serialized table, validating its header.
    ///
    /// # Errors
    /// Returns an `InvalidFormat` error if the magic, the format version, the
    /// value/bitmask sizes or the recorded length do not match.
    pub fn open(data: B) -> Result<TrieHashTable<B>> {
        let header = TrieHashTableHeader::read_from(data.as_ref())?;
        Ok(TrieHashTable { data, header })
    }

    pub fn header(&self) -> &TrieHashTableHeader {
        &self.header
    }

    /// Number of distinct keys in the table.
    pub fn len(&self) -> usize {
        self.header.entries_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.entries_count == 0
    }

    /// Size of the serialized table in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.header.length
    }

    /// Looks up the value stored for `key`.
    ///
    /// Returns `None` when the key is absent. A corrupted blob never panics,
    /// an out-of-bounds reference is reported as a missing key.
    pub fn get(&self, key: i64) -> Option<f64> {
        if self.header.root == 0 {
            return None;
        }
        let hash = hash_key(key);
        let mut reference = self.header.root;
        for level in 0..MAX_LEVELS {
            if is_leaf(reference) {
                return self.find_in_leaf(reference_offset(reference), key);
            }
            let bitmask = self.read_u64(reference)?;
            let chunk = level_chunk(hash, level);
            let bit = 1u64 << chunk;
            if bitmask & bit == 0 {
                return None;
            }
            let child_index = (bitmask & (bit - 1)).count_ones() as u64;
            reference = self.read_u64(reference + 8 + child_index * 8)?;
        }
        // The hash is fully consumed: only a leaf may follow.
        if is_leaf(reference) {
            return self.find_in_leaf(reference_offset(reference), key);
        }
        None
    }

    /// Verifies the checksum of the table body.
    ///
    /// This reads the whole table, so it is meant for diagnostics rather than
    /// the lookup path.
    pub fn verify(&self) -> Result<()> {
        let body = &self.data.as_ref()[HEADER_SIZE..];
        if xxh64(body, 0) != self.header.checksum {
            return Err(ErrorKind::ChecksumMismatch {
                element: "trie hash table".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn into_inner(self) -> B {
        self.data
    }

    fn find_in_leaf(&self, offset: u64, key: i64) -> Option<f64> {
        let count = self.read_u64(offset)?;
        let mut pos = offset + 8;
        for _ in 0..count {
            let entry_key = self.read_u64(pos)? as i64;
            if entry_key == key {
                return self.read_u64(pos + 8).map(f64::from_bits);
            }
            if entry_key > key {
                // Leaf entries are sorted by key.
                return None;
            }
            pos += 16;
        }
        None
    }

    #[inline]
    fn read_u64(&self, offset: u64) -> Option<u64> {
        let start = usize::try_from(offset).ok()?;
        let bytes = self.data.as_ref().get(start..start.checked_add(8)?)?;
        Some(LittleEndian::read_u64(bytes))
    }
}

impl<B> std::fmt::Debug for TrieHashTable<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieHashTable")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrieHashTableWriter;

    #[test]
    fn test_lookup_small() {
        let blob = TrieHashTableWriter::default()
            .dump_doubles(&[10, -3, 7], &[1.5, -2.25, 0.0])
            .unwrap();
        let table = TrieHashTable::open(blob).unwrap();
        assert_eq!(3, table.len());
        assert_eq!(Some(1.5), table.get(10));
        assert_eq!(Some(-2.25), table.get(-3));
        assert_eq!(Some(0.0), table.get(7));
        assert_eq!(None, table.get(8));
        assert_eq!(None, table.get(i64::MIN));
        table.verify().unwrap();
    }

    #[test]
    fn test_lookup_empty() {
        let blob = TrieHashTableWriter::default().dump_doubles(&[], &[]).unwrap();
        let table = TrieHashTable::open(blob.as_slice()).unwrap();
        assert!(table.is_empty());
        assert_eq!(None, table.get(0));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let keys = (0..1000i64).collect::<Vec<_>>();
        let values = vec![1.0; keys.len()];
        let blob = TrieHashTableWriter::default()
            .dump_doubles(&keys, &values)
            .unwrap();
        assert!(TrieHashTable::open(&blob[..blob.len() - 8]).is_err());
    }

    #[test]
    fn test_node_cycle_is_missing_key() {
        // A single root node whose 64 children all point back to itself.
        let node_offset = HEADER_SIZE as u64;
        let length = HEADER_SIZE + 8 + 64 * 8;
        let mut blob = vec![0u8; length];
        TrieHashTableHeader {
            version: crate::format::FORMAT_VERSION,
            value_size: crate::format::ValueSize::Long,
            bitmask_size: crate::format::BitmaskSize::Long,
            level_bits: crate::format::LEVEL_BITS as u8,
            entries_count: 1,
            root: node_offset,
            length: length as u64,
            checksum: 0,
            depth: MAX_LEVELS as u64,
        }
        .write_to(&mut blob);
        LittleEndian::write_u64(&mut blob[HEADER_SIZE..], u64::MAX);
        for child in 0..64 {
            let pos = HEADER_SIZE + 8 + child * 8;
            LittleEndian::write_u64(&mut blob[pos..pos + 8], node_offset);
        }

        let table = TrieHashTable::open(blob).unwrap();
        for key in [42, 0, -1, i64::MIN, i64::MAX] {
            assert_eq!(None, table.get(key));
        }
    }

    #[test]
    fn test_corrupted_body_detected() {
        let keys = (0..1000i64).collect::<Vec<_>>();
        let values = vec![1.0; keys.len()];
        let mut blob = TrieHashTableWriter::default()
            .dump_doubles(&keys, &values)
            .unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        let table = TrieHashTable::open(blob).unwrap();
        assert!(matches!(
            table.verify().unwrap_err().kind(),
            ErrorKind::ChecksumMismatch { .. }
        ));
    }
}
