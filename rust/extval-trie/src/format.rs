//! Layout definitions of the trie hash table blob.
//!
//! All integers are little-endian and every structure starts at an 8-byte
//! aligned offset.
//!
//! ```text
//! Header (48 bytes)
//!   0..4    magic "XTHT"
//!   4       format version
//!   5       value size in bytes (8, f64)
//!   6       bitmask size in bytes (8, u64)
//!   7       bits per trie level
//!   8..16   entries count
//!   16..24  root reference (0 for an empty table)
//!   24..32  total blob length
//!   32..40  xxh64 of bytes 48..length
//!   40..48  depth of the deepest node
//!
//! Node:  bitmask: u64, then popcount(bitmask) child references: u64
//! Leaf:  count: u64, then count x (key: i64, value: f64), sorted by key
//! ```
//!
//! A reference is the byte offset of a node or a leaf; leaves have the lowest
//! bit set. The trie is keyed by `hash_key(key)`, consuming `LEVEL_BITS` bits
//! per level starting from the least significant ones.

use byteorder::{ByteOrder, LittleEndian};

use extval_common::{Result, error::Error, verify_data};

pub const MAGIC: &[u8; 4] = b"XTHT";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 48;

/// Number of hash bits consumed by one trie level. A level fans out into at
/// most `1 << LEVEL_BITS` children, which must fit the 64-bit node bitmask.
pub const LEVEL_BITS: u32 = 6;
pub const LEVEL_MASK: u64 = (1 << LEVEL_BITS) - 1;

/// Number of levels needed to consume the whole 64-bit hash.
pub const MAX_LEVELS: u32 = u64::BITS.div_ceil(LEVEL_BITS);

/// Subtrees holding at most this many entries are stored as leaves.
pub const LEAF_CAPACITY: usize = 8;

pub const LEAF_TAG: u64 = 1;

/// Size of a single stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueSize {
    Long = 8,
}

/// Size of the per-node children bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitmaskSize {
    Long = 8,
}

/// Decoded blob header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieHashTableHeader {
    pub version: u8,
    pub value_size: ValueSize,
    pub bitmask_size: BitmaskSize,
    pub level_bits: u8,
    pub entries_count: u64,
    pub root: u64,
    pub length: u64,
    pub checksum: u64,
    pub depth: u64,
}

impl TrieHashTableHeader {
    pub fn write_to(&self, target: &mut [u8]) {
        assert!(target.len() >= HEADER_SIZE);
        target[0..4].copy_from_slice(MAGIC);
        target[4] = self.version;
        target[5] = self.value_size as u8;
        target[6] = self.bitmask_size as u8;
        target[7] = self.level_bits;
        LittleEndian::write_u64(&mut target[8..16], self.entries_count);
        LittleEndian::write_u64(&mut target[16..24], self.root);
        LittleEndian::write_u64(&mut target[24..32], self.length);
        LittleEndian::write_u64(&mut target[32..40], self.checksum);
        LittleEndian::write_u64(&mut target[40..48], self.depth);
    }

    pub fn read_from(data: &[u8]) -> Result<TrieHashTableHeader> {
        if data.len() < HEADER_SIZE {
            return Err(Error::invalid_format(format!(
                "trie hash table is too small: {} bytes",
                data.len()
            )));
        }
        let magic = &data[0..4];
        verify_data!(magic, magic == MAGIC);
        let version = data[4];
        verify_data!(version, version == FORMAT_VERSION);
        let value_size = data[5];
        verify_data!(value_size, value_size == ValueSize::Long as u8);
        let bitmask_size = data[6];
        verify_data!(bitmask_size, bitmask_size == BitmaskSize::Long as u8);
        let level_bits = data[7];
        verify_data!(level_bits, level_bits as u32 == LEVEL_BITS);

        let header = TrieHashTableHeader {
            version,
            value_size: ValueSize::Long,
            bitmask_size: BitmaskSize::Long,
            level_bits,
            entries_count: LittleEndian::read_u64(&data[8..16]),
            root: LittleEndian::read_u64(&data[16..24]),
            length: LittleEndian::read_u64(&data[24..32]),
            checksum: LittleEndian::read_u64(&data[32..40]),
            depth: LittleEndian::read_u64(&data[40..48]),
        };
        let length = header.length;
        verify_data!(length, length == data.len() as u64);
        let root = header.root;
        verify_data!(root, root == 0 || (root as usize) >= HEADER_SIZE);
        verify_data!(root, root < length);
        let depth = header.depth;
        verify_data!(depth, depth <= MAX_LEVELS as u64);
        Ok(header)
    }
}

/// Bijective 64-bit mixer (splitmix64 finalizer). Being a bijection, distinct
/// keys never collide, so a fully consumed hash identifies a single key.
#[inline]
pub fn hash_key(key: i64) -> u64 {
    let mut z = key as u64;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Returns the child slot of `hash` at the given trie level.
#[inline]
pub fn level_chunk(hash: u64, level: u32) -> u32 {
    ((hash >> (level * LEVEL_BITS)) & LEVEL_MASK) as u32
}

#[inline]
pub fn is_leaf(reference: u64) -> bool {
    reference & LEAF_TAG != 0
}

#[inline]
pub fn reference_offset(reference: u64) -> u64 {
    reference & !LEAF_TAG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_is_injective_on_sample() {
        let mut seen = std::collections::HashSet::new();
        for key in -5000i64..5000 {
            assert!(seen.insert(hash_key(key)));
        }
        assert!(seen.insert(hash_key(i64::MIN)));
        assert!(seen.insert(hash_key(i64::MAX)));
    }

    #[test]
    fn test_level_chunks_cover_hash() {
        let hash = 0xfedc_ba98_7654_3210u64;
        let mut restored = 0u64;
        for level in 0..MAX_LEVELS {
            restored |= (level_chunk(hash, level) as u64) << (level * LEVEL_BITS);
        }
        assert_eq!(hash, restored);
        assert_eq!(MAX_LEVELS, 11);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let header = TrieHashTableHeader {
            version: FORMAT_VERSION,
            value_size: ValueSize::Long,
            bitmask_size: BitmaskSize::Long,
            level_bits: LEVEL_BITS as u8,
            entries_count: 0,
            root: 0,
            length: HEADER_SIZE as u64,
            checksum: 0,
            depth: 0,
        };
        let mut data = vec![0u8; HEADER_SIZE];
        header.write_to(&mut data);
        assert_eq!(header, TrieHashTableHeader::read_from(&data).unwrap());

        data[0] = b'Y';
        assert!(TrieHashTableHeader::read_from(&data).is_err());
        assert!(TrieHashTableHeader::read_from(&data[..20]).is_err());
    }
}
