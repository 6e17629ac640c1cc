//! Disk-resident trie hash table mapping 64-bit integer keys to 64-bit float
//! values.
//!
//! [`TrieHashTableWriter`] serializes a key/value dataset into a single blob,
//! [`TrieHashTable`] answers point lookups straight from that blob, which is
//! usually a read-only memory map of the file it was written to.

pub mod format;
mod read;
mod write;

pub use format::{BitmaskSize, TrieHashTableHeader, ValueSize};
pub use read::trie_table::TrieHashTable;
pub use write::builder::TrieHashTableWriter;
