use std::{
    fs::File,
    path::{Path, PathBuf},
};

use memmap2::Mmap;

use extval_common::{Result, error::Error};
use extval_trie::TrieHashTable;

/// Values served straight from a memory-mapped trie hash table file.
///
/// The mapping lives as long as this value. Replacing the file on disk does
/// not affect it: artifacts are only ever swapped in by rename, so the mapped
/// inode stays intact until the last reader drops the provider.
pub struct MappedValues {
    table: TrieHashTable<Mmap>,
    path: PathBuf,
}

impl MappedValues {
    pub fn open(path: &Path) -> Result<MappedValues> {
        let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        // SAFETY: the file is never written in place, see the type docs.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::io(format!("mmap {}", path.display()), e))?;
        let table = TrieHashTable::open(mmap)?;
        log::debug!(
            "Mapped [{}]: {} entries, {} bytes, depth {}",
            path.display(),
            table.len(),
            table.size_bytes(),
            table.header().depth
        );
        Ok(MappedValues {
            table,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn get(&self, key: i64) -> Option<f64> {
        self.table.get(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Size of the mapped file.
    pub fn size_bytes(&self) -> u64 {
        self.table.size_bytes()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for MappedValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedValues")
            .field("path", &self.path)
            .field("table", &self.table)
            .finish()
    }
}
