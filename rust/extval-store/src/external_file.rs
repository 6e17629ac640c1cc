use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use extval_common::{Result, error::Error};
use extval_trie::TrieHashTableWriter;

use crate::{
    fetch::{FetchOutcome, Fetcher},
    parse::parse_values,
    provider::ValuesProvider,
    settings::{FileSettings, ValuesStoreType},
    version::VersionStore,
};

const SOURCE_EXTENSION: &str = "txt";
const VERSION_EXTENSION: &str = "ver";
const BINARY_EXTENSION: &str = "amt";

/// The external file of one field: its working directory, its settings and the
/// steps of a refresh cycle.
///
/// An `ExternalFile` holds no values itself, [`load_values`](Self::load_values)
/// produces a new provider on demand. The working directory is owned
/// exclusively by one instance, callers serialize the cycles.
pub struct ExternalFile {
    name: String,
    index_name: String,
    dir: PathBuf,
    settings: FileSettings,
    fetcher: Option<Fetcher>,
    versions: VersionStore,
}

impl ExternalFile {
    /// Creates the external file `name` of index `index_name` in `dir`,
    /// creating the directory if needed.
    pub fn new(
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        index_name: impl Into<String>,
        settings: FileSettings,
    ) -> Result<ExternalFile> {
        settings.validate()?;
        let dir = dir.into();
        let name = name.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
        let fetcher = settings
            .url
            .as_deref()
            .map(|url| Fetcher::new(url, settings.timeout_duration()))
            .transpose()?;
        let versions = VersionStore::new(dir.join(format!("{name}.{VERSION_EXTENSION}")));
        Ok(ExternalFile {
            name,
            index_name: index_name.into(),
            dir,
            settings,
            fetcher,
            versions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &FileSettings {
        &self.settings
    }

    pub fn external_file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{SOURCE_EXTENSION}", self.name))
    }

    pub fn version_file_path(&self) -> PathBuf {
        self.versions.path().to_path_buf()
    }

    pub fn binary_file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{BINARY_EXTENSION}", self.name))
    }

    /// Drops the stored version token, so the next download does not depend
    /// on what an earlier source reported.
    pub fn forget_version(&self) {
        self.versions.clear_version();
    }

    /// Downloads the source if it changed since the stored version.
    ///
    /// Returns `true` when new content replaced the source file. Failures are
    /// logged and reported as `false`. Without a URL nothing is ever
    /// downloaded.
    pub async fn download(&self) -> bool {
        let Some(fetcher) = &self.fetcher else {
            return false;
        };
        let target = self.external_file_path();
        // Without a local copy the version is meaningless.
        let version = if target.exists() {
            self.versions.current_version()
        } else {
            None
        };
        match fetcher.fetch(version.as_deref(), &target).await {
            FetchOutcome::Downloaded { version, .. } => {
                if let Some(version) = version {
                    self.versions.update_version(&version);
                }
                true
            }
            FetchOutcome::Unchanged | FetchOutcome::Failed => false,
        }
    }

    /// Builds a provider from the source file if it is newer than
    /// `last_modified`, the modification time of the currently published
    /// snapshot. `None` forces a build.
    ///
    /// Returns `Ok(None)` when there is nothing new or no source file yet.
    ///
    /// # Errors
    /// Fails on a malformed source file and on errors building or mapping the
    /// trie hash table file.
    pub fn load_values(&self, last_modified: Option<SystemTime>) -> Result<Option<ValuesProvider>> {
        let source = self.external_file_path();
        let Some(modified) = modified_time(&source) else {
            return Ok(None);
        };
        if last_modified.is_some_and(|published| modified <= published) {
            log::debug!(
                "[{}] is not newer than the published values",
                source.display()
            );
            return Ok(None);
        }

        let provider = match self.settings.values_store_type {
            ValuesStoreType::Ram => self.load_in_memory(&source, modified),
            ValuesStoreType::File => self.load_mapped(&source, modified),
        };
        let provider = match provider {
            Ok(provider) => provider,
            // The source vanished between the two reads.
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        log::info!(
            "Loaded {} values of [{}/{}] as {}, {} bytes",
            provider.len(),
            self.index_name,
            self.name,
            provider.encoding(),
            provider.size_bytes()
        );
        Ok(Some(provider))
    }

    fn load_in_memory(&self, source: &Path, modified: SystemTime) -> Result<ValuesProvider> {
        let parsed = parse_values(source)?;
        ValuesProvider::in_memory(&parsed, self.settings.scaling_factor, modified)
    }

    fn load_mapped(&self, source: &Path, modified: SystemTime) -> Result<ValuesProvider> {
        let binary = self.binary_file_path();
        let is_stale = modified_time(&binary).is_none_or(|built| built < modified);
        if is_stale {
            self.write_binary_file(source, &binary)?;
        }
        ValuesProvider::mapped(&binary, modified)
    }

    fn write_binary_file(&self, source: &Path, binary: &Path) -> Result<()> {
        let parsed = parse_values(source)?;
        let blob = TrieHashTableWriter::default().dump_doubles(&parsed.keys, &parsed.values)?;

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.{BINARY_EXTENSION}.", self.name))
            .tempfile_in(&self.dir)
            .map_err(|e| Error::io(self.dir.display().to_string(), e))?;
        temp.write_all(&blob)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| Error::io(temp.path().display().to_string(), e))?;
        temp.persist(binary)
            .map_err(|e| Error::io(binary.display().to_string(), e.error))?;

        log::debug!("Wrote [{}], {} bytes", binary.display(), blob.len());
        Ok(())
    }
}

impl std::fmt::Debug for ExternalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalFile")
            .field("name", &self.name)
            .field("index_name", &self.index_name)
            .field("dir", &self.dir)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Modification time of `path`, `None` if the file is missing or the time is
/// not available.
fn modified_time(path: &Path) -> Option<SystemTime> {
    match fs::metadata(path).and_then(|metadata| metadata.modified()) {
        Ok(modified) => Some(modified),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            log::warn!("Cannot read modification time of [{}]: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::select::ValuesEncoding;

    fn settings(store: ValuesStoreType) -> FileSettings {
        FileSettings::new(store, Duration::from_secs(60))
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file =
            ExternalFile::new(dir.path().join("work"), "price", "products", settings(ValuesStoreType::Ram))
                .unwrap();
        assert!(dir.path().join("work").is_dir());
        assert_eq!(dir.path().join("work/price.txt"), file.external_file_path());
        assert_eq!(dir.path().join("work/price.ver"), file.version_file_path());
        assert_eq!(dir.path().join("work/price.amt"), file.binary_file_path());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(ValuesStoreType::Ram).with_scaling_factor(-1);
        assert!(ExternalFile::new(dir.path(), "price", "products", settings).is_err());
    }

    #[test]
    fn test_missing_source_is_no_provider() {
        let dir = tempfile::tempdir().unwrap();
        for store in [ValuesStoreType::Ram, ValuesStoreType::File] {
            let file = ExternalFile::new(dir.path(), "price", "products", settings(store)).unwrap();
            assert!(file.load_values(None).unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_download_without_url_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let file =
            ExternalFile::new(dir.path(), "price", "products", settings(ValuesStoreType::Ram))
                .unwrap();
        assert!(!file.download().await);
        assert!(!file.external_file_path().exists());
    }

    #[test]
    fn test_load_in_memory_respects_published_time() {
        let dir = tempfile::tempdir().unwrap();
        let file = ExternalFile::new(
            dir.path(),
            "price",
            "products",
            settings(ValuesStoreType::Ram).with_scaling_factor(100),
        )
        .unwrap();
        fs::write(file.external_file_path(), "1=1.25\n2=2.5\n").unwrap();

        let provider = file.load_values(None).unwrap().unwrap();
        assert_eq!(ValuesEncoding::IntShort, provider.encoding());
        assert_eq!(1.25, provider.get(1, f64::NAN));

        let published = provider.last_modified();
        assert!(file.load_values(Some(published)).unwrap().is_none());
        assert!(
            file.load_values(Some(published - Duration::from_secs(1)))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_load_mapped_builds_binary_file() {
        let dir = tempfile::tempdir().unwrap();
        let file =
            ExternalFile::new(dir.path(), "price", "products", settings(ValuesStoreType::File))
                .unwrap();
        fs::write(file.external_file_path(), "10=0.1\n20=0.2\n10=0.3\n").unwrap();

        let provider = file.load_values(None).unwrap().unwrap();
        assert_eq!(ValuesEncoding::MappedFile, provider.encoding());
        assert_eq!(0.3, provider.get(10, f64::NAN));
        assert_eq!(0.2, provider.get(20, f64::NAN));
        assert!(provider.get(30, f64::NAN).is_nan());
        assert!(file.binary_file_path().exists());
        // Only the source and the binary file remain.
        assert_eq!(2, fs::read_dir(dir.path()).unwrap().count());
    }

    #[test]
    fn test_parse_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let file =
            ExternalFile::new(dir.path(), "price", "products", settings(ValuesStoreType::Ram))
                .unwrap();
        fs::write(file.external_file_path(), "1=1\nbroken\n").unwrap();
        assert!(file.load_values(None).is_err());
    }
}
