use std::{
    fs::File,
    io::{BufRead, BufReader, ErrorKind},
    path::{Path, PathBuf},
};

/// Persists the version token (the `Last-Modified` value of the last download)
/// of an external file.
///
/// Failures are never fatal: an unreadable version only costs an unconditional
/// download, an unwritable one a redundant download later on.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> VersionStore {
        VersionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored token. A missing file or an empty first line means
    /// there is no version yet.
    pub fn current_version(&self) -> Option<String> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cannot read file [{}]: {e}", self.path.display());
                return None;
            }
        };
        let mut line = String::new();
        match BufReader::new(file).read_line(&mut line) {
            Ok(_) => {
                let version = line.trim_end_matches(['\r', '\n']);
                (!version.is_empty()).then(|| version.to_string())
            }
            Err(e) => {
                log::warn!("Cannot read file [{}]: {e}", self.path.display());
                None
            }
        }
    }

    /// Overwrites the stored token.
    pub fn update_version(&self, version: &str) {
        if let Err(e) = std::fs::write(&self.path, version) {
            log::warn!("Cannot write file [{}]: {e}", self.path.display());
        }
    }

    /// Forgets the stored token, so the next download is unconditional.
    pub fn clear_version(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Cannot remove file [{}]: {e}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path().join("prices.ver"));
        assert_eq!(None, store.current_version());
    }

    #[test]
    fn test_clear_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path().join("prices.ver"));
        store.clear_version();
        store.update_version("Tue, 15 Nov 1994 12:45:26 GMT");
        store.clear_version();
        assert_eq!(None, store.current_version());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_update_and_read_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(dir.path().join("prices.ver"));
        store.update_version("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            Some("Wed, 21 Oct 2015 07:28:00 GMT"),
            store.current_version().as_deref()
        );
        assert_eq!(
            "Wed, 21 Oct 2015 07:28:00 GMT",
            std::fs::read_to_string(store.path()).unwrap()
        );

        store.update_version("Thu, 22 Oct 2015 07:28:00 GMT");
        assert_eq!(
            Some("Thu, 22 Oct 2015 07:28:00 GMT"),
            store.current_version().as_deref()
        );
    }

    #[test]
    fn test_only_first_line_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.ver");
        std::fs::write(&path, "v1\nleftover\n").unwrap();
        assert_eq!(Some("v1"), VersionStore::new(path).current_version().as_deref());
    }

    #[test]
    fn test_unwritable_version_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the version file fails both read and write.
        let path = dir.path().join("prices.ver");
        std::fs::create_dir(&path).unwrap();
        let store = VersionStore::new(path);
        store.update_version("v1");
        assert_eq!(None, store.current_version());
    }
}
