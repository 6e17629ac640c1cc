use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde::Deserialize;
use tokio::time::MissedTickBehavior;

use extval_common::{
    Result,
    async_runtime::{self, JoinHandle},
    error::Error,
    verify_arg,
};

use crate::{
    external_file::ExternalFile,
    published::ExternalFileValues,
    refresher::{FieldRefresher, RefreshOutcome},
    settings::{FileSettings, KeyType},
};

/// Placeholder in a map URL replaced by the shard id of sharded maps.
pub const SHARD_PLACEHOLDER: &str = "{shard}";

/// Configuration of an [`ExternalFileService`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalFileServiceParams {
    /// Root of the working directories, one subdirectory per map.
    pub data_dir: PathBuf,
    /// Settings of the external maps fields can be registered against.
    #[serde(default)]
    pub maps: HashMap<String, FileSettings>,
}

/// Identifies one external file of the service: a map, or one shard of a
/// sharded map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub map_name: String,
    pub shard_id: Option<u32>,
}

impl FileKey {
    pub fn new(map_name: impl Into<String>, shard_id: Option<u32>) -> FileKey {
        FileKey {
            map_name: map_name.into(),
            shard_id,
        }
    }
}

impl std::fmt::Display for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.shard_id {
            Some(shard_id) => write!(f, "{}/{shard_id}", self.map_name),
            None => f.write_str(&self.map_name),
        }
    }
}

struct Registration {
    refresher: Arc<FieldRefresher>,
    /// `(index, field)` pairs reading this file.
    fields: Vec<(String, String)>,
    task: Option<JoinHandle<()>>,
}

/// Registry of the external files of a process and scheduler of their
/// refreshes.
///
/// Owned by the server that embeds it: create one with [`new`](Self::new),
/// register fields with [`add_file`](Self::add_file), call
/// [`start`](Self::start) from within a tokio runtime to begin the periodic
/// refreshes. Dropping the service stops them.
pub struct ExternalFileService {
    data_dir: PathBuf,
    maps: RwLock<HashMap<String, FileSettings>>,
    files: RwLock<HashMap<FileKey, Registration>>,
    running: AtomicBool,
}

impl ExternalFileService {
    pub fn new(params: ExternalFileServiceParams) -> Result<ExternalFileService> {
        for (name, settings) in &params.maps {
            settings
                .validate()
                .map_err(|e| Error::invalid_arg(format!("maps.{name}"), e.to_string()))?;
        }
        Ok(ExternalFileService {
            data_dir: params.data_dir,
            maps: RwLock::new(params.maps),
            files: Default::default(),
            running: AtomicBool::new(false),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Settings of the map `map_name`, if it is configured.
    pub fn map_settings(&self, map_name: &str) -> Option<FileSettings> {
        self.maps.read().expect("read lock").get(map_name).cloned()
    }

    /// Registers field `field_name` of `index_name` as a reader of
    /// `map_name`. A sharded map gets one external file per shard.
    ///
    /// Files already registered by another field are shared. Either all the
    /// files of the map are registered or, on error, none of them.
    ///
    /// Once the service is started, new files get their refresh task right
    /// away, so the call must then come from within a tokio runtime.
    pub fn add_file(
        &self,
        index_name: &str,
        field_name: &str,
        map_name: &str,
        sharding: bool,
        num_shards: u32,
    ) -> Result<()> {
        verify_arg!(num_shards, !sharding || num_shards > 0);
        let settings = self
            .map_settings(map_name)
            .ok_or_else(|| Error::invalid_arg("map_name", format!("unknown map '{map_name}'")))?;

        let shards = if sharding {
            (0..num_shards).map(Some).collect::<Vec<_>>()
        } else {
            vec![None]
        };

        let field = (index_name.to_string(), field_name.to_string());
        let mut files = self.files.write().expect("write lock");
        let mut new_files = Vec::new();
        for shard_id in &shards {
            let key = FileKey::new(map_name, *shard_id);
            if files.contains_key(&key) {
                continue;
            }
            let file = ExternalFile::new(
                self.file_dir(&key),
                map_name,
                index_name,
                shard_settings(&settings, *shard_id),
            )?;
            new_files.push((key, file));
        }

        for shard_id in shards {
            let key = FileKey::new(map_name, shard_id);
            if let Some(registration) = files.get_mut(&key) {
                if !registration.fields.contains(&field) {
                    registration.fields.push(field.clone());
                }
            }
        }

        let running = self.running.load(Ordering::Acquire);
        for (key, file) in new_files {
            let refresher = Arc::new(FieldRefresher::new(file));
            let task = running.then(|| {
                spawn_refresh_task(key.clone(), refresher.clone(), settings.update_interval)
            });
            log::info!("Registered external file [{key}] for [{index_name}/{field_name}]");
            files.insert(
                key,
                Registration {
                    refresher,
                    fields: vec![field.clone()],
                    task,
                },
            );
        }
        Ok(())
    }

    /// Returns the lookup handle of a registered file, `None` if nothing is
    /// registered under `map_name` and `shard_id`.
    pub fn get_values(
        &self,
        map_name: &str,
        key_type: KeyType,
        shard_id: Option<u32>,
    ) -> Option<ExternalFileValues> {
        let files = self.files.read().expect("read lock");
        let registration = files.get(&FileKey::new(map_name, shard_id))?;
        Some(ExternalFileValues::new(
            registration.refresher.published().clone(),
            key_type,
        ))
    }

    /// Keys of the registered files, sorted.
    pub fn file_keys(&self) -> Vec<FileKey> {
        let mut keys = self
            .files
            .read()
            .expect("read lock")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Replaces the settings of `map_name` for all its files.
    ///
    /// A change of the store type or the scaling factor rebuilds the published
    /// values. A change of the source or the interval reschedules the refresh
    /// task.
    pub async fn update_map(&self, map_name: &str, settings: FileSettings) -> Result<()> {
        settings.validate()?;
        self.maps
            .write()
            .expect("write lock")
            .insert(map_name.to_string(), settings.clone());

        let mut first_error = None;
        for (key, refresher) in self.refreshers(|key| key.map_name == map_name) {
            let update = match refresher
                .update_settings(shard_settings(&settings, key.shard_id))
                .await
            {
                Ok(update) => update,
                Err(e) => {
                    log::warn!("Cannot update settings of [{key}]: {e}");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            log::info!("Updated settings of [{key}]: {update:?}");
            if update.update_changed && self.running.load(Ordering::Acquire) {
                self.reschedule(&key, refresher, settings.update_interval);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Starts the periodic refresh of every registered file. Files registered
    /// later are scheduled as they are added.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
        let maps = self.maps.read().expect("read lock").clone();
        let mut files = self.files.write().expect("write lock");
        for (key, registration) in files.iter_mut() {
            if registration.task.is_some() {
                continue;
            }
            let interval = maps
                .get(&key.map_name)
                .map(|settings| settings.update_interval)
                .unwrap_or(crate::settings::DEFAULT_UPDATE_INTERVAL);
            registration.task = Some(spawn_refresh_task(
                key.clone(),
                registration.refresher.clone(),
                interval,
            ));
        }
    }

    /// Runs one refresh cycle of every registered file, one after another.
    pub async fn refresh_all(&self) -> Vec<(FileKey, Result<RefreshOutcome>)> {
        let mut results = Vec::new();
        for (key, refresher) in self.refreshers(|_| true) {
            let outcome = refresher.refresh().await;
            if let Err(e) = &outcome {
                log::warn!("Refresh of [{key}] failed: {e}");
            }
            results.push((key, outcome));
        }
        results
    }

    /// Stops all refresh tasks. Published values stay readable.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let mut files = self.files.write().expect("write lock");
        for registration in files.values_mut() {
            if let Some(task) = registration.task.take() {
                task.abort();
            }
        }
    }

    fn file_dir(&self, key: &FileKey) -> PathBuf {
        let dir = self.data_dir.join(&key.map_name);
        match key.shard_id {
            Some(shard_id) => dir.join(shard_id.to_string()),
            None => dir,
        }
    }

    fn refreshers(&self, filter: impl Fn(&FileKey) -> bool) -> Vec<(FileKey, Arc<FieldRefresher>)> {
        let files = self.files.read().expect("read lock");
        let mut refreshers = files
            .iter()
            .filter(|(key, _)| filter(key))
            .map(|(key, registration)| (key.clone(), registration.refresher.clone()))
            .collect::<Vec<_>>();
        refreshers.sort_by(|a, b| a.0.cmp(&b.0));
        refreshers
    }

    fn reschedule(&self, key: &FileKey, refresher: Arc<FieldRefresher>, interval: Duration) {
        let mut files = self.files.write().expect("write lock");
        if let Some(registration) = files.get_mut(key) {
            if let Some(task) = registration.task.take() {
                task.abort();
            }
            registration.task = Some(spawn_refresh_task(key.clone(), refresher, interval));
        }
    }
}

impl Drop for ExternalFileService {
    fn drop(&mut self) {
        if let Ok(files) = self.files.get_mut() {
            for registration in files.values_mut() {
                if let Some(task) = registration.task.take() {
                    task.abort();
                }
            }
        }
    }
}

impl std::fmt::Debug for ExternalFileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalFileService")
            .field("data_dir", &self.data_dir)
            .field("files", &self.file_keys())
            .finish_non_exhaustive()
    }
}

/// Settings of one shard: the shard id is substituted into the URL.
fn shard_settings(settings: &FileSettings, shard_id: Option<u32>) -> FileSettings {
    let mut settings = settings.clone();
    if let (Some(shard_id), Some(url)) = (shard_id, settings.url.as_mut()) {
        *url = url.replace(SHARD_PLACEHOLDER, &shard_id.to_string());
    }
    settings
}

fn spawn_refresh_task(
    key: FileKey,
    refresher: Arc<FieldRefresher>,
    interval: Duration,
) -> JoinHandle<()> {
    async_runtime::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match refresher.refresh().await {
                Ok(RefreshOutcome::Published {
                    len,
                    encoding,
                    size_bytes,
                }) => {
                    log::info!("Published {len} values of [{key}] as {encoding}, {size_bytes} bytes")
                }
                Ok(outcome) => log::debug!("Refresh of [{key}]: {outcome:?}"),
                Err(e) => {
                    log::warn!("Refresh of [{key}] failed, keeping the published values: {e}")
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ValuesStoreType;

    #[test]
    fn test_shard_settings_substitute_url() {
        let settings = FileSettings::new(ValuesStoreType::Ram, Duration::from_secs(5))
            .with_url("http://feeds/prices-{shard}.txt");
        assert_eq!(
            Some("http://feeds/prices-3.txt"),
            shard_settings(&settings, Some(3)).url.as_deref()
        );
        assert_eq!(
            Some("http://feeds/prices-{shard}.txt"),
            shard_settings(&settings, None).url.as_deref()
        );
    }

    #[test]
    fn test_file_key_display() {
        assert_eq!("prices", FileKey::new("prices", None).to_string());
        assert_eq!("prices/2", FileKey::new("prices", Some(2)).to_string());
    }

    #[test]
    fn test_params_deserialize() {
        let params: ExternalFileServiceParams = serde_json::from_str(
            r#"{
                "data_dir": "/var/lib/extval",
                "maps": {
                    "prices": { "url": "http://feeds/prices.txt", "scaling_factor": 100 },
                    "ratings": { "values_store_type": "file", "update_interval": 600 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(Path::new("/var/lib/extval"), params.data_dir);
        assert_eq!(2, params.maps.len());
        assert_eq!(Some(100), params.maps["prices"].scaling_factor);
        assert_eq!(
            ValuesStoreType::File,
            params.maps["ratings"].values_store_type
        );
    }
}
