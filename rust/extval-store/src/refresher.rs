use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use tokio::sync::Mutex;

use extval_common::{Result, async_runtime};

use crate::{
    external_file::ExternalFile, published::PublishedValues, select::ValuesEncoding,
    settings::FileSettings,
};

/// What a refresh cycle did to the published values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The source did not change, the published provider was kept as is.
    Unchanged,
    /// A new provider was published.
    Published {
        len: usize,
        encoding: ValuesEncoding,
        size_bytes: u64,
    },
    /// Nothing could be loaded: no source file yet, or it is not newer than the
    /// published values. The previous provider, if any, stays published.
    NotAvailable,
}

/// Which aspects of a field changed with new settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsUpdate {
    pub update_changed: bool,
    pub store_changed: bool,
}

/// Runs the refresh cycles of one external file and publishes their results.
///
/// Cycles are single-flight: the file is locked for the whole cycle, so two
/// cycles never write the working directory concurrently.
pub struct FieldRefresher {
    file: Mutex<Arc<ExternalFile>>,
    published: Arc<PublishedValues>,
    /// The published provider predates the current store settings.
    rebuild_pending: AtomicBool,
}

impl FieldRefresher {
    pub fn new(file: ExternalFile) -> FieldRefresher {
        FieldRefresher {
            file: Mutex::new(Arc::new(file)),
            published: Default::default(),
            rebuild_pending: AtomicBool::new(false),
        }
    }

    pub fn published(&self) -> &Arc<PublishedValues> {
        &self.published
    }

    pub async fn file(&self) -> Arc<ExternalFile> {
        self.file.lock().await.clone()
    }

    /// One refresh cycle: download, then load and publish if there is
    /// anything new.
    ///
    /// # Errors
    /// A malformed source file fails the cycle. The last good provider stays
    /// published and the next cycle retries.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let file = self.file.lock().await;
        let downloaded = file.download().await;
        if self.rebuild_pending.load(Ordering::Acquire) {
            return self.load(&file, None).await;
        }
        let last_modified = self.published.last_modified();
        if !downloaded && last_modified.is_some() {
            return Ok(RefreshOutcome::Unchanged);
        }
        // On the first cycle a file left by a previous run is loaded even if
        // the source reports no change.
        self.load(&file, last_modified).await
    }

    /// Rebuilds the provider from the local source file regardless of its age.
    pub async fn rebuild(&self) -> Result<RefreshOutcome> {
        let file = self.file.lock().await;
        self.load(&file, None).await
    }

    /// Replaces the settings of the file. A change of the store type or the
    /// scaling factor rebuilds the published provider right away, a change of
    /// the source URL drops the stored version token.
    ///
    /// A failed rebuild is logged: the new settings stay in effect, the last
    /// good provider stays published and the next cycle retries.
    ///
    /// # Errors
    /// Fails only when the new settings are invalid, leaving the file as it
    /// was.
    pub async fn update_settings(&self, settings: FileSettings) -> Result<SettingsUpdate> {
        let mut file = self.file.lock().await;
        let update = SettingsUpdate {
            update_changed: file.settings().is_update_changed(&settings),
            store_changed: file.settings().is_store_changed(&settings),
        };
        if update == SettingsUpdate::default() {
            return Ok(update);
        }

        let url_changed = file.settings().url != settings.url;
        let next = ExternalFile::new(file.dir(), file.name(), file.index_name(), settings)?;
        if url_changed {
            next.forget_version();
        }
        *file = Arc::new(next);
        if update.store_changed && self.published.is_available() {
            if let Err(e) = self.load(&file, None).await {
                self.rebuild_pending.store(true, Ordering::Release);
                log::warn!(
                    "Rebuild of {} with new settings failed, keeping the published values: {e}",
                    file.name()
                );
            }
        }
        Ok(update)
    }

    async fn load(
        &self,
        file: &Arc<ExternalFile>,
        last_modified: Option<SystemTime>,
    ) -> Result<RefreshOutcome> {
        let loader = Arc::clone(file);
        let context = format!("loading values of {}", file.name());
        let provider =
            async_runtime::run_blocking(&context, move || loader.load_values(last_modified))
                .await?;

        let Some(provider) = provider else {
            return Ok(RefreshOutcome::NotAvailable);
        };
        self.rebuild_pending.store(false, Ordering::Release);
        let outcome = RefreshOutcome::Published {
            len: provider.len(),
            encoding: provider.encoding(),
            size_bytes: provider.size_bytes(),
        };
        self.published.publish(Arc::new(provider));
        Ok(outcome)
    }
}

impl std::fmt::Debug for FieldRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRefresher")
            .field("published", &self.published)
            .field("rebuild_pending", &self.rebuild_pending)
            .finish_non_exhaustive()
    }
}
