use std::time::Duration;

use serde::{Deserialize, Deserializer};

use extval_common::{Result, verify_arg};

/// Where the values of an external file live once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuesStoreType {
    /// Values are decoded into one of the fixed-width in-memory encodings.
    #[default]
    Ram,
    /// Values are encoded into a trie hash table file and memory-mapped.
    File,
}

/// Width of the document keys used to look values up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Int,
    Long,
}

impl KeyType {
    /// Returns `true` if `key` is representable by this key type.
    #[inline]
    pub fn accepts(self, key: i64) -> bool {
        match self {
            KeyType::Int => i32::try_from(key).is_ok(),
            KeyType::Long => true,
        }
    }
}

/// Settings of a single external file, replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub values_store_type: ValuesStoreType,

    /// Delay between two refresh attempts. Configured in seconds.
    #[serde(
        default = "default_update_interval",
        deserialize_with = "deserialize_secs"
    )]
    pub update_interval: Duration,

    /// Multiplier applied to values before storing them as scaled integers.
    /// `None` keeps values as 64-bit floats.
    #[serde(default)]
    pub scaling_factor: Option<i64>,

    /// Source URL. Without it the file is never downloaded, but a file placed
    /// into the working directory is still loaded.
    #[serde(default)]
    pub url: Option<String>,

    /// Connect and read timeout of a download, in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

fn default_update_interval() -> Duration {
    DEFAULT_UPDATE_INTERVAL
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl FileSettings {
    pub fn new(values_store_type: ValuesStoreType, update_interval: Duration) -> FileSettings {
        FileSettings {
            values_store_type,
            update_interval,
            scaling_factor: None,
            url: None,
            timeout: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_scaling_factor(mut self, scaling_factor: i64) -> Self {
        self.scaling_factor = Some(scaling_factor);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Checks the settings before an external file is created from them.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(update_interval, !self.update_interval.is_zero());
        verify_arg!(
            scaling_factor,
            self.scaling_factor.is_none_or(|factor| factor > 0)
        );
        verify_arg!(timeout, self.timeout.is_none_or(|timeout| timeout > 0));
        Ok(())
    }

    /// The refresh cadence is affected: the refresh task must be rescheduled.
    pub fn is_update_changed(&self, other: &FileSettings) -> bool {
        other.update_interval != self.update_interval
            || other.url != self.url
            || other.timeout != self.timeout
    }

    /// The values representation is affected: the published provider must be
    /// rebuilt even when the source did not change.
    pub fn is_store_changed(&self, other: &FileSettings) -> bool {
        other.scaling_factor != self.scaling_factor
            || other.values_store_type != self.values_store_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_predicates() {
        let base = FileSettings::new(ValuesStoreType::Ram, Duration::from_secs(60))
            .with_url("http://localhost/prices.txt");

        let other = base.clone().with_timeout(5);
        assert!(base.is_update_changed(&other));
        assert!(!base.is_store_changed(&other));

        let other = base.clone().with_scaling_factor(100);
        assert!(!base.is_update_changed(&other));
        assert!(base.is_store_changed(&other));

        let mut other = base.clone();
        other.values_store_type = ValuesStoreType::File;
        assert!(base.is_store_changed(&other));

        let mut other = base.clone();
        other.update_interval = Duration::from_secs(30);
        assert!(base.is_update_changed(&other));
        assert!(!base.is_store_changed(&other));

        assert!(!base.is_update_changed(&base.clone()));
        assert!(!base.is_store_changed(&base.clone()));
    }

    #[test]
    fn test_validate() {
        let settings = FileSettings::new(ValuesStoreType::Ram, Duration::from_secs(1));
        assert!(settings.validate().is_ok());
        assert!(settings.clone().with_scaling_factor(0).validate().is_err());
        assert!(settings.clone().with_timeout(0).validate().is_err());
        assert!(
            FileSettings::new(ValuesStoreType::File, Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_deserialize() {
        let settings: FileSettings = serde_json::from_str(
            r#"{
                "values_store_type": "file",
                "update_interval": 30,
                "scaling_factor": 1000,
                "url": "http://localhost/ratings.txt",
                "timeout": 10
            }"#,
        )
        .unwrap();
        assert_eq!(ValuesStoreType::File, settings.values_store_type);
        assert_eq!(Duration::from_secs(30), settings.update_interval);
        assert_eq!(Some(1000), settings.scaling_factor);
        assert_eq!(Some(Duration::from_secs(10)), settings.timeout_duration());

        let settings: FileSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(ValuesStoreType::Ram, settings.values_store_type);
        assert_eq!(DEFAULT_UPDATE_INTERVAL, settings.update_interval);
        assert_eq!(None, settings.url);
    }

    #[test]
    fn test_key_type_accepts() {
        assert!(KeyType::Int.accepts(i32::MAX as i64));
        assert!(!KeyType::Int.accepts(i32::MAX as i64 + 1));
        assert!(!KeyType::Int.accepts(i32::MIN as i64 - 1));
        assert!(KeyType::Long.accepts(i64::MIN));
    }
}
