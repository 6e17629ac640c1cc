//! External values store.
//!
//! Keeps numeric values that live outside the index (prices, popularity
//! scores and the like) available for lookup by document key. Each external
//! file is a `key=value` text file fetched over HTTP with a conditional GET,
//! cached in a working directory, parsed, encoded in the narrowest fitting
//! representation and published as an immutable [`ValuesProvider`] snapshot.
//!
//! Readers go through an [`ExternalFileValues`] handle and never block on a
//! refresh: a new snapshot replaces the previous one in a single atomic store.

pub mod external_file;
pub mod fetch;
pub mod parse;
pub mod provider;
pub mod published;
pub mod refresher;
pub mod select;
pub mod service;
pub mod settings;
pub mod version;

pub use external_file::ExternalFile;
pub use fetch::{FetchOutcome, Fetcher};
pub use parse::{ParsedValues, parse_values};
pub use provider::{ProviderValues, ValuesProvider};
pub use published::{ExternalFileValues, PublishedValues};
pub use refresher::{FieldRefresher, RefreshOutcome, SettingsUpdate};
pub use select::{EncodingPlan, Scale, ValuesEncoding, select_encoding};
pub use service::{ExternalFileService, ExternalFileServiceParams, FileKey};
pub use settings::{FileSettings, KeyType, ValuesStoreType};
pub use version::VersionStore;
