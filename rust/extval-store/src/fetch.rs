use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{
    StatusCode,
    header::{IF_MODIFIED_SINCE, LAST_MODIFIED},
};

use extval_common::{Result, error::Error};

/// Result of a single conditional download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The source answered "not modified", nothing was written.
    Unchanged,
    /// The target file was atomically replaced with the response body.
    Downloaded {
        /// Value of the `Last-Modified` header, if the server sent one.
        version: Option<String>,
        size: u64,
    },
    /// The request failed or the response was rejected. The target file is
    /// untouched.
    Failed,
}

/// Conditional HTTP GET of an external file.
pub struct Fetcher {
    client: reqwest::Client,
    url: String,
}

impl Fetcher {
    /// Creates a fetcher for `url`. The timeout, when given, bounds both the
    /// connect and the read phases of a request.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Fetcher> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout).read_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::http("cannot build HTTP client", e))?;
        Ok(Fetcher {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Downloads the source into `target` unless it is unchanged since
    /// `version`.
    ///
    /// Never fails: transport errors, unexpected statuses and local I/O errors
    /// are logged and reported as [`FetchOutcome::Failed`], leaving `target`
    /// as it was.
    pub async fn fetch(&self, version: Option<&str>, target: &Path) -> FetchOutcome {
        match self.try_fetch(version, target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Cannot download [{}]: {e}", self.url);
                FetchOutcome::Failed
            }
        }
    }

    async fn try_fetch(&self, version: Option<&str>, target: &Path) -> Result<FetchOutcome> {
        let mut request = self.client.get(&self.url);
        if let Some(version) = version {
            request = request.header(IF_MODIFIED_SINCE, version);
        }
        let mut response = request.send().await.map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                log::debug!("[{}] is not modified since {version:?}", self.url);
                return Ok(FetchOutcome::Unchanged);
            }
            StatusCode::OK => (),
            status => {
                log::warn!("Unexpected status {status} downloading [{}]", self.url);
                return Ok(FetchOutcome::Failed);
            }
        }

        let new_version = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let dir = target_dir(target);
        let mut temp = tempfile::Builder::new()
            .prefix(&temp_prefix(target))
            .tempfile_in(&dir)
            .map_err(|e| Error::io(format!("temp file in {}", dir.display()), e))?;

        let mut size = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(e))?
        {
            temp.write_all(&chunk)
                .map_err(|e| Error::io(temp.path().display().to_string(), e))?;
            size += chunk.len() as u64;
        }

        if size == 0 {
            // The temp file is removed on drop.
            log::warn!("Empty response body downloading [{}]", self.url);
            return Ok(FetchOutcome::Failed);
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(temp.path().display().to_string(), e))?;
        temp.persist(target)
            .map_err(|e| Error::io(target.display().to_string(), e.error))?;

        if new_version.is_none() {
            log::warn!("No {LAST_MODIFIED} header downloading [{}]", self.url);
        }
        log::info!(
            "Downloaded [{}] into [{}], {size} bytes",
            self.url,
            target.display()
        );
        Ok(FetchOutcome::Downloaded {
            version: new_version,
            size,
        })
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::http(format!("timed out requesting {}", self.url), e)
        } else {
            Error::http(format!("requesting {}", self.url), e)
        }
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").field("url", &self.url).finish()
    }
}

fn target_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    format!(".{name}.")
}
