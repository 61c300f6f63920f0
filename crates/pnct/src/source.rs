//! Where PNCT archives come from.
//!
//! [`HttpArchiveSource`] downloads from the DNIT open-data server.
//! [`MemoryArchiveSource`] serves archives already in memory, e.g. a ZIP the
//! user downloaded by hand from the DNIT map page.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, error, info};

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::query::Query;

/// Content type reported for archives that did not come over HTTP.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// A downloaded archive before it is unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// Where the archive was fetched from.
    pub url: String,
    /// The `Content-Type` the server announced, if any.
    pub content_type: Option<String>,
    /// Raw archive bytes.
    pub bytes: Vec<u8>,
}

/// A provider of PNCT archives.
pub trait ArchiveSource: fmt::Debug + Send + Sync {
    /// URL the archive for `query` is fetched from.
    fn archive_url(&self, query: &Query) -> String;

    /// Fetch the archive for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] when there is no archive for the
    /// query, or a transport error when fetching fails.
    fn fetch(&self, query: &Query) -> Result<Archive>;
}

/// Downloads archives from an HTTP server.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    base_url: String,
    timeout: Duration,
    user_agent: String,
}

impl HttpArchiveSource {
    /// Construct a source for the given base URL with default settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = SourceConfig::default();
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(defaults.timeout_secs),
            user_agent: defaults.user_agent,
        }
    }

    /// Construct a source from configuration.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    // The blocking client owns a runtime, so it is built per call on the
    // calling thread rather than stored.
    fn client(&self, url: &str) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|err| Error::Network {
                url: url.to_string(),
                message: format!("failed to build HTTP client: {err}"),
            })
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn archive_url(&self, query: &Query) -> String {
        query.archive_url(&self.base_url)
    }

    fn fetch(&self, query: &Query) -> Result<Archive> {
        let url = self.archive_url(query);
        info!("Downloading {}", url);

        let response = self
            .client(&url)?
            .get(&url)
            .send()
            .map_err(|err| convert_reqwest_error(&err, &url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            error!("Archive not found: {}", url);
            return Err(Error::DatasetNotFound {
                label: query.label(),
                url,
            });
        }
        if !status.is_success() {
            error!("HTTP {} from {}", status.as_u16(), url);
            return Err(Error::Http {
                status: status.as_u16(),
                url,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| convert_reqwest_error(&err, &url))?
            .to_vec();

        debug!(
            "Received {} bytes ({})",
            bytes.len(),
            content_type.as_deref().unwrap_or("no content type")
        );
        Ok(Archive {
            url,
            content_type,
            bytes,
        })
    }
}

fn convert_reqwest_error(err: &reqwest::Error, url: &str) -> Error {
    if err.is_timeout() {
        error!("Timed out fetching {}", url);
        Error::Timeout {
            operation: format!("download of {url}"),
        }
    } else {
        error!("Connection error fetching {}: {}", url, err);
        Error::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Serves archives held in memory.
///
/// Queries without an archive behave like a 404 from the server.
#[derive(Debug, Default)]
pub struct MemoryArchiveSource {
    base_url: String,
    archives: HashMap<Query, (Option<String>, Vec<u8>)>,
    fetches: AtomicUsize,
}

impl MemoryArchiveSource {
    /// Construct an empty source whose URLs are reported below `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Add the archive served for `query`.
    #[must_use]
    pub fn with_archive(
        mut self,
        query: Query,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.archives
            .insert(query, (content_type.map(str::to_string), bytes));
        self
    }

    /// How many times [`ArchiveSource::fetch`] has been called.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl ArchiveSource for MemoryArchiveSource {
    fn archive_url(&self, query: &Query) -> String {
        query.archive_url(&self.base_url)
    }

    fn fetch(&self, query: &Query) -> Result<Archive> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let url = self.archive_url(query);
        match self.archives.get(query) {
            Some((content_type, bytes)) => Ok(Archive {
                url,
                content_type: content_type.clone(),
                bytes: bytes.clone(),
            }),
            None => Err(Error::DatasetNotFound {
                label: query.label(),
                url,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query::new(2022, 116).unwrap()
    }

    #[test]
    fn test_http_archive_url() {
        let source = HttpArchiveSource::new("https://servicos.dnit.gov.br/dadospnct/arquivos");
        assert_eq!(
            source.archive_url(&query()),
            "https://servicos.dnit.gov.br/dadospnct/arquivos/pnct_2022_116.zip"
        );
    }

    #[test]
    fn test_http_from_config() {
        let mut config = SourceConfig::default();
        config.timeout_secs = 5;
        config.user_agent = "test-agent".to_string();
        let source = HttpArchiveSource::from_config(&config);
        assert_eq!(source.timeout, Duration::from_secs(5));
        assert_eq!(source.user_agent, "test-agent");
    }

    #[test]
    fn test_http_builders() {
        let source = HttpArchiveSource::new("http://localhost")
            .with_timeout(Duration::from_millis(250))
            .with_user_agent("agent/1");
        assert_eq!(source.timeout, Duration::from_millis(250));
        assert_eq!(source.user_agent, "agent/1");
    }

    #[test]
    fn test_http_connection_refused_is_network_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let source =
            HttpArchiveSource::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2));
        let err = source.fetch(&query()).unwrap_err();
        assert!(matches!(
            err,
            Error::Network { .. } | Error::Timeout { .. }
        ));
    }

    #[test]
    fn test_memory_source_serves_archive() {
        let source = MemoryArchiveSource::new("mem://pnct").with_archive(
            query(),
            Some(ZIP_CONTENT_TYPE),
            b"PK".to_vec(),
        );
        let archive = source.fetch(&query()).unwrap();
        assert_eq!(archive.url, "mem://pnct/pnct_2022_116.zip");
        assert_eq!(archive.content_type.as_deref(), Some(ZIP_CONTENT_TYPE));
        assert_eq!(archive.bytes, b"PK");
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_memory_source_missing_is_not_found() {
        let source = MemoryArchiveSource::new("mem://pnct");
        let err = source.fetch(&query()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(source.fetch_count(), 1);
    }
}
