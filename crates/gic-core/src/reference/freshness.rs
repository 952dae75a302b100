//! Catalog freshness manager (§4.D).
//!
//! For each of the five catalog files: HEAD the remote URL, compare
//! `Last-Modified` against the local file's mtime, and download-then-rename
//! atomically if the remote copy is newer. Failures are per-file and never
//! abort the batch.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{CacheFileConfig, EddbCacheConfig};

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Abstraction over HTTP access, so the freshness manager can be tested
/// without a real network — mirrors the teacher's `FileSystem` trait used to
/// make `/proc` access swappable in tests.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Returns the remote `Last-Modified` time as unix seconds, or `None` if
    /// the header was absent or unparseable.
    async fn head_last_modified(&self, url: &str) -> Result<Option<i64>, FreshnessError>;

    /// Downloads the full body of `url`.
    async fn download(&self, url: &str) -> Result<Vec<u8>, FreshnessError>;
}

#[derive(Debug)]
pub enum FreshnessError {
    Network(String),
    Io(std::io::Error),
}

impl std::fmt::Display for FreshnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FreshnessError::Network(msg) => write!(f, "network error: {msg}"),
            FreshnessError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for FreshnessError {}

impl From<std::io::Error> for FreshnessError {
    fn from(e: std::io::Error) -> Self {
        FreshnessError::Io(e)
    }
}

/// Production `HttpFetch` backed by `reqwest`.
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client configuration is valid");
        Self { client }
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn head_last_modified(&self, url: &str) -> Result<Option<i64>, FreshnessError> {
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| FreshnessError::Network(e.to_string()))?;
        let header = resp
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok());
        Ok(header.and_then(|raw| {
            chrono::DateTime::parse_from_rfc2822(raw)
                .ok()
                .map(|dt| dt.timestamp())
        }))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FreshnessError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FreshnessError::Network(e.to_string()))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FreshnessError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Outcome of checking (and possibly refreshing) a single catalog file.
#[derive(Debug, Clone)]
pub struct FreshnessResult {
    pub local_file: String,
    pub updated: bool,
    pub error: Option<String>,
}

fn local_mtime_unix(path: &str) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs();
    Some(secs as i64)
}

/// Checks and, if stale, refreshes a single catalog file.
pub async fn check_one(fetch: &dyn HttpFetch, file: &CacheFileConfig) -> FreshnessResult {
    let remote_mtime = match fetch.head_last_modified(&file.url).await {
        Ok(v) => v,
        Err(e) => {
            warn!("freshness check failed for {}: {e}", file.local_file);
            return FreshnessResult {
                local_file: file.local_file.clone(),
                updated: false,
                error: Some(e.to_string()),
            };
        }
    };

    let local_mtime = local_mtime_unix(&file.local_file);
    let needs_update = match (remote_mtime, local_mtime) {
        (Some(remote), Some(local)) => remote > local,
        _ => true,
    };

    if !needs_update {
        return FreshnessResult {
            local_file: file.local_file.clone(),
            updated: false,
            error: None,
        };
    }

    match download_atomic(fetch, file).await {
        Ok(()) => {
            info!("updated {}", file.local_file);
            FreshnessResult {
                local_file: file.local_file.clone(),
                updated: true,
                error: None,
            }
        }
        Err(e) => {
            warn!("download failed for {}: {e}", file.local_file);
            FreshnessResult {
                local_file: file.local_file.clone(),
                updated: false,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn download_atomic(fetch: &dyn HttpFetch, file: &CacheFileConfig) -> Result<(), FreshnessError> {
    let bytes = fetch.download(&file.url).await?;
    let tmp_path = format!("{}.tmp", file.local_file);
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, &file.local_file)?;
    Ok(())
}

/// Checks all five catalog files. Returns per-file results; never aborts
/// early on an individual failure.
pub async fn check_all(fetch: &dyn HttpFetch, cache: &EddbCacheConfig) -> Vec<FreshnessResult> {
    let mut results = Vec::with_capacity(5);
    for file in [
        &cache.systems,
        &cache.stations,
        &cache.factions,
        &cache.commodities,
        &cache.listings,
    ] {
        results.push(check_one(fetch, file).await);
    }
    results
}

/// True if any file in a batch of freshness results was actually updated.
pub fn any_updated(results: &[FreshnessResult]) -> bool {
    results.iter().any(|r| r.updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeFetch {
        last_modified: Option<i64>,
        body: Vec<u8>,
        fail_head: bool,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl HttpFetch for FakeFetch {
        async fn head_last_modified(&self, _url: &str) -> Result<Option<i64>, FreshnessError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail_head {
                return Err(FreshnessError::Network("boom".into()));
            }
            Ok(self.last_modified)
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>, FreshnessError> {
            Ok(self.body.clone())
        }
    }

    fn cache_file(dir: &tempfile::TempDir, name: &str) -> CacheFileConfig {
        CacheFileConfig {
            url: format!("https://example.test/{name}"),
            local_file: dir.path().join(name).to_string_lossy().into_owned(),
        }
    }

    #[tokio::test]
    async fn missing_local_file_always_triggers_update() {
        let dir = tempfile::tempdir().unwrap();
        let file = cache_file(&dir, "systems.jsonl");
        let fetch = FakeFetch {
            last_modified: Some(1_700_000_000),
            body: b"hello".to_vec(),
            fail_head: false,
            calls: Mutex::new(0),
        };

        let result = check_one(&fetch, &file).await;
        assert!(result.updated);
        assert!(result.error.is_none());
        assert_eq!(std::fs::read(&file.local_file).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn head_failure_is_reported_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let file = cache_file(&dir, "stations.jsonl");
        let fetch = FakeFetch {
            last_modified: None,
            body: Vec::new(),
            fail_head: true,
            calls: Mutex::new(0),
        };

        let result = check_one(&fetch, &file).await;
        assert!(!result.updated);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn fresh_local_file_is_not_redownloaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = cache_file(&dir, "factions.jsonl");
        std::fs::write(&file.local_file, b"existing").unwrap();

        let far_future = chrono::Utc::now().timestamp() - 10_000_000;
        let fetch = FakeFetch {
            last_modified: Some(far_future),
            body: b"new".to_vec(),
            fail_head: false,
            calls: Mutex::new(0),
        };

        let result = check_one(&fetch, &file).await;
        assert!(!result.updated);
        assert_eq!(std::fs::read(&file.local_file).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn any_updated_reflects_batch_results() {
        let results = vec![
            FreshnessResult { local_file: "a".into(), updated: false, error: None },
            FreshnessResult { local_file: "b".into(), updated: true, error: None },
        ];
        assert!(any_updated(&results));
    }
}
