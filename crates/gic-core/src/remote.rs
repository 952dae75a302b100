//! Remote System Lookup (§4.F): bounded-concurrency fetch of systems absent
//! from the reference snapshot, with a 60-minute expiring cache and
//! fallback-to-stale policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::geometry::Point3D;

const CACHE_TTL_SECS: i64 = 60 * 60;
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// No cache slot available and no concurrency slot to refresh (§4.F, §7).
    ResourceExhausted,
    Network(String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::ResourceExhausted => write!(f, "remote lookup concurrency exhausted"),
            RemoteError::Network(msg) => write!(f, "remote lookup network error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Minimal system data as returned by the remote lookup API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSystem {
    pub id: String,
    pub name: String,
    pub coords: Point3D,
    pub information: Option<RemoteSystemInformation>,
    pub primary_star: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteSystemInformation {
    pub population: Option<u64>,
    pub allegiance: Option<String>,
}

/// Wire shape of a remote system response. `information` may arrive as either
/// an object or an empty array (`[]`) meaning "no information" — the second
/// decode pass below maps both onto `Option<RemoteSystemInformation>`.
#[derive(Debug, Deserialize)]
struct RawRemoteSystem {
    id: String,
    name: String,
    x: f64,
    y: f64,
    z: f64,
    #[serde(default, deserialize_with = "information_or_empty_array")]
    information: Option<RemoteSystemInformation>,
    #[serde(default)]
    primary_star: Option<String>,
}

fn information_or_empty_array<'de, D>(
    deserializer: D,
) -> Result<Option<RemoteSystemInformation>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(items) if items.is_empty() => Ok(None),
        serde_json::Value::Null => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl From<RawRemoteSystem> for RemoteSystem {
    fn from(raw: RawRemoteSystem) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            coords: Point3D::new(raw.x, raw.y, raw.z),
            information: raw.information,
            primary_star: raw.primary_star,
        }
    }
}

/// Abstraction over the remote system-info endpoint, so the cache/concurrency
/// policy can be tested without a real network.
#[async_trait::async_trait]
pub trait RemoteFetch: Send + Sync {
    async fn fetch_system(&self, upper_name: &str) -> Result<RemoteSystem, RemoteError>;
}

pub struct ReqwestRemoteFetch {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestRemoteFetch {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client configuration is valid");
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait::async_trait]
impl RemoteFetch for ReqwestRemoteFetch {
    async fn fetch_system(&self, upper_name: &str) -> Result<RemoteSystem, RemoteError> {
        let url = format!("{}/systems/{}", self.base_url, upper_name);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let raw: RawRemoteSystem = resp
            .json()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(raw.into())
    }
}

#[derive(Clone)]
struct CacheEntry {
    system: RemoteSystem,
    fetched_at_unix: i64,
}

/// Bounded-concurrency, TTL-caching remote lookup (§4.F, §5).
pub struct RemoteLookup {
    cache: RwLock<HashMap<String, CacheEntry>>,
    semaphore: Arc<Semaphore>,
    fetch: Box<dyn RemoteFetch>,
}

impl RemoteLookup {
    /// `max_concurrent` is clamped to `[1, 10]` per §4.F.
    pub fn new(fetch: Box<dyn RemoteFetch>, max_concurrent: usize) -> Self {
        let clamped = max_concurrent.clamp(1, 10);
        Self {
            cache: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(clamped)),
            fetch,
        }
    }

    /// Looks up `name` (case-insensitive), following §4.F's freshness/fallback policy.
    pub async fn lookup(&self, name: &str, now_unix: i64) -> Result<RemoteSystem, RemoteError> {
        let upper = name.to_uppercase();

        let cached = self.cache.read().get(&upper).cloned();
        if let Some(entry) = &cached {
            if now_unix - entry.fetched_at_unix < CACHE_TTL_SECS {
                return Ok(entry.system.clone());
            }
        }

        match self.semaphore.clone().try_acquire_owned() {
            Ok(_permit) => match self.fetch.fetch_system(&upper).await {
                Ok(system) => {
                    self.cache.write().insert(
                        upper,
                        CacheEntry { system: system.clone(), fetched_at_unix: now_unix },
                    );
                    Ok(system)
                }
                Err(e) => {
                    if let Some(entry) = cached {
                        warn!("remote refresh failed for {name}, serving stale: {e}");
                        Ok(entry.system)
                    } else {
                        Err(e)
                    }
                }
            },
            Err(_) => match cached {
                Some(entry) => Ok(entry.system),
                None => Err(RemoteError::ResourceExhausted),
            },
        }
    }
}
