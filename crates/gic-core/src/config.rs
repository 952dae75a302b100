//! Recognized Supervisor configuration keys (§6).
//!
//! Parsing a YAML/JSON file into this struct is left to the binary that embeds
//! `gic-core` (an external concern per spec.md's Non-goals); this module only
//! defines the shape and sensible defaults, the way the teacher's `Args`
//! structs pair `clap` defaults with environment overrides.

use serde::{Deserialize, Serialize};

/// One entry of the `EDDBCache.*` family: a catalog file with its remote URL
/// and local on-disk path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFileConfig {
    pub url: String,
    pub local_file: String,
}

/// The five `EDDBCache.*` catalog files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EddbCacheConfig {
    pub systems: CacheFileConfig,
    pub stations: CacheFileConfig,
    pub factions: CacheFileConfig,
    pub commodities: CacheFileConfig,
    pub listings: CacheFileConfig,
}

/// `GrpcSrv.*` — the RPC listener. Named for wire compatibility with the
/// original configuration keys even though the transport is HTTP/JSON, not gRPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcServerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            port: 50051,
            enabled: true,
        }
    }
}

/// `StarStat.*` — collector checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarStatConfig {
    pub backup_file: Option<String>,
    #[serde(default = "default_backup_period")]
    pub backup_period_secs: u64,
}

fn default_backup_period() -> u64 {
    60
}

impl Default for StarStatConfig {
    fn default() -> Self {
        Self {
            backup_file: None,
            backup_period_secs: default_backup_period(),
        }
    }
}

/// Top-level Supervisor configuration. Unrecognized keys in the source
/// document are ignored by whatever loader constructs this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub eddb_cache: EddbCacheConfig,
    /// Seconds between freshness checks of the five catalog files.
    pub check_period_secs: u64,
    pub grpc_srv: RpcServerConfig,
    #[serde(default)]
    pub star_stat: StarStatConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_stat_default_backup_period_is_60s() {
        let cfg = StarStatConfig::default();
        assert_eq!(cfg.backup_period_secs, 60);
        assert!(cfg.backup_file.is_none());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = Config {
            eddb_cache: EddbCacheConfig {
                systems: CacheFileConfig { url: "https://example.test/systems.jsonl".into(), local_file: "systems.jsonl".into() },
                stations: CacheFileConfig { url: "https://example.test/stations.jsonl".into(), local_file: "stations.jsonl".into() },
                factions: CacheFileConfig { url: "https://example.test/factions.jsonl".into(), local_file: "factions.jsonl".into() },
                commodities: CacheFileConfig { url: "https://example.test/commodities.json".into(), local_file: "commodities.json".into() },
                listings: CacheFileConfig { url: "https://example.test/listings.csv".into(), local_file: "listings.csv".into() },
            },
            check_period_secs: 3600,
            grpc_srv: RpcServerConfig::default(),
            star_stat: StarStatConfig::default(),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.check_period_secs, 3600);
    }
}
