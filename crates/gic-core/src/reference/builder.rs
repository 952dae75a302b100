//! Reference snapshot builder (§4.C).
//!
//! Parses the five catalog files and assembles an immutable `EddbInfo`
//! bundle. Build order is fixed: commodities -> systems -> stations ->
//! factions -> listings, after which listings are attached to their
//! commodity's selling/buying maps and stations are attached to their systems.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::geometry::Point3D;
use crate::reference::model::{
    BuildReport, Commodity, EddbInfo, Faction, LandingPad, Listing, PriceAggregates, Station,
    System,
};

/// Local filesystem paths to the five catalog files (§6).
#[derive(Debug, Clone)]
pub struct CatalogPaths {
    pub systems: String,
    pub stations: String,
    pub factions: String,
    pub commodities: String,
    pub listings: String,
}

/// Fatal build errors — everything else is logged and skipped per-record.
#[derive(Debug)]
pub enum BuildError {
    Io { file: String, source: std::io::Error },
    UnknownCsvColumn { column: String },
    MissingCsvColumn { column: String },
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Io { file, source } => write!(f, "failed reading {file}: {source}"),
            BuildError::UnknownCsvColumn { column } => {
                write!(f, "listings.csv has unknown column '{column}'")
            }
            BuildError::MissingCsvColumn { column } => {
                write!(f, "listings.csv is missing required column '{column}'")
            }
        }
    }
}

impl std::error::Error for BuildError {}

#[derive(Deserialize)]
struct RawSystem {
    id: i64,
    name: String,
    x: f64,
    y: f64,
    z: f64,
    #[serde(default)]
    population: Option<u64>,
    #[serde(default)]
    allegiance: Option<String>,
    #[serde(default)]
    government: Option<String>,
    #[serde(default)]
    controlling_minor_faction_id: Option<i64>,
    #[serde(default)]
    controlling_minor_faction_state: Option<String>,
    #[serde(default)]
    security: Option<String>,
    #[serde(default)]
    reserve_type: Option<String>,
    #[serde(default)]
    primary_economy: Option<String>,
    #[serde(default)]
    updated_at: Option<i64>,
}

#[derive(Deserialize)]
struct RawStation {
    id: i64,
    name: String,
    system_id: i64,
    #[serde(default)]
    max_landing_pad_size: Option<String>,
    #[serde(default)]
    distance_to_star: Option<f64>,
    #[serde(default)]
    has_docking: Option<bool>,
    #[serde(default)]
    is_planetary: Option<bool>,
    #[serde(default)]
    has_market: Option<bool>,
    #[serde(default)]
    market_updated_at: Option<i64>,
}

#[derive(Deserialize)]
struct RawFaction {
    id: i64,
    name: String,
    #[serde(default)]
    allegiance: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    is_player_faction: Option<bool>,
}

#[derive(Deserialize)]
struct RawCommodity {
    id: i64,
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    average_buy_price: Option<i64>,
    #[serde(default)]
    average_sell_price: Option<i64>,
}

const LISTINGS_COLUMNS: &[&str] = &[
    "id",
    "station_id",
    "commodity_id",
    "supply",
    "supply_bracket",
    "buy_price",
    "sell_price",
    "demand",
    "demand_bracket",
    "collected_at",
];

/// Parses all five catalog files and builds the immutable reference snapshot.
pub fn build(paths: &CatalogPaths) -> Result<(EddbInfo, BuildReport), BuildError> {
    let mut report = BuildReport::default();

    let mut commodities = build_commodities(&paths.commodities, &mut report)?;
    let (mut systems, systems_by_upper_name) = build_systems(&paths.systems, &mut report)?;
    let mut stations = build_stations(&paths.stations, &mut report)?;
    let factions = build_factions(&paths.factions, &mut report)?;

    attach_stations_to_systems(&mut systems, &mut stations, &mut report);
    attach_listings(&paths.listings, &mut commodities, &mut stations, &mut report)?;

    Ok((
        EddbInfo {
            commodities,
            systems,
            stations,
            factions,
            systems_by_upper_name,
        },
        report,
    ))
}

fn read_lines(path: &str) -> Result<Vec<String>, BuildError> {
    let content = fs::read_to_string(path).map_err(|source| BuildError::Io {
        file: path.to_string(),
        source,
    })?;
    Ok(content.lines().map(|l| l.to_string()).collect())
}

/// Parses `systems.jsonl` and, in the same pass (while file order is still
/// available), builds the upper-cased-name index — duplicate names keep the
/// last-seen record, in file order, which is only well-defined while
/// iterating the lines themselves rather than an unordered `HashMap` later.
fn build_systems(
    path: &str,
    report: &mut BuildReport,
) -> Result<(HashMap<i64, System>, HashMap<String, i64>), BuildError> {
    let mut systems = HashMap::new();
    let mut systems_by_upper_name: HashMap<String, i64> = HashMap::new();
    for line in read_lines(path)? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawSystem>(&line) {
            Ok(raw) => {
                report.systems_parsed += 1;
                let key = raw.name.to_uppercase();
                if let Some(&existing_id) = systems_by_upper_name.get(&key)
                    && existing_id != raw.id
                {
                    warn!(
                        "duplicate system name '{}' (ids {} and {}); keeping last-seen",
                        raw.name, existing_id, raw.id
                    );
                }
                systems_by_upper_name.insert(key, raw.id);
                systems.insert(
                    raw.id,
                    System {
                        id: raw.id,
                        name: raw.name,
                        coords: Point3D::new(raw.x, raw.y, raw.z),
                        population: raw.population,
                        allegiance: raw.allegiance,
                        government: raw.government,
                        controlling_faction_id: raw.controlling_minor_faction_id,
                        faction_state: raw.controlling_minor_faction_state,
                        security: raw.security,
                        reserve_type: raw.reserve_type,
                        primary_economy: raw.primary_economy,
                        updated_at: raw.updated_at.unwrap_or(0),
                        station_ids: Vec::new(),
                    },
                );
            }
            Err(e) => {
                report.systems_skipped += 1;
                warn!("skipping malformed system record in {path}: {e}");
            }
        }
    }
    Ok((systems, systems_by_upper_name))
}

fn build_stations(
    path: &str,
    report: &mut BuildReport,
) -> Result<HashMap<i64, Station>, BuildError> {
    let mut stations = HashMap::new();
    for line in read_lines(path)? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawStation>(&line) {
            Ok(raw) => {
                report.stations_parsed += 1;
                stations.insert(
                    raw.id,
                    Station {
                        id: raw.id,
                        name: raw.name,
                        system_id: raw.system_id,
                        max_landing_pad_size: raw
                            .max_landing_pad_size
                            .as_deref()
                            .map(LandingPad::parse)
                            .unwrap_or(LandingPad::Unknown),
                        distance_to_star_ls: raw.distance_to_star,
                        has_docking: raw.has_docking.unwrap_or(false),
                        has_market: raw.has_market.unwrap_or(false),
                        is_planetary: raw.is_planetary.unwrap_or(false),
                        market_updated_at: raw.market_updated_at,
                        listings_by_commodity: HashMap::new(),
                    },
                );
            }
            Err(e) => {
                warn!("skipping malformed station record in {path}: {e}");
            }
        }
    }
    Ok(stations)
}

fn build_factions(
    path: &str,
    report: &mut BuildReport,
) -> Result<HashMap<i64, Faction>, BuildError> {
    let mut factions = HashMap::new();
    for line in read_lines(path)? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawFaction>(&line) {
            Ok(raw) => {
                report.factions_parsed += 1;
                factions.insert(
                    raw.id,
                    Faction {
                        id: raw.id,
                        name: raw.name,
                        allegiance: raw.allegiance,
                        state: raw.state,
                        is_player_faction: raw.is_player_faction.unwrap_or(false),
                    },
                );
            }
            Err(e) => {
                report.factions_skipped += 1;
                warn!("skipping malformed faction record in {path}: {e}");
            }
        }
    }
    Ok(factions)
}

fn build_commodities(
    path: &str,
    report: &mut BuildReport,
) -> Result<HashMap<i64, Commodity>, BuildError> {
    let content = fs::read_to_string(path).map_err(|source| BuildError::Io {
        file: path.to_string(),
        source,
    })?;
    let raw_list: Vec<RawCommodity> = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("commodities.json failed to parse as a JSON array: {e}");
            Vec::new()
        }
    };

    let mut commodities = HashMap::new();
    for raw in raw_list {
        report.commodities_parsed += 1;
        commodities.insert(
            raw.id,
            Commodity {
                id: raw.id,
                name: raw.name,
                category: raw.category.unwrap_or_else(|| "Unknown".to_string()),
                price_aggregates: PriceAggregates {
                    average_buy_price: raw.average_buy_price,
                    average_sell_price: raw.average_sell_price,
                },
                selling: HashMap::new(),
                buying: HashMap::new(),
            },
        );
    }
    Ok(commodities)
}

fn parse_int_or_zero(field: &str) -> i64 {
    if field.trim().is_empty() {
        0
    } else {
        field.trim().parse().unwrap_or(0)
    }
}

fn attach_listings(
    path: &str,
    commodities: &mut HashMap<i64, Commodity>,
    stations: &mut HashMap<i64, Station>,
    report: &mut BuildReport,
) -> Result<(), BuildError> {
    let file = fs::File::open(path).map_err(|source| BuildError::Io {
        file: path.to_string(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|_| BuildError::MissingCsvColumn { column: "id".to_string() })?
        .clone();
    for h in headers.iter() {
        if !LISTINGS_COLUMNS.contains(&h) {
            return Err(BuildError::UnknownCsvColumn { column: h.to_string() });
        }
    }

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed listings.csv row: {e}");
                continue;
            }
        };
        let by_name = |name: &str| -> Option<&str> {
            headers.iter().position(|h| h == name).and_then(|i| record.get(i))
        };

        let (Some(id), Some(station_id), Some(commodity_id)) = (
            by_name("id").and_then(|v| v.parse::<i64>().ok()),
            by_name("station_id").and_then(|v| v.parse::<i64>().ok()),
            by_name("commodity_id").and_then(|v| v.parse::<i64>().ok()),
        ) else {
            warn!("skipping listings.csv row with unparseable id/station_id/commodity_id");
            continue;
        };

        let listing = Listing {
            id,
            station_id,
            commodity_id,
            supply: by_name("supply").map(parse_int_or_zero).unwrap_or(0),
            supply_bracket: by_name("supply_bracket").map(parse_int_or_zero).unwrap_or(0),
            buy_price: by_name("buy_price").map(parse_int_or_zero).unwrap_or(0),
            sell_price: by_name("sell_price").map(parse_int_or_zero).unwrap_or(0),
            demand: by_name("demand").map(parse_int_or_zero).unwrap_or(0),
            demand_bracket: by_name("demand_bracket").map(parse_int_or_zero).unwrap_or(0),
            collected_at: by_name("collected_at").map(parse_int_or_zero).unwrap_or(0),
        };

        let station = stations.get_mut(&station_id);
        let commodity = commodities.get_mut(&commodity_id);
        match (station, commodity) {
            (Some(station), Some(commodity)) => {
                report.listings_parsed += 1;
                station.listings_by_commodity.insert(commodity_id, listing);
                if listing.supply > 0 {
                    commodity.selling.insert(id, listing);
                }
                if listing.demand > 0 {
                    commodity.buying.insert(id, listing);
                }
            }
            _ => {
                report.listings_mismatched += 1;
            }
        }
    }

    Ok(())
}

/// Links each station into its system's `station_ids` and drops orphan
/// stations (those referencing an unknown system) from `stations` entirely,
/// so neither `attach_listings` nor `info.stations.len()` see them afterward.
fn attach_stations_to_systems(
    systems: &mut HashMap<i64, System>,
    stations: &mut HashMap<i64, Station>,
    report: &mut BuildReport,
) {
    let mut by_system: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut orphans = 0usize;
    for station in stations.values() {
        if systems.contains_key(&station.system_id) {
            by_system.entry(station.system_id).or_default().push(station.id);
        } else {
            orphans += 1;
            warn!(
                "station {} ({}) references unknown system {}, dropping",
                station.id, station.name, station.system_id
            );
        }
    }
    if orphans > 0 {
        warn!("{orphans} orphan station(s) dropped during snapshot build");
    }
    report.stations_orphaned = orphans;

    stations.retain(|_, s| systems.contains_key(&s.system_id));

    for (system_id, station_ids) in by_system {
        if let Some(system) = systems.get_mut(&system_id) {
            system.station_ids = station_ids;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn sample_paths(dir: &tempfile::TempDir) -> CatalogPaths {
        let systems = write_tmp(
            dir,
            "systems.jsonl",
            "{\"id\":1,\"name\":\"Sol\",\"x\":0.0,\"y\":0.0,\"z\":0.0,\"population\":8000000000}\n\
             {\"id\":2,\"name\":\"Deciat\",\"x\":1.0,\"y\":2.0,\"z\":3.0}\n\
             not json at all\n",
        );
        let stations = write_tmp(
            dir,
            "stations.jsonl",
            "{\"id\":10,\"name\":\"Daedalus\",\"system_id\":1,\"has_docking\":true}\n\
             {\"id\":11,\"name\":\"Orphan Base\",\"system_id\":999,\"has_docking\":true}\n",
        );
        let factions = write_tmp(
            dir,
            "factions.jsonl",
            "{\"id\":100,\"name\":\"Federation\",\"is_player_faction\":false}\n",
        );
        let commodities = write_tmp(
            dir,
            "commodities.json",
            "[{\"id\":200,\"name\":\"Gold\",\"category\":\"Metals\"}]",
        );
        let listings = write_tmp(
            dir,
            "listings.csv",
            "id,station_id,commodity_id,supply,supply_bracket,buy_price,sell_price,demand,demand_bracket,collected_at\n\
             1,10,200,500,2,,100,,0,1600000000\n\
             2,999,200,10,1,50,60,0,0,1600000000\n",
        );
        CatalogPaths { systems, stations, factions, commodities, listings }
    }

    #[test]
    fn builds_snapshot_and_skips_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let paths = sample_paths(&dir);
        let (info, report) = build(&paths).unwrap();

        assert_eq!(report.systems_parsed, 2);
        assert_eq!(report.systems_skipped, 1);
        assert_eq!(info.systems.len(), 2);

        let sol = info.system_by_name("sol").unwrap();
        assert_eq!(sol.station_ids, vec![10]);

        // Station 11 ("Orphan Base") references an unknown system and is
        // dropped from the snapshot entirely, not just unlinked.
        assert_eq!(report.stations_orphaned, 1);
        assert!(!info.stations.contains_key(&11));
        assert_eq!(info.stations.len(), 1);

        assert_eq!(report.listings_mismatched, 1);
        assert_eq!(report.listings_parsed, 1);

        let station = info.stations.get(&10).unwrap();
        let listing = station.listings_by_commodity.get(&200).unwrap();
        assert_eq!(listing.supply, 500);
        assert_eq!(listing.demand, 0);

        let commodity = info.commodities.get(&200).unwrap();
        assert!(commodity.selling.contains_key(&1));
        assert!(!commodity.buying.contains_key(&1));
    }

    #[test]
    fn duplicate_system_name_keeps_last_seen_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = sample_paths(&dir);
        paths.systems = write_tmp(
            &dir,
            "dup_systems.jsonl",
            "{\"id\":1,\"name\":\"Sol\",\"x\":0.0,\"y\":0.0,\"z\":0.0}\n\
             {\"id\":2,\"name\":\"Sol\",\"x\":1.0,\"y\":1.0,\"z\":1.0}\n",
        );
        let (info, _report) = build(&paths).unwrap();
        assert_eq!(info.system_by_name("sol").unwrap().id, 2);
    }

    #[test]
    fn unknown_csv_column_aborts_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = sample_paths(&dir);
        paths.listings = write_tmp(
            &dir,
            "bad_listings.csv",
            "id,station_id,commodity_id,supply,mystery_column\n1,10,200,5,x\n",
        );
        let err = build(&paths).unwrap_err();
        assert!(matches!(err, BuildError::UnknownCsvColumn { .. }));
    }

    #[test]
    fn system_name_index_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let paths = sample_paths(&dir);
        let (info, _report) = build(&paths).unwrap();
        assert!(info.system_by_name("SOL").is_some());
        assert!(info.system_by_name("sol").is_some());
        assert!(info.system_by_name("SoL").is_some());
    }
}
