//! Reference entity types (§3).
//!
//! Entities are plain data keyed by a stable integer id; cross-entity links
//! (station -> system, listing -> station/commodity) are stored as ids and
//! resolved through the owning `EddbInfo` bundle's maps rather than shared
//! pointers, so the published snapshot is a simple acyclic arena.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::Point3D;

/// Landing pad class a station can accommodate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub enum LandingPad {
    Small,
    Medium,
    Large,
    Unknown,
}

impl LandingPad {
    pub fn parse(s: &str) -> Self {
        match s {
            "S" | "s" => LandingPad::Small,
            "M" | "m" => LandingPad::Medium,
            "L" | "l" => LandingPad::Large,
            _ => LandingPad::Unknown,
        }
    }
}

/// A star system (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub id: i64,
    pub name: String,
    pub coords: Point3D,
    pub population: Option<u64>,
    pub allegiance: Option<String>,
    pub government: Option<String>,
    pub controlling_faction_id: Option<i64>,
    pub faction_state: Option<String>,
    pub security: Option<String>,
    pub reserve_type: Option<String>,
    pub primary_economy: Option<String>,
    pub updated_at: i64,
    /// Ids of stations in this system; resolved against `EddbInfo::stations`.
    pub station_ids: Vec<i64>,
}

/// A station orbiting or landed within a system (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub system_id: i64,
    pub max_landing_pad_size: LandingPad,
    pub distance_to_star_ls: Option<f64>,
    pub has_docking: bool,
    pub has_market: bool,
    pub is_planetary: bool,
    pub market_updated_at: Option<i64>,
    /// Listings at this station, keyed by commodity id.
    pub listings_by_commodity: HashMap<i64, Listing>,
}

impl Station {
    /// Whether this station can be used to dock and trade (§4.G `GetDockableStations`).
    pub fn is_dockable(&self) -> bool {
        self.has_docking
    }
}

/// A minor faction (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Faction {
    pub id: i64,
    pub name: String,
    pub allegiance: Option<String>,
    pub state: Option<String>,
    pub is_player_faction: bool,
}

/// Aggregate price statistics tracked per commodity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceAggregates {
    pub average_buy_price: Option<i64>,
    pub average_sell_price: Option<i64>,
}

/// A tradeable commodity (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commodity {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price_aggregates: PriceAggregates,
    /// Listing id -> Listing, for stations selling this commodity (supply > 0).
    pub selling: HashMap<i64, Listing>,
    /// Listing id -> Listing, for stations buying this commodity (demand > 0).
    pub buying: HashMap<i64, Listing>,
}

/// A single station/commodity market listing (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub station_id: i64,
    pub commodity_id: i64,
    pub supply: i64,
    pub supply_bracket: i64,
    pub demand: i64,
    pub demand_bracket: i64,
    pub buy_price: i64,
    pub sell_price: i64,
    pub collected_at: i64,
}

/// Per-file record counts produced while building a snapshot, logged by the
/// Supervisor after every rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub systems_parsed: usize,
    pub systems_skipped: usize,
    pub stations_parsed: usize,
    pub stations_orphaned: usize,
    pub factions_parsed: usize,
    pub factions_skipped: usize,
    pub commodities_parsed: usize,
    pub listings_parsed: usize,
    pub listings_mismatched: usize,
}

/// The immutable, atomically-swappable reference catalog (§3, §4.C).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EddbInfo {
    pub commodities: HashMap<i64, Commodity>,
    pub systems: HashMap<i64, System>,
    pub stations: HashMap<i64, Station>,
    pub factions: HashMap<i64, Faction>,
    /// Upper-cased system name -> system id, for case-insensitive lookup.
    pub systems_by_upper_name: HashMap<String, i64>,
}

impl EddbInfo {
    pub fn system_by_name(&self, name: &str) -> Option<&System> {
        let id = self.systems_by_upper_name.get(&name.to_uppercase())?;
        self.systems.get(id)
    }

    /// Stations belonging to a system, resolved through `stations`.
    pub fn stations_of(&self, system: &System) -> Vec<&Station> {
        system
            .station_ids
            .iter()
            .filter_map(|id| self.stations.get(id))
            .collect()
    }

    pub fn all_system_names(&self) -> Vec<&str> {
        self.systems.values().map(|s| s.name.as_str()).collect()
    }
}
