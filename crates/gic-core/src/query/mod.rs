//! Query Service (§4.G): the RPC-facing composition of the reference
//! snapshot (C), the live collector (E), and remote lookup (F).
//!
//! Every reply carries an `Option<String>` domain-error field distinct from
//! transport-level failures (§6, §7): an unknown system, an exhausted
//! resource, or a bad input parameter is reported in-band rather than as a
//! transport error, so a Chat Gateway caller can branch on it directly.

use std::sync::Arc;

use strsim::jaro_winkler;

use crate::collector::CollectorHandle;
use crate::geometry::{distance, Point3D, SOL};
use crate::reference::{EddbInfo, SnapshotSlot};
use crate::remote::RemoteLookup;

const MAX_FUZZY_SUGGESTIONS: usize = 10;
const MAX_INTERESTING_SYSTEMS: usize = 20;
/// Width of the activity series returned by `GetGalaxyActivityStat`, matching
/// the collector's own hourly-bucket histogram capacity.
const ACTIVITY_HOURS: usize = 168;

const ERR_EDDB_UNAVAILABLE: &str = "EDDB processor is not (yet) available";
const ERR_STAT_COLLECTOR_UNSET: &str = "Stat collector is not set";
const ERR_EMPTY_STATES: &str = "Empty states";
const ERR_ZERO_POPULATION: &str = "Zero population";

fn err_unknown(name: &str) -> String {
    format!("System '{name}' is not known to me")
}

fn err_not_habitable(name: &str) -> String {
    format!("System '{name}' is not habitable")
}

/// A resolved system, however it was found: from the snapshot (always
/// "habitable", i.e. carries whatever population data the catalog has) or
/// from remote lookup, where an empty `information` block (§4.F's
/// `"information":[]` case) means the remote explicitly reported nothing —
/// treated here as "not habitable" rather than "unknown".
struct ResolvedSystem {
    name: String,
    coords: Point3D,
    population: Option<u64>,
    habitable: bool,
}

async fn resolve_system(
    snapshot: &EddbInfo,
    remote: Option<&RemoteLookup>,
    name: &str,
    now_unix: i64,
) -> Result<ResolvedSystem, String> {
    if let Some(sys) = snapshot.system_by_name(name) {
        return Ok(ResolvedSystem {
            name: sys.name.clone(),
            coords: sys.coords,
            population: sys.population,
            habitable: true,
        });
    }

    let remote = remote.ok_or_else(|| err_unknown(name))?;
    let remote_system = remote.lookup(name, now_unix).await.map_err(|_| err_unknown(name))?;
    Ok(ResolvedSystem {
        name: remote_system.name.clone(),
        coords: remote_system.coords,
        population: remote_system.information.as_ref().and_then(|i| i.population),
        habitable: remote_system.information.is_some(),
    })
}

fn fuzzy_suggestions(snapshot: &EddbInfo, name: &str, limit: usize) -> Vec<String> {
    let needle = name.to_lowercase();
    let mut scored: Vec<(f64, &str)> = snapshot
        .systems
        .values()
        .map(|s| (jaro_winkler(&s.name.to_lowercase(), &needle), s.name.as_str()))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, n)| n.to_string()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct DistanceReply {
    pub distance_ly: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SystemSummaryReply {
    pub coords: Option<Point3D>,
    pub population: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationSummary {
    pub name: String,
    pub max_landing_pad_size: crate::reference::model::LandingPad,
    pub distance_to_star_ls: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct DockableStationsReply {
    pub stations: Vec<StationSummary>,
    pub suggestions: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HumanWorldStatReply {
    pub systems: usize,
    pub stations: usize,
    pub factions: usize,
    pub player_factions: usize,
    pub population_sum: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MostVisitedEntry {
    pub name: String,
    pub coords: Point3D,
    pub total_count: u64,
    pub distance_ly: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MostVisitedReply {
    pub entries: Vec<MostVisitedEntry>,
    pub total_count: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityReply {
    pub buckets: Vec<crate::collector::ActivityBucket>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemSummary {
    pub name: String,
    pub coords: Point3D,
    pub population: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct InterestingSystemsReply {
    pub systems: Vec<SystemSummary>,
    pub error: Option<String>,
}

/// The RPC-facing composition point. Stateless beyond the atomic snapshot
/// handle, the collector handle, and the remote-lookup cache — all three are
/// themselves independently owned components.
pub struct QueryService {
    snapshot: Arc<SnapshotSlot>,
    collector: Option<CollectorHandle>,
    remote: Option<Arc<RemoteLookup>>,
}

impl QueryService {
    pub fn new(
        snapshot: Arc<SnapshotSlot>,
        collector: Option<CollectorHandle>,
        remote: Option<Arc<RemoteLookup>>,
    ) -> Self {
        Self { snapshot, collector, remote }
    }

    pub async fn get_distance(&self, name1: &str, name2: &str, now_unix: i64) -> DistanceReply {
        let snapshot = self.snapshot.load();
        let remote = self.remote.as_deref();

        let first = match resolve_system(&snapshot, remote, name1, now_unix).await {
            Ok(s) => s,
            Err(e) => return DistanceReply { distance_ly: None, error: Some(e) },
        };
        let second = match resolve_system(&snapshot, remote, name2, now_unix).await {
            Ok(s) => s,
            Err(e) => return DistanceReply { distance_ly: None, error: Some(e) },
        };

        DistanceReply { distance_ly: Some(distance(first.coords, second.coords)), error: None }
    }

    pub async fn get_system_summary(&self, name: &str, now_unix: i64) -> SystemSummaryReply {
        let snapshot = self.snapshot.load();
        match resolve_system(&snapshot, self.remote.as_deref(), name, now_unix).await {
            Ok(resolved) if !resolved.habitable => SystemSummaryReply {
                coords: None,
                population: None,
                error: Some(err_not_habitable(name)),
            },
            Ok(resolved) => SystemSummaryReply {
                coords: Some(resolved.coords),
                population: resolved.population,
                error: None,
            },
            Err(e) => SystemSummaryReply { coords: None, population: None, error: Some(e) },
        }
    }

    pub fn get_dockable_stations(&self, name: &str) -> DockableStationsReply {
        let snapshot = self.snapshot.load();
        match snapshot.system_by_name(name) {
            Some(system) => {
                let stations = snapshot
                    .stations_of(system)
                    .into_iter()
                    .filter(|s| s.is_dockable())
                    .map(|s| StationSummary {
                        name: s.name.clone(),
                        max_landing_pad_size: s.max_landing_pad_size,
                        distance_to_star_ls: s.distance_to_star_ls,
                    })
                    .collect();
                DockableStationsReply { stations, suggestions: Vec::new(), error: None }
            }
            None => DockableStationsReply {
                stations: Vec::new(),
                suggestions: fuzzy_suggestions(&snapshot, name, MAX_FUZZY_SUGGESTIONS),
                error: Some(err_unknown(name)),
            },
        }
    }

    pub fn get_human_world_stat(&self) -> HumanWorldStatReply {
        let snapshot = self.snapshot.load();
        if snapshot.systems.is_empty() {
            return HumanWorldStatReply { error: Some(ERR_EDDB_UNAVAILABLE.to_string()), ..Default::default() };
        }
        HumanWorldStatReply {
            systems: snapshot.systems.len(),
            stations: snapshot.stations.len(),
            factions: snapshot.factions.len(),
            player_factions: snapshot.factions.values().filter(|f| f.is_player_faction).count(),
            population_sum: snapshot.systems.values().filter_map(|s| s.population).sum(),
            error: None,
        }
    }

    pub async fn get_most_visited_systems(
        &self,
        origin: &str,
        max_distance_ly: f64,
        limit: usize,
        now_unix: i64,
    ) -> MostVisitedReply {
        let Some(collector) = &self.collector else {
            return MostVisitedReply { error: Some(ERR_STAT_COLLECTOR_UNSET.to_string()), ..Default::default() };
        };

        let snapshot = self.snapshot.load();
        let resolved = match resolve_system(&snapshot, self.remote.as_deref(), origin, now_unix).await {
            Ok(s) => s,
            Err(e) => return MostVisitedReply { error: Some(e), ..Default::default() },
        };

        let (entries, total_count) = collector.get_system_stat(resolved.coords, max_distance_ly).await;
        let mut sorted: Vec<MostVisitedEntry> = entries
            .into_iter()
            .map(|e| MostVisitedEntry {
                distance_ly: distance(resolved.coords, e.coords),
                name: e.name,
                coords: e.coords,
                total_count: e.total_count,
            })
            .collect();
        sorted.sort_by(|a, b| b.total_count.cmp(&a.total_count));
        sorted.truncate(limit);

        MostVisitedReply { entries: sorted, total_count, error: None }
    }

    pub async fn get_galaxy_activity_stat(
        &self,
        origin: Option<&str>,
        max_distance_ly: f64,
        now_unix: i64,
    ) -> ActivityReply {
        let Some(collector) = &self.collector else {
            return ActivityReply { error: Some(ERR_STAT_COLLECTOR_UNSET.to_string()), ..Default::default() };
        };

        let origin_coords = match origin {
            Some(name) if name.len() > 1 => {
                let snapshot = self.snapshot.load();
                match resolve_system(&snapshot, self.remote.as_deref(), name, now_unix).await {
                    Ok(s) => s.coords,
                    Err(e) => return ActivityReply { error: Some(e), ..Default::default() },
                }
            }
            _ => SOL,
        };

        let buckets = collector.get_activity(origin_coords, max_distance_ly, ACTIVITY_HOURS).await;
        ActivityReply { buckets, error: None }
    }

    pub async fn get_interesting_systems_for_state(
        &self,
        origin: &str,
        states: &[String],
        min_population: u64,
        max_distance_ly: f64,
        now_unix: i64,
    ) -> InterestingSystemsReply {
        if states.is_empty() {
            return InterestingSystemsReply { error: Some(ERR_EMPTY_STATES.to_string()), ..Default::default() };
        }
        if min_population == 0 {
            return InterestingSystemsReply { error: Some(ERR_ZERO_POPULATION.to_string()), ..Default::default() };
        }

        let snapshot = self.snapshot.load();
        if snapshot.systems.is_empty() {
            return InterestingSystemsReply { error: Some(ERR_EDDB_UNAVAILABLE.to_string()), ..Default::default() };
        }

        let resolved = match resolve_system(&snapshot, self.remote.as_deref(), origin, now_unix).await {
            Ok(s) => s,
            Err(e) => return InterestingSystemsReply { error: Some(e), ..Default::default() },
        };

        let mut systems: Vec<SystemSummary> = snapshot
            .systems
            .values()
            .filter(|s| {
                s.faction_state.as_deref().map(|st| states.iter().any(|wanted| wanted == st)).unwrap_or(false)
                    && s.population.unwrap_or(0) >= min_population
                    && distance(resolved.coords, s.coords) <= max_distance_ly
                    && s.controlling_faction_id.map(|id| snapshot.factions.contains_key(&id)).unwrap_or(false)
            })
            .map(|s| SystemSummary { name: s.name.clone(), coords: s.coords, population: s.population })
            .collect();
        systems.truncate(MAX_INTERESTING_SYSTEMS);

        InterestingSystemsReply { systems, error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::model::{Faction, System};

    fn snapshot_with_sol_and_alpha_centauri() -> EddbInfo {
        let mut info = EddbInfo::default();
        info.factions.insert(
            1,
            Faction { id: 1, name: "Federation".into(), allegiance: None, state: None, is_player_faction: false },
        );
        info.systems.insert(
            1,
            System {
                id: 1,
                name: "Sol".into(),
                coords: SOL,
                population: Some(22_780_000_000),
                allegiance: None,
                government: None,
                controlling_faction_id: Some(1),
                faction_state: Some("Boom".into()),
                security: None,
                reserve_type: None,
                primary_economy: None,
                updated_at: 0,
                station_ids: vec![],
            },
        );
        info.systems.insert(
            2,
            System {
                id: 2,
                name: "Alpha Centauri".into(),
                coords: Point3D::new(3.03, -0.09, 3.17),
                population: Some(27_000),
                allegiance: None,
                government: None,
                controlling_faction_id: Some(1),
                faction_state: Some("Boom".into()),
                security: None,
                reserve_type: None,
                primary_economy: None,
                updated_at: 0,
                station_ids: vec![],
            },
        );
        info.systems_by_upper_name.insert("SOL".into(), 1);
        info.systems_by_upper_name.insert("ALPHA CENTAURI".into(), 2);
        info
    }

    fn service_with(info: EddbInfo) -> QueryService {
        QueryService::new(Arc::new(SnapshotSlot::new(info)), None, None)
    }

    #[tokio::test]
    async fn distance_scenario_from_spec() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service.get_distance("Sol", "Alpha Centauri", 0).await;
        assert!(reply.error.is_none());
        assert!((reply.distance_ly.unwrap() - 4.379).abs() < 1e-3);
    }

    #[tokio::test]
    async fn unknown_system_scenario_from_spec() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service.get_system_summary("Xyzzy", 0).await;
        assert_eq!(reply.error, Some("System 'Xyzzy' is not known to me".to_string()));
    }

    #[tokio::test]
    async fn human_world_stat_reports_counts() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service.get_human_world_stat();
        assert!(reply.error.is_none());
        assert_eq!(reply.systems, 2);
        assert_eq!(reply.factions, 1);
        assert_eq!(reply.population_sum, 22_780_027_000);
    }

    #[tokio::test]
    async fn human_world_stat_errors_on_empty_catalog() {
        let service = service_with(EddbInfo::default());
        let reply = service.get_human_world_stat();
        assert_eq!(reply.error, Some("EDDB processor is not (yet) available".to_string()));
    }

    #[tokio::test]
    async fn dockable_stations_suggests_known_names_for_unknown_system() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service.get_dockable_stations("Solaris");
        assert!(reply.error.is_some());
        assert!(reply.suggestions.len() <= 10);
        assert!(reply.suggestions.iter().all(|s| s == "Sol" || s == "Alpha Centauri"));
    }

    #[tokio::test]
    async fn most_visited_reports_missing_collector() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service.get_most_visited_systems("Sol", 1000.0, 5, 0).await;
        assert_eq!(reply.error, Some("Stat collector is not set".to_string()));
    }

    #[tokio::test]
    async fn interesting_systems_rejects_empty_states() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service.get_interesting_systems_for_state("Sol", &[], 1, 1000.0, 0).await;
        assert_eq!(reply.error, Some("Empty states".to_string()));
    }

    #[tokio::test]
    async fn interesting_systems_rejects_zero_population() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service
            .get_interesting_systems_for_state("Sol", &["Boom".to_string()], 0, 1000.0, 0)
            .await;
        assert_eq!(reply.error, Some("Zero population".to_string()));
    }

    #[tokio::test]
    async fn interesting_systems_finds_matching_records_within_radius() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service
            .get_interesting_systems_for_state("Sol", &["Boom".to_string()], 1, 10.0, 0)
            .await;
        assert!(reply.error.is_none());
        let names: Vec<&str> = reply.systems.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Sol"));
        assert!(names.contains(&"Alpha Centauri"));
    }

    #[tokio::test]
    async fn interesting_systems_excludes_records_outside_the_radius() {
        let service = service_with(snapshot_with_sol_and_alpha_centauri());
        let reply = service
            .get_interesting_systems_for_state("Sol", &["Boom".to_string()], 1, 1.0, 0)
            .await;
        assert!(reply.error.is_none());
        assert_eq!(reply.systems.len(), 1);
        assert_eq!(reply.systems[0].name, "Sol");
    }
}
