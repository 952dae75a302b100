//! HTTP/JSON routes for the Query Service (§4.G), one per RPC endpoint.
//!
//! The teacher's `rpglot-web` exposes its API as `axum` GET routes returning
//! `Json<...>` bodies with a `utoipa::OpenApi` schema; the wire here follows
//! the same shape but POSTs a JSON request body, since every endpoint here
//! takes several named parameters rather than one path segment. Domain errors
//! (§4.G/§7) ride inside the 200 response body's `error` field; only
//! transport failures (state missing, body malformed) become non-2xx.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use gic_core::collector::ActivityBucket;
use gic_core::geometry::Point3D;
use gic_core::query::QueryService;
use gic_core::reference::model::LandingPad;

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DistanceRequest {
    pub name1: String,
    pub name2: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DistanceResponse {
    pub distance_ly: Option<f64>,
    pub error: Option<String>,
}

/// `GetDistance` (§4.G).
#[utoipa::path(post, path = "/api/v1/distance", request_body = DistanceRequest, responses((status = 200, body = DistanceResponse)))]
pub async fn get_distance(
    State(service): State<Arc<QueryService>>,
    Json(req): Json<DistanceRequest>,
) -> Json<DistanceResponse> {
    let reply = service.get_distance(&req.name1, &req.name2, now_unix()).await;
    Json(DistanceResponse { distance_ly: reply.distance_ly, error: reply.error })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SystemNameRequest {
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemSummaryResponse {
    pub coords: Option<Point3D>,
    pub population: Option<u64>,
    pub error: Option<String>,
}

/// `GetSystemSummary` (§4.G).
#[utoipa::path(post, path = "/api/v1/system-summary", request_body = SystemNameRequest, responses((status = 200, body = SystemSummaryResponse)))]
pub async fn get_system_summary(
    State(service): State<Arc<QueryService>>,
    Json(req): Json<SystemNameRequest>,
) -> Json<SystemSummaryResponse> {
    let reply = service.get_system_summary(&req.name, now_unix()).await;
    Json(SystemSummaryResponse { coords: reply.coords, population: reply.population, error: reply.error })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StationSummaryDto {
    pub name: String,
    pub max_landing_pad_size: LandingPad,
    pub distance_to_star_ls: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DockableStationsResponse {
    pub stations: Vec<StationSummaryDto>,
    pub suggestions: Vec<String>,
    pub error: Option<String>,
}

/// `GetDockableStations` (§4.G).
#[utoipa::path(post, path = "/api/v1/dockable-stations", request_body = SystemNameRequest, responses((status = 200, body = DockableStationsResponse)))]
pub async fn get_dockable_stations(
    State(service): State<Arc<QueryService>>,
    Json(req): Json<SystemNameRequest>,
) -> Json<DockableStationsResponse> {
    let reply = service.get_dockable_stations(&req.name);
    Json(DockableStationsResponse {
        stations: reply
            .stations
            .into_iter()
            .map(|s| StationSummaryDto {
                name: s.name,
                max_landing_pad_size: s.max_landing_pad_size,
                distance_to_star_ls: s.distance_to_star_ls,
            })
            .collect(),
        suggestions: reply.suggestions,
        error: reply.error,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HumanWorldStatResponse {
    pub systems: usize,
    pub stations: usize,
    pub factions: usize,
    pub player_factions: usize,
    pub population_sum: u64,
    pub error: Option<String>,
}

/// `GetHumanWorldStat` (§4.G).
#[utoipa::path(get, path = "/api/v1/human-world-stat", responses((status = 200, body = HumanWorldStatResponse)))]
pub async fn get_human_world_stat(
    State(service): State<Arc<QueryService>>,
) -> Json<HumanWorldStatResponse> {
    let reply = service.get_human_world_stat();
    Json(HumanWorldStatResponse {
        systems: reply.systems,
        stations: reply.stations,
        factions: reply.factions,
        player_factions: reply.player_factions,
        population_sum: reply.population_sum,
        error: reply.error,
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MostVisitedRequest {
    pub origin: String,
    pub max_distance_ly: f64,
    pub limit: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MostVisitedEntryDto {
    pub name: String,
    pub coords: Point3D,
    pub total_count: u64,
    pub distance_ly: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MostVisitedResponse {
    pub entries: Vec<MostVisitedEntryDto>,
    pub total_count: u64,
    pub error: Option<String>,
}

/// `GetMostVisitedSystems` (§4.G).
#[utoipa::path(post, path = "/api/v1/most-visited-systems", request_body = MostVisitedRequest, responses((status = 200, body = MostVisitedResponse)))]
pub async fn get_most_visited_systems(
    State(service): State<Arc<QueryService>>,
    Json(req): Json<MostVisitedRequest>,
) -> Json<MostVisitedResponse> {
    let reply = service
        .get_most_visited_systems(&req.origin, req.max_distance_ly, req.limit, now_unix())
        .await;
    Json(MostVisitedResponse {
        entries: reply
            .entries
            .into_iter()
            .map(|e| MostVisitedEntryDto {
                name: e.name,
                coords: e.coords,
                total_count: e.total_count,
                distance_ly: e.distance_ly,
            })
            .collect(),
        total_count: reply.total_count,
        error: reply.error,
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GalaxyActivityRequest {
    #[serde(default)]
    pub origin: Option<String>,
    pub max_distance_ly: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityBucketDto {
    pub time_mark: i64,
    pub jump_count: u32,
    pub dock_count: u32,
}

impl From<ActivityBucket> for ActivityBucketDto {
    fn from(b: ActivityBucket) -> Self {
        Self { time_mark: b.time_mark, jump_count: b.jump_count, dock_count: b.dock_count }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GalaxyActivityResponse {
    pub buckets: Vec<ActivityBucketDto>,
    pub error: Option<String>,
}

/// `GetGalaxyActivityStat` (§4.G).
#[utoipa::path(post, path = "/api/v1/galaxy-activity", request_body = GalaxyActivityRequest, responses((status = 200, body = GalaxyActivityResponse)))]
pub async fn get_galaxy_activity_stat(
    State(service): State<Arc<QueryService>>,
    Json(req): Json<GalaxyActivityRequest>,
) -> Json<GalaxyActivityResponse> {
    let reply = service
        .get_galaxy_activity_stat(req.origin.as_deref(), req.max_distance_ly, now_unix())
        .await;
    Json(GalaxyActivityResponse {
        buckets: reply.buckets.into_iter().map(ActivityBucketDto::from).collect(),
        error: reply.error,
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InterestingSystemsRequest {
    pub origin: String,
    pub states: Vec<String>,
    pub min_population: u64,
    pub max_distance_ly: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemSummaryDto {
    pub name: String,
    pub coords: Point3D,
    pub population: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InterestingSystemsResponse {
    pub systems: Vec<SystemSummaryDto>,
    pub error: Option<String>,
}

/// `GetInterestingSystems4State` (§4.G).
#[utoipa::path(post, path = "/api/v1/interesting-systems", request_body = InterestingSystemsRequest, responses((status = 200, body = InterestingSystemsResponse)))]
pub async fn get_interesting_systems_for_state(
    State(service): State<Arc<QueryService>>,
    Json(req): Json<InterestingSystemsRequest>,
) -> Json<InterestingSystemsResponse> {
    let reply = service
        .get_interesting_systems_for_state(
            &req.origin,
            &req.states,
            req.min_population,
            req.max_distance_ly,
            now_unix(),
        )
        .await;
    Json(InterestingSystemsResponse {
        systems: reply
            .systems
            .into_iter()
            .map(|s| SystemSummaryDto { name: s.name, coords: s.coords, population: s.population })
            .collect(),
        error: reply.error,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[utoipa::path(get, path = "/api/v1/health", responses((status = 200, body = HealthResponse)))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
