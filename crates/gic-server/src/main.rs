//! gic-server — the Supervisor (§4.J): wires the reference snapshot builder,
//! catalog freshness manager, live visit collector, remote lookup, and the
//! RPC surface together, then runs until a signal asks it to stop.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use clap::Parser;
use tokio::sync::Notify;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gic_core::collector;
use gic_core::config::{CacheFileConfig, Config, EddbCacheConfig, RpcServerConfig, StarStatConfig};
use gic_core::query::QueryService;
use gic_core::reference::builder::{self, CatalogPaths};
use gic_core::reference::freshness::{self, ReqwestFetch};
use gic_core::reference::{EddbInfo, SnapshotSlot};
use gic_core::remote::{ReqwestRemoteFetch, RemoteLookup};

/// The Galaxy Information Center query server.
#[derive(Parser)]
#[command(name = "gic-server", about = "Galaxy Information Center query server", version)]
struct Args {
    /// Port the RPC/query HTTP surface listens on (`GrpcSrv.Port`).
    #[arg(long, default_value = "50051", env = "GIC_GRPC_SRV_PORT")]
    port: u16,

    /// Whether the RPC/query HTTP surface runs at all (`GrpcSrv.Enabled`).
    #[arg(long, default_value_t = true, env = "GIC_GRPC_SRV_ENABLED")]
    rpc_enabled: bool,

    /// Seconds between catalog freshness checks.
    #[arg(long, default_value = "3600", env = "GIC_CHECK_PERIOD_SECS")]
    check_period_secs: u64,

    #[arg(long, default_value = "https://example.invalid/systems.jsonl", env = "GIC_SYSTEMS_URL")]
    systems_url: String,
    #[arg(long, default_value = "./cache/systems.jsonl", env = "GIC_SYSTEMS_FILE")]
    systems_file: String,
    #[arg(long, default_value = "https://example.invalid/stations.jsonl", env = "GIC_STATIONS_URL")]
    stations_url: String,
    #[arg(long, default_value = "./cache/stations.jsonl", env = "GIC_STATIONS_FILE")]
    stations_file: String,
    #[arg(long, default_value = "https://example.invalid/factions.jsonl", env = "GIC_FACTIONS_URL")]
    factions_url: String,
    #[arg(long, default_value = "./cache/factions.jsonl", env = "GIC_FACTIONS_FILE")]
    factions_file: String,
    #[arg(long, default_value = "https://example.invalid/commodities.json", env = "GIC_COMMODITIES_URL")]
    commodities_url: String,
    #[arg(long, default_value = "./cache/commodities.json", env = "GIC_COMMODITIES_FILE")]
    commodities_file: String,
    #[arg(long, default_value = "https://example.invalid/listings.csv", env = "GIC_LISTINGS_URL")]
    listings_url: String,
    #[arg(long, default_value = "./cache/listings.csv", env = "GIC_LISTINGS_FILE")]
    listings_file: String,

    /// Event relay websocket URL. If unset, the live visit collector runs with no listener.
    #[arg(long, env = "GIC_RELAY_URL")]
    relay_url: Option<String>,

    /// Remote system-info API base URL. If unset, remote lookup is disabled.
    #[arg(long, env = "GIC_REMOTE_LOOKUP_URL")]
    remote_lookup_url: Option<String>,

    /// Remote lookup concurrency cap, clamped to [1, 10].
    #[arg(long, default_value = "10", env = "GIC_REMOTE_MAX_CONCURRENT")]
    remote_max_concurrent: usize,

    /// Collector checkpoint file path. If unset, no periodic checkpoint runs.
    #[arg(long, env = "GIC_BACKUP_FILE")]
    backup_file: Option<String>,

    /// Seconds between collector checkpoints (only used when --backup-file is set).
    #[arg(long, default_value = "60", env = "GIC_BACKUP_PERIOD_SECS")]
    backup_period_secs: u64,

    /// Restore the collector from --backup-file on startup, if it exists.
    #[arg(long, default_value_t = false)]
    restore_on_start: bool,
}

impl Args {
    fn eddb_cache_config(&self) -> EddbCacheConfig {
        EddbCacheConfig {
            systems: CacheFileConfig { url: self.systems_url.clone(), local_file: self.systems_file.clone() },
            stations: CacheFileConfig { url: self.stations_url.clone(), local_file: self.stations_file.clone() },
            factions: CacheFileConfig { url: self.factions_url.clone(), local_file: self.factions_file.clone() },
            commodities: CacheFileConfig {
                url: self.commodities_url.clone(),
                local_file: self.commodities_file.clone(),
            },
            listings: CacheFileConfig { url: self.listings_url.clone(), local_file: self.listings_file.clone() },
        }
    }

    fn catalog_paths(&self) -> CatalogPaths {
        CatalogPaths {
            systems: self.systems_file.clone(),
            stations: self.stations_file.clone(),
            factions: self.factions_file.clone(),
            commodities: self.commodities_file.clone(),
            listings: self.listings_file.clone(),
        }
    }

    fn config(&self) -> Config {
        Config {
            eddb_cache: self.eddb_cache_config(),
            check_period_secs: self.check_period_secs,
            grpc_srv: RpcServerConfig { port: self.port, enabled: self.rpc_enabled },
            star_stat: StarStatConfig {
                backup_file: self.backup_file.clone(),
                backup_period_secs: self.backup_period_secs,
            },
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gic_server=info,gic_core=info".parse().unwrap()),
        )
        .with_target(false)
        .init();
}

fn build_initial_snapshot(paths: &CatalogPaths) -> EddbInfo {
    match builder::build(paths) {
        Ok((info, report)) => {
            info!(
                systems = report.systems_parsed,
                stations = report.stations_parsed,
                factions = report.factions_parsed,
                listings = report.listings_parsed,
                "built initial reference snapshot"
            );
            info
        }
        Err(e) => {
            warn!("no initial reference snapshot available ({e}); starting with an empty catalog");
            EddbInfo::default()
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main(args));
}

async fn async_main(args: Args) {
    let config = args.config();
    let catalog_paths = args.catalog_paths();

    info!(version = env!("CARGO_PKG_VERSION"), git_sha = gic_core::GIT_SHA, "gic-server starting");

    let snapshot = Arc::new(SnapshotSlot::new(build_initial_snapshot(&catalog_paths)));

    let (collector_handle, collector_task) = collector::spawn();

    if args.restore_on_start {
        if let Some(backup_file) = &config.star_stat.backup_file {
            if collector_handle.restore(backup_file.clone()).await {
                info!("restored collector state from {backup_file}");
            } else {
                warn!("no collector state restored from {backup_file}");
            }
        }
    }

    // The listener task runs detached; `status` is the only handle we need,
    // both to trigger its shutdown and to let `run_listener` notice it.
    let listener_status = args.relay_url.as_ref().map(|url| {
        let transport = gic_core::collector::transport::WebSocketTransport::new(url.clone());
        let (status, _task) = collector::spawn_listener(transport, collector_handle.clone());
        status
    });

    let remote_lookup = args.remote_lookup_url.as_ref().map(|url| {
        Arc::new(RemoteLookup::new(
            Box::new(ReqwestRemoteFetch::new(url.clone())),
            args.remote_max_concurrent,
        ))
    });

    let query_service = Arc::new(QueryService::new(
        snapshot.clone(),
        Some(collector_handle.clone()),
        remote_lookup,
    ));

    spawn_freshness_task(snapshot.clone(), config.eddb_cache.clone(), catalog_paths.clone(), config.check_period_secs);

    if let Some(backup_file) = config.star_stat.backup_file.clone() {
        spawn_checkpoint_task(collector_handle.clone(), backup_file, config.star_stat.backup_period_secs);
    }

    let shutdown = Arc::new(Notify::new());
    let shutdown_for_handler = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_for_handler.notify_waiters();
    }) {
        warn!("failed to install signal handler: {e}");
    }

    let server_task = if config.grpc_srv.enabled {
        let app = build_router(query_service);
        let addr = SocketAddr::from(([0, 0, 0, 0], config.grpc_srv.port));
        let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind listen address");
        info!(%addr, "listening");

        let server_shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.notified().await })
                .await
        }))
    } else {
        info!("GrpcSrv.Enabled is false; RPC surface disabled");
        None
    };

    shutdown.notified().await;
    info!("shutting down");

    if let Some(status) = &listener_status {
        status.request_close();
    }

    if let Some(backup_file) = &config.star_stat.backup_file {
        if collector_handle.backup(backup_file.clone()).await {
            info!("wrote shutdown checkpoint to {backup_file}");
        } else {
            warn!("shutdown checkpoint to {backup_file} failed");
        }
    }

    collector_handle.exit().await;
    if let Err(e) = collector_task.await {
        error!("collector task panicked: {e}");
    }

    if let Some(task) = server_task {
        if let Err(e) = task.await {
            error!("server task panicked: {e}");
        }
    }

    info!("shutdown complete");
}

fn spawn_freshness_task(
    snapshot: Arc<SnapshotSlot>,
    cache_config: EddbCacheConfig,
    catalog_paths: CatalogPaths,
    period_secs: u64,
) {
    tokio::spawn(async move {
        let fetch = ReqwestFetch::new();
        let mut interval = tokio::time::interval(Duration::from_secs(period_secs.max(1)));
        interval.tick().await; // first tick fires immediately; skip to avoid an instant re-check
        loop {
            interval.tick().await;
            let results = freshness::check_all(&fetch, &cache_config).await;
            for r in &results {
                if let Some(e) = &r.error {
                    warn!("freshness check failed for {}: {e}", r.local_file);
                }
            }
            if freshness::any_updated(&results) {
                info!("catalog files changed; rebuilding reference snapshot");
                match builder::build(&catalog_paths) {
                    Ok((info, report)) => {
                        info!(
                            systems = report.systems_parsed,
                            stations = report.stations_parsed,
                            factions = report.factions_parsed,
                            listings = report.listings_parsed,
                            "published refreshed reference snapshot"
                        );
                        snapshot.publish(info);
                    }
                    Err(e) => error!("rebuild failed after catalog refresh: {e}"),
                }
            }
        }
    });
}

fn spawn_checkpoint_task(
    handle: gic_core::collector::CollectorHandle,
    backup_file: String,
    period_secs: u64,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(period_secs.max(1)));
        loop {
            interval.tick().await;
            if handle.backup(backup_file.clone()).await {
                info!("wrote periodic checkpoint to {backup_file}");
            } else {
                warn!("periodic checkpoint to {backup_file} failed");
            }
        }
    });
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health,
        routes::get_distance,
        routes::get_system_summary,
        routes::get_dockable_stations,
        routes::get_human_world_stat,
        routes::get_most_visited_systems,
        routes::get_galaxy_activity_stat,
        routes::get_interesting_systems_for_state,
    ),
    components(schemas(
        routes::DistanceRequest,
        routes::DistanceResponse,
        routes::SystemNameRequest,
        routes::SystemSummaryResponse,
        routes::StationSummaryDto,
        routes::DockableStationsResponse,
        routes::HumanWorldStatResponse,
        routes::MostVisitedRequest,
        routes::MostVisitedEntryDto,
        routes::MostVisitedResponse,
        routes::GalaxyActivityRequest,
        routes::ActivityBucketDto,
        routes::GalaxyActivityResponse,
        routes::InterestingSystemsRequest,
        routes::SystemSummaryDto,
        routes::InterestingSystemsResponse,
        routes::HealthResponse,
    )),
    info(title = "Galaxy Information Center API", version = "1.0", description = "Query surface over the galaxy reference catalog and live visit collector")
)]
struct ApiDoc;

fn build_router(query_service: Arc<QueryService>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health))
        .route("/api/v1/distance", post(routes::get_distance))
        .route("/api/v1/system-summary", post(routes::get_system_summary))
        .route("/api/v1/dockable-stations", post(routes::get_dockable_stations))
        .route("/api/v1/human-world-stat", get(routes::get_human_world_stat))
        .route("/api/v1/most-visited-systems", post(routes::get_most_visited_systems))
        .route("/api/v1/galaxy-activity", post(routes::get_galaxy_activity_stat))
        .route("/api/v1/interesting-systems", post(routes::get_interesting_systems_for_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(query_service)
}
