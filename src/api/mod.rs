use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::core::{
    AggregatedMetrics, ClientProfile, DateRange, EngineError, FeeRatePolicy, FleetSummary,
    GlobalMetricsPoint, HistoricalReturns, MetricsPoint, MonthlyDataPoint, SeededRandom,
    aggregate, filter_metrics, filter_series, metrics_series, sample_tracks, simulate,
    simulate_all, summarize, summarize_fleet,
};

const LOG_FORMAT_ENV: &str = "GROWTHSIM_LOG_FORMAT";

/// Fallbacks applied when a request or command line leaves an option unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineDefaults {
    pub seed: u64,
    pub fee_policy: FeeRatePolicy,
    pub range: DateRange,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            seed: 42,
            fee_policy: FeeRatePolicy::Periodic,
            range: DateRange::All,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "growthsim",
    about = "Monthly portfolio growth simulator with per-client and fleet-wide metrics"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Simulate one client profile and print its series and metrics as JSON.
    Simulate(SimulateArgs),
    /// Simulate a list of profiles and print fleet-wide metrics as JSON.
    Fleet(FleetArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
    #[arg(long, help = "JSON file mapping track ids to monthly returns")]
    pub tracks: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    #[arg(long, help = "Evaluation date (YYYY-MM-DD), defaults to today")]
    pub as_of: Option<NaiveDate>,
    #[arg(
        long,
        help = "Management fee rate: periodic (0.5%), annualized (2%) or a fraction such as 0.01 [default: periodic]"
    )]
    pub fee_policy: Option<FeeRatePolicy>,
    #[arg(long, help = "One of 1m, 3m, 6m, 1y, 2y, 5y, all [default: all]")]
    pub range: Option<DateRange>,
    #[arg(long, help = "Seed for demo expense draws [default: 42]")]
    pub seed: Option<u64>,
    #[arg(long, help = "JSON file mapping track ids to monthly returns")]
    pub tracks: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(long, help = "JSON file holding one client profile")]
    pub profile: PathBuf,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct FleetArgs {
    #[arg(long, help = "JSON file holding an array of client profiles")]
    pub profiles: PathBuf,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EngineOptions {
    as_of: Option<NaiveDate>,
    fee_policy: Option<FeeRatePolicy>,
    range: Option<DateRange>,
    seed: Option<u64>,
    tracks: Option<HistoricalReturns>,
}

impl From<EngineArgs> for EngineOptions {
    fn from(args: EngineArgs) -> Self {
        Self {
            as_of: args.as_of,
            fee_policy: args.fee_policy,
            range: args.range,
            seed: args.seed,
            tracks: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatePayload {
    profile: ClientProfile,
    #[serde(default)]
    options: EngineOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FleetPayload {
    #[serde(default)]
    profiles: Vec<ClientProfile>,
    #[serde(default)]
    options: EngineOptions,
}

#[derive(Debug)]
struct EngineContext {
    as_of: NaiveDate,
    fee_policy: FeeRatePolicy,
    range: DateRange,
    random: SeededRandom,
    tracks: HistoricalReturns,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    client_id: String,
    as_of: NaiveDate,
    range: DateRange,
    fee_policy: FeeRatePolicy,
    fee_rate: f64,
    metrics: AggregatedMetrics,
    series: Vec<MonthlyDataPoint>,
    performance: Vec<MetricsPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientMetrics {
    client_id: String,
    metrics: AggregatedMetrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FleetResponse {
    as_of: NaiveDate,
    range: DateRange,
    fee_policy: FeeRatePolicy,
    fee_rate: f64,
    client_count: usize,
    summary: FleetSummary,
    clients: Vec<ClientMetrics>,
    points: Vec<GlobalMetricsPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackInfo {
    id: String,
    months: usize,
}

#[derive(Debug, Serialize)]
struct TracksResponse {
    tracks: Vec<TrackInfo>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

struct ServerState {
    defaults: EngineDefaults,
    tracks: HistoricalReturns,
}

/// Installs the global tracing subscriber; `log` records from the engine are
/// forwarded through it. Output goes to stderr so CLI JSON stays clean.
pub fn init_tracing() {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Runs a one-shot command and returns its pretty-printed JSON output.
pub fn run_command(command: Command) -> Result<String, String> {
    let defaults = EngineDefaults::default();
    let json = match command {
        Command::Serve(_) => return Err("serve is handled by run_http_server".to_string()),
        Command::Simulate(args) => {
            let tracks = load_tracks(args.engine.tracks.as_deref())?;
            let profile: ClientProfile = read_json(&args.profile)?;
            let ctx = resolve_context(args.engine.into(), &defaults, &tracks, today())
                .map_err(|e| e.to_string())?;
            let response = build_simulate_response(&profile, &ctx).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&response)
        }
        Command::Fleet(args) => {
            let tracks = load_tracks(args.engine.tracks.as_deref())?;
            let profiles: Vec<ClientProfile> = read_json(&args.profiles)?;
            let ctx = resolve_context(args.engine.into(), &defaults, &tracks, today())
                .map_err(|e| e.to_string())?;
            let response = build_fleet_response(&profiles, &ctx).map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&response)
        }
    };
    json.map_err(|e| format!("Failed to serialize output: {e}"))
}

pub async fn run_http_server(args: ServeArgs) -> std::io::Result<()> {
    let tracks = load_tracks(args.tracks.as_deref())
        .map_err(|msg| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))?;
    let state = Arc::new(ServerState {
        defaults: EngineDefaults::default(),
        tracks,
    });

    let addr = SocketAddr::new(args.bind, args.port);
    let app = Router::new()
        .route("/api/tracks", get(tracks_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/fleet", post(fleet_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("growthsim HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn tracks_handler(State(state): State<Arc<ServerState>>) -> Response {
    let tracks = state
        .tracks
        .track_ids()
        .map(|id| TrackInfo {
            id: id.to_string(),
            months: state.tracks.series_len(id).unwrap_or(0),
        })
        .collect();
    json_response(StatusCode::OK, TracksResponse { tracks })
}

async fn simulate_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SimulatePayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(rejection.status(), &rejection.body_text()),
    };

    let result = resolve_context(payload.options, &state.defaults, &state.tracks, today())
        .and_then(|ctx| build_simulate_response(&payload.profile, &ctx));
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => engine_error_response(&err),
    }
}

async fn fleet_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<FleetPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(rejection.status(), &rejection.body_text()),
    };

    let result = resolve_context(payload.options, &state.defaults, &state.tracks, today())
        .and_then(|ctx| build_fleet_response(&payload.profiles, &ctx));
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => engine_error_response(&err),
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn engine_error_response(err: &EngineError) -> Response {
    tracing::warn!("rejected request: {err}");
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn resolve_context(
    options: EngineOptions,
    defaults: &EngineDefaults,
    tracks: &HistoricalReturns,
    today: NaiveDate,
) -> Result<EngineContext, EngineError> {
    let fee_policy = match options.fee_policy.unwrap_or(defaults.fee_policy) {
        FeeRatePolicy::Custom(rate) => FeeRatePolicy::custom(rate)?,
        policy => policy,
    };

    Ok(EngineContext {
        as_of: options.as_of.unwrap_or(today),
        fee_policy,
        range: options.range.unwrap_or(defaults.range),
        random: SeededRandom::new(options.seed.unwrap_or(defaults.seed)),
        tracks: options.tracks.unwrap_or_else(|| tracks.clone()),
    })
}

fn build_simulate_response(
    profile: &ClientProfile,
    ctx: &EngineContext,
) -> Result<SimulateResponse, EngineError> {
    let result = simulate(profile, &ctx.tracks, Some(&ctx.random), ctx.as_of)?;
    let metrics = summarize(&result, ctx.fee_policy, ctx.as_of);
    let performance = metrics_series(&result, ctx.fee_policy);
    let performance = filter_metrics(&performance, ctx.range, ctx.as_of).to_vec();
    let series = filter_series(&result.series, ctx.range, ctx.as_of).to_vec();

    Ok(SimulateResponse {
        client_id: result.client_id,
        as_of: ctx.as_of,
        range: ctx.range,
        fee_policy: ctx.fee_policy,
        fee_rate: ctx.fee_policy.rate(),
        metrics,
        series,
        performance,
    })
}

fn build_fleet_response(
    profiles: &[ClientProfile],
    ctx: &EngineContext,
) -> Result<FleetResponse, EngineError> {
    let results = simulate_all(profiles, &ctx.tracks, Some(&ctx.random), ctx.as_of)?;
    let points = aggregate(&results, ctx.range, ctx.as_of, ctx.fee_policy);
    let summary = summarize_fleet(&points, ctx.as_of);
    let clients = results
        .iter()
        .map(|result| ClientMetrics {
            client_id: result.client_id.clone(),
            metrics: summarize(result, ctx.fee_policy, ctx.as_of),
        })
        .collect();

    Ok(FleetResponse {
        as_of: ctx.as_of,
        range: ctx.range,
        fee_policy: ctx.fee_policy,
        fee_rate: ctx.fee_policy.rate(),
        client_count: results.len(),
        summary,
        clients,
        points,
    })
}

fn load_tracks(path: Option<&Path>) -> Result<HistoricalReturns, String> {
    match path {
        Some(path) => read_json(path),
        None => Ok(sample_tracks()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in {}: {e}", path.display()))
}
