use crate::charts;
use crate::config::AppConfig;
use crate::controller::{Controller, InputId, InputState, OutputUpdate};
use crate::page;
use crate::types::{DashboardData, JoinedBorough};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use geo::algorithm::contains::Contains;
use geo::{BoundingRect, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info};

// Wrapper for RTree indexing
pub struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub fn build_index(boroughs: &[JoinedBorough]) -> RTree<AreaIndex> {
    let items = boroughs
        .iter()
        .enumerate()
        .filter_map(|(i, borough)| {
            let rect = borough.geometry.bounding_rect()?;
            Some(AreaIndex {
                index: i,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            })
        })
        .collect();
    RTree::bulk_load(items)
}

pub struct AppState {
    pub controller: Controller,
    /// The map never changes, so it is serialised once and served as is.
    pub map_json: Bytes,
    pub tree: RTree<AreaIndex>,
}

impl AppState {
    pub fn new(config: &AppConfig, data: Arc<DashboardData>) -> Result<Self> {
        let map_figure = charts::build_map(
            &data.boroughs,
            &config.map,
            config.credentials.mapbox_token.as_deref(),
        );
        let map_json = serde_json::to_vec(&map_figure).context("Failed to serialise map figure")?;
        let tree = build_index(&data.boroughs);
        Ok(Self { controller: Controller::new(data), map_json: Bytes::from(map_json), tree })
    }

    /// Borough whose polygon contains the point, if any.
    pub fn locate(&self, lat: f64, lon: f64) -> Option<&JoinedBorough> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);
        let boroughs = &self.controller.data().boroughs;

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| boroughs.get(candidate.index))
            .find(|borough| borough.geometry.contains(&point))
    }
}

#[derive(Debug, Deserialize)]
pub struct BoroughQuery {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize)]
pub struct BoroughResponse {
    boroname: String,
    count_tree_id: u64,
    population: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SpeciesOption {
    label: String,
    value: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(flatten)]
    state: InputState,
    // Absent on the first render.
    changed: Option<InputId>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    outputs: Vec<OutputUpdate>,
}

pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/map", get(map_handler))
        .route("/api/species", get(species_handler))
        .route("/api/update", post(update_handler))
        .route("/api/borough", get(borough_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, data: DashboardData) -> Result<()> {
    info!("Building map figure and spatial index...");
    let state = Arc::new(AppState::new(&config, Arc::new(data))?);

    let ip = config
        .server
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid server host: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);

    info!("Starting server on http://{}", addr);

    let app = router(state, &config.server.static_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let controller = &state.controller;
    Html(page::render_index(&controller.data().species, &controller.initial_state()))
}

async fn map_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], state.map_json.clone())
}

async fn species_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SpeciesOption>> {
    let options = state
        .controller
        .data()
        .species
        .iter()
        .map(|s| SpeciesOption { label: s.clone(), value: s.clone() })
        .collect();
    Json(options)
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, (StatusCode, String)> {
    debug!("update {:?} species={:?}", request.changed, request.state.species);
    let controller = &state.controller;
    let outputs = match request.changed {
        Some(changed) => controller.dispatch(&request.state, changed),
        None => controller.render_all(&request.state),
    }
    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(UpdateResponse { outputs }))
}

async fn borough_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoroughQuery>,
) -> Json<Option<BoroughResponse>> {
    Json(state.locate(params.lat, params.lon).map(|borough| BoroughResponse {
        boroname: borough.boroname.clone(),
        count_tree_id: borough.count_tree_id,
        population: borough.population,
    }))
}
