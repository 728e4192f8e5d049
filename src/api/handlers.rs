//! API Handlers
//!
//! HTTP request handlers for the bus tracking endpoints. Reads of hot
//! records go through the cache façade first and fall back to the store;
//! writes go to the store and then invalidate or refresh the cached copy.

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::auth::{Authorizer, Principal, Role, StaticTokenAuthorizer};
use crate::cache::CacheFacade;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::{
    bus_location_key, bus_record_key, Bus, BusSearchQuery, BusStatus, CreateBusRequest,
    CreateRouteRequest, CreateScheduleRequest, DeleteResponse, HealthResponse, Location,
    LocationUpdate, Route, RouteSearchQuery, Schedule, StatsResponse, UpdateBusRequest,
    ROUTES_ALL_KEY,
};
use crate::ratelimit::RateLimiter;
use crate::store::{DocumentStore, StoreError, BUSES, LOCATIONS, ROUTES, SCHEDULES};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<CacheFacade>,
    pub limiter: Arc<RateLimiter>,
    pub authorizer: Arc<dyn Authorizer>,
    /// TTL in seconds for cached bus and route records
    pub record_ttl: u64,
    /// TTL in seconds for cached bus locations
    pub location_ttl: u64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheFacade>,
        limiter: Arc<RateLimiter>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            store,
            cache,
            limiter,
            authorizer,
            record_ttl: defaults.record_ttl,
            location_ttl: defaults.location_ttl,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the token authorizer and cache TTLs from the Config.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheFacade>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let authorizer = StaticTokenAuthorizer::from_tokens(&config.api_tokens);
        if authorizer.is_empty() {
            info!("No API tokens configured, write endpoints will reject every request");
        }

        Self {
            record_ttl: config.record_ttl,
            location_ttl: config.location_ttl,
            ..Self::new(store, cache, limiter, Arc::new(authorizer))
        }
    }
}

impl FromRef<AppState> for Arc<dyn Authorizer> {
    fn from_ref(state: &AppState) -> Self {
        state.authorizer.clone()
    }
}

// == Helpers ==
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Internal(format!("corrupt record: {}", e)))
}

fn decode_all<T: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>> {
    values.into_iter().map(decode).collect()
}

fn encode<T: serde::Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| ApiError::Internal(e.to_string()))
}

async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    table: &str,
    id: &str,
    kind: &str,
) -> Result<T> {
    match store.get(table, id).await? {
        Some(value) => decode(value),
        None => Err(ApiError::not_found(format!("{} '{}'", kind, id))),
    }
}

async fn ensure_exists(store: &dyn DocumentStore, table: &str, id: &str, kind: &str) -> Result<()> {
    match store.get(table, id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::InvalidRequest(format!("Unknown {} '{}'", kind, id))),
    }
}

/// Cache-first lookup. A façade miss and a façade outage look the same
/// here; either way the store answers and the cache is repopulated.
async fn read_through<T>(
    state: &AppState,
    cache_key: &str,
    ttl: u64,
    table: &str,
    id: &str,
    kind: &str,
) -> Result<T>
where
    T: DeserializeOwned + serde::Serialize,
{
    if let Some(hit) = state.cache.get_json::<T>(cache_key).await {
        debug!(key = %cache_key, "Served from cache");
        return Ok(hit);
    }

    let record: T = load(state.store.as_ref(), table, id, kind).await?;
    state.cache.set_json(cache_key, &record, Some(ttl)).await;
    Ok(record)
}

// == Health ==
/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.state().as_str()))
}

// == Buses ==
/// Handler for GET /buses
pub async fn list_buses(State(state): State<AppState>) -> Result<Json<Vec<Bus>>> {
    let buses = decode_all(state.store.scan(BUSES).await?)?;
    Ok(Json(buses))
}

/// Handler for GET /buses/:id
pub async fn get_bus(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Bus>> {
    let bus = read_through(&state, &bus_record_key(&id), state.record_ttl, BUSES, &id, "Bus").await?;
    Ok(Json(bus))
}

/// Handler for GET /buses/:id/location
pub async fn get_bus_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Location>> {
    let location = read_through(
        &state,
        &bus_location_key(&id),
        state.location_ttl,
        LOCATIONS,
        &id,
        "Location for bus",
    )
    .await?;
    Ok(Json(location))
}

/// Handler for POST /buses
pub async fn create_bus(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateBusRequest>,
) -> Result<(StatusCode, Json<Bus>)> {
    principal.require(Role::Operator)?;
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    if let Some(route_id) = &req.route_id {
        ensure_exists(state.store.as_ref(), ROUTES, route_id, "route").await?;
    }

    let bus = Bus {
        bus_id: req.bus_id,
        route_id: req.route_id,
        plate_number: req.plate_number,
        capacity: req.capacity,
        status: req.status.unwrap_or(BusStatus::Active),
        updated_at: Utc::now(),
    };
    state.store.create(BUSES, &bus.bus_id, encode(&bus)?).await?;
    state.cache.delete(&bus_record_key(&bus.bus_id)).await;

    info!(bus_id = %bus.bus_id, subject = %principal.subject, "Bus registered");
    Ok((StatusCode::CREATED, Json(bus)))
}

/// Handler for PUT /buses/:id
pub async fn update_bus(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateBusRequest>,
) -> Result<Json<Bus>> {
    principal.require(Role::Operator)?;
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    if let Some(route_id) = &req.route_id {
        ensure_exists(state.store.as_ref(), ROUTES, route_id, "route").await?;
    }

    let mut patch = Map::new();
    if let Some(route_id) = req.route_id {
        patch.insert("routeId".to_string(), json!(route_id));
    }
    if let Some(plate) = req.plate_number {
        patch.insert("plateNumber".to_string(), json!(plate));
    }
    if let Some(capacity) = req.capacity {
        patch.insert("capacity".to_string(), json!(capacity));
    }
    if let Some(status) = req.status {
        patch.insert("status".to_string(), json!(status.as_str()));
    }
    patch.insert("updatedAt".to_string(), json!(Utc::now()));

    let updated = state
        .store
        .update(BUSES, &id, Value::Object(patch))
        .await
        .map_err(|e| match e {
            StoreError::NotFound { .. } => ApiError::not_found(format!("Bus '{}'", id)),
            other => other.into(),
        })?;
    state.cache.delete(&bus_record_key(&id)).await;

    Ok(Json(decode(updated)?))
}

/// Handler for POST /buses/:id/location
///
/// Refreshes the cached location instead of dropping it, since the next
/// read would fetch exactly this value.
pub async fn record_location(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<LocationUpdate>,
) -> Result<(StatusCode, Json<Location>)> {
    principal.require(Role::Operator)?;
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    if state.store.get(BUSES, &id).await?.is_none() {
        return Err(ApiError::not_found(format!("Bus '{}'", id)));
    }

    let location = Location {
        bus_id: id,
        latitude: req.latitude,
        longitude: req.longitude,
        speed_kmh: req.speed_kmh,
        recorded_at: Utc::now(),
    };
    state
        .store
        .put(LOCATIONS, &location.bus_id, encode(&location)?)
        .await?;
    state
        .cache
        .set_json(
            &bus_location_key(&location.bus_id),
            &location,
            Some(state.location_ttl),
        )
        .await;

    Ok((StatusCode::CREATED, Json(location)))
}

/// Handler for DELETE /buses/:id
pub async fn delete_bus(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    principal.require(Role::Admin)?;

    state.store.delete(BUSES, &id).await.map_err(|e| match e {
        StoreError::NotFound { .. } => ApiError::not_found(format!("Bus '{}'", id)),
        other => other.into(),
    })?;
    match state.store.delete(LOCATIONS, &id).await {
        Ok(()) | Err(StoreError::NotFound { .. }) => {}
        Err(other) => return Err(other.into()),
    }

    state.cache.delete(&bus_record_key(&id)).await;
    state.cache.delete(&bus_location_key(&id)).await;

    info!(bus_id = %id, subject = %principal.subject, "Bus deleted");
    Ok(Json(DeleteResponse::new("Bus", id)))
}

// == Routes ==
/// Handler for GET /routes
pub async fn list_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>> {
    if let Some(routes) = state.cache.get_json::<Vec<Route>>(ROUTES_ALL_KEY).await {
        return Ok(Json(routes));
    }

    let routes: Vec<Route> = decode_all(state.store.scan(ROUTES).await?)?;
    state
        .cache
        .set_json(ROUTES_ALL_KEY, &routes, Some(state.record_ttl))
        .await;
    Ok(Json(routes))
}

/// Handler for GET /routes/:id
pub async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Route>> {
    let route = load(state.store.as_ref(), ROUTES, &id, "Route").await?;
    Ok(Json(route))
}

/// Handler for GET /routes/:id/schedules
pub async fn route_schedules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Schedule>>> {
    if state.store.get(ROUTES, &id).await?.is_none() {
        return Err(ApiError::not_found(format!("Route '{}'", id)));
    }

    let mut schedules: Vec<Schedule> =
        decode_all(state.store.query(SCHEDULES, "routeId", &json!(id)).await?)?;
    schedules.sort_by(|a, b| a.departure_time.cmp(&b.departure_time));
    Ok(Json(schedules))
}

/// Handler for POST /routes
pub async fn create_route(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<Route>)> {
    principal.require(Role::Operator)?;
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let route = Route {
        route_id: req.route_id,
        name: req.name,
        stops: req.stops,
        active: req.active,
    };
    state
        .store
        .create(ROUTES, &route.route_id, encode(&route)?)
        .await?;
    state.cache.delete(ROUTES_ALL_KEY).await;

    Ok((StatusCode::CREATED, Json(route)))
}

/// Handler for DELETE /routes/:id
pub async fn delete_route(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    principal.require(Role::Admin)?;

    state.store.delete(ROUTES, &id).await.map_err(|e| match e {
        StoreError::NotFound { .. } => ApiError::not_found(format!("Route '{}'", id)),
        other => other.into(),
    })?;
    state.cache.delete(ROUTES_ALL_KEY).await;

    Ok(Json(DeleteResponse::new("Route", id)))
}

// == Schedules ==
/// Handler for POST /schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Schedule>)> {
    principal.require(Role::Operator)?;
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }
    ensure_exists(state.store.as_ref(), ROUTES, &req.route_id, "route").await?;
    ensure_exists(state.store.as_ref(), BUSES, &req.bus_id, "bus").await?;

    let schedule = Schedule {
        schedule_id: req.schedule_id,
        route_id: req.route_id,
        bus_id: req.bus_id,
        departure_time: req.departure_time,
        days: req.days,
    };
    state
        .store
        .create(SCHEDULES, &schedule.schedule_id, encode(&schedule)?)
        .await?;

    Ok((StatusCode::CREATED, Json(schedule)))
}

// == Search ==
/// Handler for GET /search/buses
pub async fn search_buses(
    State(state): State<AppState>,
    Query(query): Query<BusSearchQuery>,
) -> Result<Json<Vec<Bus>>> {
    let candidates = match &query.route_id {
        Some(route_id) => state.store.query(BUSES, "routeId", &json!(route_id)).await?,
        None => state.store.scan(BUSES).await?,
    };

    let buses: Vec<Bus> = decode_all(candidates)?;
    Ok(Json(
        buses
            .into_iter()
            .filter(|bus| query.status.map_or(true, |status| bus.status == status))
            .collect(),
    ))
}

/// Handler for GET /search/routes
pub async fn search_routes(
    State(state): State<AppState>,
    Query(query): Query<RouteSearchQuery>,
) -> Result<Json<Vec<Route>>> {
    if query.stop.trim().is_empty() {
        return Err(ApiError::InvalidRequest("stop cannot be empty".to_string()));
    }
    let routes = decode_all(state.store.query(ROUTES, "stops", &json!(query.stop)).await?)?;
    Ok(Json(routes))
}

// == Admin ==
/// Handler for GET /admin/cache/stats
pub async fn cache_stats(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<StatsResponse>> {
    principal.require(Role::Admin)?;

    Ok(Json(StatsResponse {
        state: state.cache.state().to_string(),
        limiter_store: state.limiter.store_kind().to_string(),
        cache: state.cache.stats(),
    }))
}
