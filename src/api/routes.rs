//! API Routes
//!
//! Configures the Axum router. Each group of endpoints sits behind the rate
//! limit of its tier; `/health` is not limited.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_stats, create_bus, create_route, create_schedule, delete_bus, delete_route, get_bus,
    get_bus_location, get_route, health_handler, list_buses, list_routes, record_location,
    route_schedules, search_buses, search_routes, update_bus, AppState,
};
use crate::ratelimit::{enforce_rate_limit, RateGuard, Tier};

/// Wraps every route of `router` in the limiter for `tier`. Applied with
/// `route_layer`, so unmatched paths are not counted.
fn limited(router: Router<AppState>, state: &AppState, tier: Tier) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        RateGuard::new(state.limiter.clone(), tier),
        enforce_rate_limit,
    ))
}

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - PUBLIC: bus and route reads
/// - SEARCH: `/search/buses`, `/search/routes`
/// - OPERATOR: bus, location, route and schedule writes
/// - ADMIN: deletes and `/admin/cache/stats`
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/buses", get(list_buses))
        .route("/buses/:id", get(get_bus))
        .route("/buses/:id/location", get(get_bus_location))
        .route("/routes", get(list_routes))
        .route("/routes/:id", get(get_route))
        .route("/routes/:id/schedules", get(route_schedules));

    let search = Router::new()
        .route("/search/buses", get(search_buses))
        .route("/search/routes", get(search_routes));

    let operator = Router::new()
        .route("/buses", post(create_bus))
        .route("/buses/:id", put(update_bus))
        .route("/buses/:id/location", post(record_location))
        .route("/routes", post(create_route))
        .route("/schedules", post(create_schedule));

    let admin = Router::new()
        .route("/buses/:id", delete(delete_bus))
        .route("/routes/:id", delete(delete_route))
        .route("/admin/cache/stats", get(cache_stats));

    Router::new()
        .route("/health", get(health_handler))
        .merge(limited(public, &state, Tier::Public))
        .merge(limited(search, &state, Tier::Search))
        .merge(limited(operator, &state, Tier::Operator))
        .merge(limited(admin, &state, Tier::Admin))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
