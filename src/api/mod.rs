//! API Module
//!
//! HTTP handlers and routing for the bus tracking REST API.
//!
//! # Endpoints
//! - `GET /health` - Health check, includes cache connection state
//! - `GET /buses`, `GET /buses/:id`, `GET /buses/:id/location`
//! - `GET /routes`, `GET /routes/:id`, `GET /routes/:id/schedules`
//! - `GET /search/buses`, `GET /search/routes`
//! - `POST /buses`, `PUT /buses/:id`, `POST /buses/:id/location`
//! - `POST /routes`, `POST /schedules`
//! - `DELETE /buses/:id`, `DELETE /routes/:id`, `GET /admin/cache/stats`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
