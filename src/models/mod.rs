//! Records and DTOs for the bus tracking API
//!
//! This module defines the stored documents and the types used for
//! serializing/deserializing HTTP request and response bodies.

pub mod records;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use records::{
    bus_location_key, bus_record_key, Bus, BusStatus, Location, Route, Schedule, ROUTES_ALL_KEY,
};
pub use requests::{
    BusSearchQuery, CreateBusRequest, CreateRouteRequest, CreateScheduleRequest, LocationUpdate,
    RouteSearchQuery, UpdateBusRequest,
};
pub use responses::{DeleteResponse, HealthResponse, StatsResponse};
