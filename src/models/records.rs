//! Stored records for the bus tracking API
//!
//! These are the documents kept in the store and cached as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusStatus {
    Active,
    Maintenance,
    Retired,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::Active => "ACTIVE",
            BusStatus::Maintenance => "MAINTENANCE",
            BusStatus::Retired => "RETIRED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub bus_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    pub plate_number: String,
    pub capacity: u32,
    pub status: BusStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub route_id: String,
    pub name: String,
    pub stops: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule_id: String,
    pub route_id: String,
    pub bus_id: String,
    /// Local departure time, `HH:MM`
    pub departure_time: String,
    pub days: Vec<String>,
}

/// Last reported position of a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub bus_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

// == Cache Keys ==
pub fn bus_record_key(bus_id: &str) -> String {
    format!("bus:{}:record", bus_id)
}

pub fn bus_location_key(bus_id: &str) -> String {
    format!("bus:{}:location", bus_id)
}

pub const ROUTES_ALL_KEY: &str = "routes:all";
