//! Request DTOs for the bus tracking API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use super::records::BusStatus;

const MAX_ID_LEN: usize = 64;

fn validate_id(field: &str, id: &str) -> Option<String> {
    if id.trim().is_empty() {
        return Some(format!("{} cannot be empty", field));
    }
    if id.len() > MAX_ID_LEN {
        return Some(format!(
            "{} exceeds maximum length of {} characters",
            field, MAX_ID_LEN
        ));
    }
    if id.contains(':') {
        return Some(format!("{} cannot contain ':'", field));
    }
    None
}

/// Request body for POST /buses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusRequest {
    pub bus_id: String,
    #[serde(default)]
    pub route_id: Option<String>,
    pub plate_number: String,
    pub capacity: u32,
    #[serde(default)]
    pub status: Option<BusStatus>,
}

impl CreateBusRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(err) = validate_id("busId", &self.bus_id) {
            return Some(err);
        }
        if self.plate_number.trim().is_empty() {
            return Some("plateNumber cannot be empty".to_string());
        }
        if self.capacity == 0 {
            return Some("capacity must be greater than zero".to_string());
        }
        None
    }
}

/// Request body for PUT /buses/:id. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusRequest {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub status: Option<BusStatus>,
}

impl UpdateBusRequest {
    pub fn validate(&self) -> Option<String> {
        if self.route_id.is_none()
            && self.plate_number.is_none()
            && self.capacity.is_none()
            && self.status.is_none()
        {
            return Some("Update must change at least one field".to_string());
        }
        if self.capacity == Some(0) {
            return Some("capacity must be greater than zero".to_string());
        }
        None
    }
}

/// Request body for POST /buses/:id/location
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
}

impl LocationUpdate {
    pub fn validate(&self) -> Option<String> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Some("latitude must be between -90 and 90".to_string());
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Some("longitude must be between -180 and 180".to_string());
        }
        if matches!(self.speed_kmh, Some(speed) if speed < 0.0) {
            return Some("speedKmh cannot be negative".to_string());
        }
        None
    }
}

/// Request body for POST /routes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRouteRequest {
    pub route_id: String,
    pub name: String,
    pub stops: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CreateRouteRequest {
    pub fn validate(&self) -> Option<String> {
        if let Some(err) = validate_id("routeId", &self.route_id) {
            return Some(err);
        }
        if self.name.trim().is_empty() {
            return Some("name cannot be empty".to_string());
        }
        if self.stops.len() < 2 {
            return Some("A route needs at least two stops".to_string());
        }
        None
    }
}

/// Request body for POST /schedules
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub schedule_id: String,
    pub route_id: String,
    pub bus_id: String,
    pub departure_time: String,
    pub days: Vec<String>,
}

impl CreateScheduleRequest {
    pub fn validate(&self) -> Option<String> {
        validate_id("scheduleId", &self.schedule_id)
            .or_else(|| validate_id("routeId", &self.route_id))
            .or_else(|| validate_id("busId", &self.bus_id))
            .or_else(|| {
                chrono::NaiveTime::parse_from_str(&self.departure_time, "%H:%M")
                    .err()
                    .map(|_| "departureTime must be HH:MM".to_string())
            })
            .or_else(|| {
                self.days
                    .is_empty()
                    .then(|| "days cannot be empty".to_string())
            })
    }
}

// == Search Queries ==
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusSearchQuery {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub status: Option<BusStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSearchQuery {
    pub stop: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_bus_deserialize() {
        let json = r#"{"busId": "b1", "plateNumber": "KX-101", "capacity": 40}"#;
        let req: CreateBusRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.bus_id, "b1");
        assert!(req.status.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_create_bus_rejects_bad_ids() {
        let mut req: CreateBusRequest =
            serde_json::from_str(r#"{"busId": "", "plateNumber": "P", "capacity": 1}"#).unwrap();
        assert!(req.validate().is_some());

        req.bus_id = "bus:1".to_string();
        assert!(req.validate().is_some());

        req.bus_id = "x".repeat(65);
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_update_requires_a_field() {
        assert!(UpdateBusRequest::default().validate().is_some());

        let req: UpdateBusRequest = serde_json::from_str(r#"{"status": "RETIRED"}"#).unwrap();
        assert_eq!(req.status, Some(BusStatus::Retired));
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_location_bounds() {
        let ok = LocationUpdate {
            latitude: 48.85,
            longitude: 2.35,
            speed_kmh: Some(30.0),
        };
        assert!(ok.validate().is_none());

        let bad = LocationUpdate {
            latitude: 95.0,
            ..ok.clone()
        };
        assert!(bad.validate().is_some());

        let reversing = LocationUpdate {
            speed_kmh: Some(-1.0),
            ..ok
        };
        assert!(reversing.validate().is_some());
    }

    #[test]
    fn test_route_defaults_active() {
        let req: CreateRouteRequest =
            serde_json::from_str(r#"{"routeId": "r1", "name": "Loop", "stops": ["A", "B"]}"#)
                .unwrap();
        assert!(req.active);
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_schedule_departure_format() {
        let mut req = CreateScheduleRequest {
            schedule_id: "s1".to_string(),
            route_id: "r1".to_string(),
            bus_id: "b1".to_string(),
            departure_time: "07:45".to_string(),
            days: vec!["MON".to_string()],
        };
        assert!(req.validate().is_none());

        req.departure_time = "7.45am".to_string();
        assert_eq!(req.validate().as_deref(), Some("departureTime must be HH:MM"));
    }
}
