use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of places recommended when the caller does not ask for a count
pub const DEFAULT_NUM_PLACES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A named point of interest returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub description: String,
    pub coords: Coordinates,
}

impl Place {
    pub fn new(name: impl Into<String>, description: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            coords: Coordinates { lat, lng },
        }
    }
}

/// One persisted turn: the user's text plus what we answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub id: i64,
    pub text: String,
    pub exclude: Vec<String>,
    pub num_places: u32,
    pub response_json: Vec<Place>,
    pub created_at: DateTime<Utc>,
}

/// Data for a record that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewTravelRequest {
    pub text: String,
    pub exclude: Vec<String>,
    pub num_places: u32,
    pub response_json: Vec<Place>,
}

/// Aggregate numbers over the whole history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_requests: i64,
    pub today_requests: i64,
    pub average_places: f64,
}

/// Round to two decimals, the precision `average_places` is reported with
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
