//! Decoding of the model's loosely structured JSON answer.
//!
//! The raw value is first classified into a [`PayloadShape`], then every
//! place entry is coerced field by field. Entries that are not JSON objects
//! are skipped; missing fields fall back to placeholders. Only text that is
//! not JSON at all, or a bare scalar, fails.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{Coordinates, Place};

pub const UNKNOWN_PLACE_NAME: &str = "Unknown";

const PLACES_KEY: &str = "places";
const EXCLUSIONS_KEY: &str = "exclusions";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object or array, got {0}")]
    UnexpectedShape(&'static str),
}

/// The shapes we accept from the model
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    /// `[ {...}, {...} ]`
    BareArray(Vec<Value>),
    /// `{ "places": [...], "exclusions": [...] }`
    Places {
        places: Vec<Value>,
        exclusions: Vec<String>,
    },
    /// An object without `places` whose first other array holds the places
    OtherArray {
        key: String,
        places: Vec<Value>,
        exclusions: Vec<String>,
    },
    /// An object with no array at all, read as a single place
    SingleObject(Map<String, Value>),
}

impl PayloadShape {
    pub fn classify(value: Value) -> Result<Self, DecodeError> {
        let mut map = match value {
            Value::Array(items) => return Ok(PayloadShape::BareArray(items)),
            Value::Object(map) => map,
            Value::Null => return Err(DecodeError::UnexpectedShape("null")),
            Value::Bool(_) => return Err(DecodeError::UnexpectedShape("a boolean")),
            Value::Number(_) => return Err(DecodeError::UnexpectedShape("a number")),
            Value::String(_) => return Err(DecodeError::UnexpectedShape("a string")),
        };

        let exclusions = map
            .get(EXCLUSIONS_KEY)
            .map(string_list)
            .unwrap_or_default();

        if let Some(Value::Array(places)) = map.shift_remove(PLACES_KEY) {
            return Ok(PayloadShape::Places { places, exclusions });
        }

        let other_key = map
            .iter()
            .find(|(key, value)| key.as_str() != EXCLUSIONS_KEY && value.is_array())
            .map(|(key, _)| key.clone());

        match other_key.and_then(|key| map.shift_remove(&key).map(|value| (key, value))) {
            Some((key, Value::Array(places))) => Ok(PayloadShape::OtherArray {
                key,
                places,
                exclusions,
            }),
            _ => Ok(PayloadShape::SingleObject(map)),
        }
    }

    /// Split into the raw place entries and the extracted exclusions
    pub fn into_parts(self) -> (Vec<Value>, Vec<String>) {
        match self {
            PayloadShape::BareArray(places) => (places, Vec::new()),
            PayloadShape::Places { places, exclusions } => (places, exclusions),
            PayloadShape::OtherArray {
                places, exclusions, ..
            } => (places, exclusions),
            PayloadShape::SingleObject(map) => (vec![Value::Object(map)], Vec::new()),
        }
    }
}

/// Result of decoding one model answer
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub places: Vec<Place>,
    pub exclusions: Vec<String>,
    /// Entries dropped because they were not JSON objects
    pub skipped: usize,
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

pub fn decode_response(raw: &str) -> Result<DecodedResponse, DecodeError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let (entries, exclusions) = PayloadShape::classify(value)?.into_parts();
    let total = entries.len();
    let places: Vec<Place> = entries.iter().filter_map(place_from_value).collect();

    Ok(DecodedResponse {
        skipped: total - places.len(),
        places,
        exclusions,
    })
}

/// Coerce one entry into a [`Place`]; `None` for non-object entries
pub fn place_from_value(value: &Value) -> Option<Place> {
    let entry = value.as_object()?;

    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_PLACE_NAME)
        .to_string();
    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let coords = entry
        .get("coords")
        .and_then(Value::as_object)
        .map(|coords| Coordinates {
            lat: coordinate(coords.get("lat")),
            lng: coordinate(coords.get("lng")),
        })
        .unwrap_or_default();

    Some(Place {
        name,
        description,
        coords,
    })
}

fn coordinate(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
