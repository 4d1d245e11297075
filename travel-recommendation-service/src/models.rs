use serde::{Deserialize, Serialize};
use travel_flow::{DEFAULT_NUM_PLACES, RefineRequest, TurnRequest};

pub const MAX_NUM_PLACES: i64 = 10;
pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const MAX_SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRecommendationRequest {
    pub text: String,
    pub num_places: Option<i64>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefineRecommendationRequest {
    #[serde(default)]
    pub exclude: Vec<String>,
    pub num_places: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn validate_num_places(value: Option<i64>) -> Result<Option<u32>, String> {
    match value {
        None => Ok(None),
        Some(n) if (1..=MAX_NUM_PLACES).contains(&n) => Ok(Some(n as u32)),
        Some(n) => Err(format!(
            "num_places must be between 1 and {}, got {}",
            MAX_NUM_PLACES, n
        )),
    }
}

fn clean_exclusions(exclude: Vec<String>) -> Vec<String> {
    exclude
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

impl CreateRecommendationRequest {
    pub fn into_turn(self) -> Result<TurnRequest, String> {
        if self.text.trim().is_empty() {
            return Err("text must not be empty".to_string());
        }
        Ok(TurnRequest {
            text: self.text,
            num_places: Some(validate_num_places(self.num_places)?.unwrap_or(DEFAULT_NUM_PLACES)),
            exclude: clean_exclusions(self.exclude),
        })
    }
}

impl RefineRecommendationRequest {
    pub fn into_refinement(self) -> Result<RefineRequest, String> {
        let exclude = clean_exclusions(self.exclude);
        if exclude.is_empty() {
            return Err("exclude must name at least one place".to_string());
        }
        Ok(RefineRequest {
            exclude,
            num_places: validate_num_places(self.num_places)?,
        })
    }
}

impl HistoryQuery {
    /// `(limit, offset)` after range checks
    pub fn bounds(&self) -> Result<(usize, usize), String> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err("offset must not be negative".to_string());
        }
        Ok((limit as usize, offset as usize))
    }
}

impl SearchQuery {
    /// `(term, limit)` after validation
    pub fn validated(&self) -> Result<(String, usize), String> {
        let term = self.q.as_deref().map(str::trim).unwrap_or_default();
        if term.is_empty() {
            return Err("q must not be empty".to_string());
        }
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(format!("limit must be between 1 and {}", MAX_SEARCH_LIMIT));
        }
        Ok((term.to_string(), limit as usize))
    }
}
