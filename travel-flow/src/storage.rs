use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::{
    error::Result,
    models::{NewTravelRequest, Place, Statistics, TravelRequest, round2},
};

/// Trait for storing and querying the request history
#[async_trait]
pub trait TravelRequestStore: Send + Sync {
    async fn create(&self, request: NewTravelRequest) -> Result<TravelRequest>;
    async fn get(&self, id: i64) -> Result<Option<TravelRequest>>;
    /// Most recent records first, used to build conversational context
    async fn recent(&self, limit: usize) -> Result<Vec<TravelRequest>>;
    /// A page of the history, most recent first
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<TravelRequest>>;
    /// Overwrite exclusions and places of an existing record
    async fn update_refinement(
        &self,
        id: i64,
        exclude: Vec<String>,
        response_json: Vec<Place>,
    ) -> Result<Option<TravelRequest>>;
    /// Returns `false` when there was nothing to delete
    async fn delete(&self, id: i64) -> Result<bool>;
    /// Case-insensitive substring match over the request text
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<TravelRequest>>;
    async fn statistics(&self) -> Result<Statistics>;
}

/// In-memory implementation of TravelRequestStore
pub struct InMemoryTravelRequestStore {
    requests: Arc<DashMap<i64, TravelRequest>>,
    next_id: AtomicI64,
}

impl InMemoryTravelRequestStore {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// All records, newest first. Ids are handed out in insertion order.
    fn sorted(&self) -> Vec<TravelRequest> {
        let mut all: Vec<TravelRequest> = self
            .requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.id.cmp(&a.id));
        all
    }
}

impl Default for InMemoryTravelRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TravelRequestStore for InMemoryTravelRequestStore {
    async fn create(&self, request: NewTravelRequest) -> Result<TravelRequest> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = TravelRequest {
            id,
            text: request.text,
            exclude: request.exclude,
            num_places: request.num_places,
            response_json: request.response_json,
            created_at: Utc::now(),
        };
        self.requests.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<TravelRequest>> {
        Ok(self.requests.get(&id).map(|entry| entry.clone()))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TravelRequest>> {
        Ok(self.sorted().into_iter().take(limit).collect())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<TravelRequest>> {
        Ok(self.sorted().into_iter().skip(offset).take(limit).collect())
    }

    async fn update_refinement(
        &self,
        id: i64,
        exclude: Vec<String>,
        response_json: Vec<Place>,
    ) -> Result<Option<TravelRequest>> {
        Ok(self.requests.get_mut(&id).map(|mut entry| {
            entry.exclude = exclude;
            entry.response_json = response_json;
            entry.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.requests.remove(&id).is_some())
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<TravelRequest>> {
        let needle = term.to_lowercase();
        Ok(self
            .sorted()
            .into_iter()
            .filter(|request| request.text.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }

    async fn statistics(&self) -> Result<Statistics> {
        let today = Utc::now().date_naive();
        let all = self.sorted();
        let total = all.len() as i64;
        let today_requests = all
            .iter()
            .filter(|request| request.created_at.date_naive() == today)
            .count() as i64;
        let average_places = if all.is_empty() {
            0.0
        } else {
            let sum: u64 = all.iter().map(|request| request.num_places as u64).sum();
            round2(sum as f64 / total as f64)
        };

        Ok(Statistics {
            total_requests: total,
            today_requests,
            average_places,
        })
    }
}
