//! Recommender – ties the generator and the request store together.
//!
//! Two ways of refining an answer are supported:
//!
//! * **Turns**: every new message is a fresh record. The last
//!   [`HISTORY_WINDOW`] records are folded into the prompt as conversation
//!   context, and their exclusions are carried forward into the new record.
//! * **Refine by id**: an existing record is regenerated against its original
//!   text with extra exclusions, and overwritten in place.
//!
//! Both paths accumulate exclusions through
//! [`accumulate_exclusions`](crate::exclusions::accumulate_exclusions), so the
//! stored list is always deduplicated in first-seen order.
//!
//! Nothing is written unless the generator succeeded, so a failed LLM call
//! never leaves a partial record behind.

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    error::{RecommendError, Result},
    exclusions::{HISTORY_WINDOW, accumulate_exclusions, build_context, dedup_preserving_order},
    generator::PlaceGenerator,
    models::{DEFAULT_NUM_PLACES, NewTravelRequest, Statistics, TravelRequest},
    storage::TravelRequestStore,
};

/// A new conversational turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub text: String,
    pub num_places: Option<u32>,
    /// Places the caller explicitly wants left out, on top of what the model extracts
    pub exclude: Vec<String>,
}

impl TurnRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            num_places: None,
            exclude: Vec::new(),
        }
    }
}

/// Extra exclusions for an existing record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RefineRequest {
    pub exclude: Vec<String>,
    pub num_places: Option<u32>,
}

/// High-level entry point used by the HTTP layer
#[derive(Clone)]
pub struct Recommender {
    generator: PlaceGenerator,
    store: Arc<dyn TravelRequestStore>,
}

impl Recommender {
    pub fn new(generator: PlaceGenerator, store: Arc<dyn TravelRequestStore>) -> Self {
        Self { generator, store }
    }

    /// Handle one turn: build context from history, generate, persist.
    pub async fn create(&self, request: TurnRequest) -> Result<TravelRequest> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(RecommendError::InvalidInput("text must not be empty".into()));
        }
        let num_places = request.num_places.unwrap_or(DEFAULT_NUM_PLACES);

        let history = self.store.recent(HISTORY_WINDOW).await?;
        let context = build_context(&history, text);
        let known = accumulate_exclusions(&history, request.exclude.iter().cloned());

        info!(
            history = history.len(),
            known_exclusions = known.len(),
            num_places,
            "Generating recommendations for new turn"
        );

        let generation = self
            .generator
            .generate(&context, num_places, &known)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to generate recommendations"))?;

        let exclude = dedup_preserving_order(known.into_iter().chain(generation.exclusions));

        let record = self
            .store
            .create(NewTravelRequest {
                text: text.to_string(),
                exclude,
                num_places,
                response_json: generation.places,
            })
            .await?;

        info!(id = record.id, exclusions = record.exclude.len(), "Stored travel request");
        Ok(record)
    }

    /// Regenerate record `id` without the given places and overwrite it.
    pub async fn refine(&self, id: i64, request: RefineRequest) -> Result<TravelRequest> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or(RecommendError::NotFound(id))?;

        let num_places = request.num_places.unwrap_or(current.num_places);
        let known = accumulate_exclusions(std::slice::from_ref(&current), request.exclude);

        info!(id, exclusions = known.len(), num_places, "Refining travel request");

        let generation = self
            .generator
            .generate(&current.text, num_places, &known)
            .await
            .inspect_err(|e| error!(id, error = %e, "Failed to refine recommendations"))?;

        let exclude = dedup_preserving_order(known.into_iter().chain(generation.exclusions));

        self.store
            .update_refinement(id, exclude, generation.places)
            .await?
            .ok_or(RecommendError::NotFound(id))
    }

    pub async fn get(&self, id: i64) -> Result<TravelRequest> {
        self.store
            .get(id)
            .await?
            .ok_or(RecommendError::NotFound(id))
    }

    pub async fn history(&self, limit: usize, offset: usize) -> Result<Vec<TravelRequest>> {
        self.store.list(limit, offset).await
    }

    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<TravelRequest>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(RecommendError::InvalidInput(
                "search term must not be empty".into(),
            ));
        }
        self.store.search(term, limit).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if self.store.delete(id).await? {
            info!(id, "Deleted travel request");
            Ok(())
        } else {
            Err(RecommendError::NotFound(id))
        }
    }

    pub async fn statistics(&self) -> Result<Statistics> {
        self.store.statistics().await
    }
}
