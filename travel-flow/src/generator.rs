use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::{
    completion::CompletionBackend,
    decode::decode_response,
    error::{RecommendError, Result},
    exclusions::{dedup_preserving_order, remove_excluded},
    models::Place,
    prompt::{PromptPair, build_prompts},
};

/// Provider retries after the first failed call
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Extra full requests issued when the model returns too few places
pub const DEFAULT_CORRECTIVE_ROUNDS: u32 = 2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub corrective_rounds: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            corrective_rounds: DEFAULT_CORRECTIVE_ROUNDS,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`: `base_delay * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Places and newly extracted exclusions of one successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub places: Vec<Place>,
    pub exclusions: Vec<String>,
}

/// Wraps a [`CompletionBackend`] with backoff on provider failures and
/// bounded corrective rounds on short answers.
#[derive(Clone)]
pub struct PlaceGenerator {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl PlaceGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Ask the model for `num_places` places for `request`.
    ///
    /// Places named in `known_exclusions`, or in exclusions the model itself
    /// extracted, never count towards the requested number.
    pub async fn generate(
        &self,
        request: &str,
        num_places: u32,
        known_exclusions: &[String],
    ) -> Result<Generation> {
        if num_places == 0 {
            return Err(RecommendError::InvalidInput(
                "num_places must be at least 1".into(),
            ));
        }

        let wanted = num_places as usize;
        let base_prompt = build_prompts(request, num_places, known_exclusions);
        let mut prompt = base_prompt.clone();
        let mut extracted: Vec<String> = Vec::new();
        let mut last_count = 0;

        for round in 0..=self.policy.corrective_rounds {
            let raw = self.complete_with_backoff(&prompt).await?;

            let decoded = decode_response(&raw).map_err(|e| {
                error!(error = %e, "Could not decode model response");
                RecommendError::Generation(format!("Could not parse model response: {}", e))
            })?;
            if decoded.skipped > 0 {
                warn!(skipped = decoded.skipped, "Skipped malformed place entries");
            }

            // exclusions the model extracted in earlier rounds still apply
            extracted = dedup_preserving_order(extracted.into_iter().chain(decoded.exclusions));
            let mut places = decoded.places;

            let filter: Vec<String> = known_exclusions
                .iter()
                .chain(extracted.iter())
                .cloned()
                .collect();
            let removed = remove_excluded(&mut places, &filter);
            if removed > 0 {
                warn!(removed, "Model recommended excluded places, dropped them");
            }

            match places.len().cmp(&wanted) {
                Ordering::Equal => {
                    info!(round, places = places.len(), "Generated recommendations");
                    return Ok(Generation {
                        places,
                        exclusions: extracted,
                    });
                }
                Ordering::Greater => {
                    warn!(
                        expected = wanted,
                        got = places.len(),
                        "Model returned more places than requested, keeping all"
                    );
                    return Ok(Generation {
                        places,
                        exclusions: extracted,
                    });
                }
                Ordering::Less => {
                    warn!(
                        round,
                        expected = wanted,
                        got = places.len(),
                        "Model returned too few places"
                    );
                    last_count = places.len();
                    prompt = corrective_prompt(&base_prompt, wanted, last_count);
                }
            }
        }

        error!(
            expected = wanted,
            got = last_count,
            rounds = self.policy.corrective_rounds,
            "Giving up on short model responses"
        );
        Err(RecommendError::Generation(format!(
            "Model returned {} of {} requested places after {} attempts",
            last_count,
            wanted,
            self.policy.corrective_rounds + 1
        )))
    }

    async fn complete_with_backoff(&self, prompt: &PromptPair) -> Result<String> {
        let attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            match self.backend.complete(prompt).await {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt < self.policy.max_retries => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "LLM provider error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts, error = %e, "LLM provider error, retries exhausted");
                    return Err(RecommendError::Generation(format!(
                        "LLM provider error after {} attempts: {}",
                        attempts, e
                    )));
                }
            }
        }
    }
}

fn corrective_prompt(base: &PromptPair, wanted: usize, got: usize) -> PromptPair {
    PromptPair {
        system: base.system.clone(),
        user: format!(
            "{}\n\nYour previous answer contained only {} usable places (excluded places do not count). \
             Return EXACTLY {} places this time.",
            base.user, got, wanted
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::completion::ProviderError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Replays canned answers in order; the last one repeats when the script runs out
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
        last: Mutex<Option<std::result::Result<String, ProviderError>>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) prompts: Mutex<Vec<PromptPair>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(script: Vec<std::result::Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            prompt: &PromptPair,
        ) -> std::result::Result<String, ProviderError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(answer) => {
                    *last = Some(answer.clone());
                    answer
                }
                None => last
                    .clone()
                    .unwrap_or(Err(ProviderError::Request("script exhausted".into()))),
            }
        }
    }

    pub(crate) fn places_json(names: &[&str]) -> String {
        let places: Vec<serde_json::Value> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                serde_json::json!({
                    "name": name,
                    "description": format!("{} is worth a visit", name),
                    "coords": {"lat": 41.9 + i as f64 / 100.0, "lng": 12.5}
                })
            })
            .collect();
        serde_json::json!({ "places": places, "exclusions": [] }).to_string()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            corrective_rounds: 2,
        }
    }

    fn rate_limited() -> std::result::Result<String, ProviderError> {
        Err(ProviderError::Request("429 Too Many Requests".into()))
    }

    #[tokio::test]
    async fn test_returns_requested_places() {
        let backend = ScriptedBackend::new(vec![Ok(places_json(&["Pantheon", "Forum", "Trastevere"]))]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let generation = generator.generate("Rome", 3, &[]).await.unwrap();

        assert_eq!(generation.places.len(), 3);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_exponential_backoff() {
        let backend = ScriptedBackend::new(vec![
            rate_limited(),
            Err(ProviderError::Request("request timed out".into())),
            Ok(places_json(&["Pantheon", "Forum", "Trastevere"])),
        ]);
        let generator = PlaceGenerator::new(backend.clone(), RetryPolicy::default());

        let start = tokio::time::Instant::now();
        let generation = generator.generate("Rome", 3, &[]).await.unwrap();
        let waited = start.elapsed();

        assert_eq!(generation.places.len(), 3);
        assert_eq!(backend.calls(), 3);
        assert!(waited >= Duration::from_secs(3), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(3100), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_provider_error_after_retries_exhausted() {
        let backend = ScriptedBackend::new(vec![rate_limited()]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let err = generator.generate("Rome", 3, &[]).await.unwrap_err();

        assert!(matches!(err, RecommendError::Generation(_)));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_short_answer_triggers_corrective_round() {
        let backend = ScriptedBackend::new(vec![
            Ok(places_json(&["Pantheon"])),
            Ok(places_json(&["Pantheon", "Forum", "Trastevere"])),
        ]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let generation = generator.generate("Rome", 3, &[]).await.unwrap();

        assert_eq!(generation.places.len(), 3);
        assert_eq!(backend.calls(), 2);
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[1].user.contains("contained only 1 usable places"));
    }

    #[tokio::test]
    async fn test_persistent_short_answers_are_capped() {
        let backend = ScriptedBackend::new(vec![Ok(places_json(&["Pantheon"]))]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let err = generator.generate("Rome", 3, &[]).await.unwrap_err();

        assert!(err.to_string().contains("1 of 3"));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_extra_places_are_accepted() {
        let backend = ScriptedBackend::new(vec![Ok(places_json(&["A", "B", "C", "D"]))]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let generation = generator.generate("Rome", 3, &[]).await.unwrap();

        assert_eq!(generation.places.len(), 4);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_excluded_places_do_not_count() {
        let backend = ScriptedBackend::new(vec![
            Ok(places_json(&["Colosseum", "Pantheon", "Forum"])),
            Ok(places_json(&["Pantheon", "Forum", "Trastevere"])),
        ]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let generation = generator
            .generate("Rome", 3, &["Colosseum".to_string()])
            .await
            .unwrap();

        assert_eq!(backend.calls(), 2);
        assert!(generation.places.iter().all(|p| p.name != "Colosseum"));
        assert!(backend.prompts.lock().unwrap()[0].user.contains("Colosseum"));
    }

    #[tokio::test]
    async fn test_extracted_exclusions_are_returned() {
        let raw = serde_json::json!({
            "places": [{"name": "Pantheon"}, {"name": "Vatican Museums"}],
            "exclusions": ["Vatican Museums", "Colosseum", "Colosseum"]
        })
        .to_string();
        let backend = ScriptedBackend::new(vec![Ok(raw), Ok(places_json(&["Pantheon", "Forum"]))]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let generation = generator.generate("no Vatican please", 2, &[]).await.unwrap();

        assert_eq!(generation.places.len(), 2);
        assert_eq!(
            generation.exclusions,
            vec!["Vatican Museums".to_string(), "Colosseum".to_string()]
        );
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Ok("I'd love to help you plan Rome!".into())]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let err = generator.generate("Rome", 3, &[]).await.unwrap_err();

        assert!(matches!(err, RecommendError::Generation(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_places_is_invalid() {
        let backend = ScriptedBackend::new(vec![]);
        let generator = PlaceGenerator::new(backend.clone(), fast_policy());

        let err = generator.generate("Rome", 0, &[]).await.unwrap_err();

        assert!(matches!(err, RecommendError::InvalidInput(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }
}
