pub mod completion;
pub mod decode;
pub mod error;
pub mod exclusions;
pub mod generator;
pub mod models;
pub mod prompt;
pub mod recommender;
pub mod storage;
pub mod storage_postgres;

// Re-export commonly used types
pub use completion::{
    CompletionBackend, CompletionSettings, LlmProvider, ProviderError, RigCompletionBackend,
};
pub use error::{RecommendError, Result};
pub use generator::{Generation, PlaceGenerator, RetryPolicy};
pub use models::{Coordinates, DEFAULT_NUM_PLACES, NewTravelRequest, Place, Statistics, TravelRequest};
pub use recommender::{RefineRequest, Recommender, TurnRequest};
pub use storage::{InMemoryTravelRequestStore, TravelRequestStore};
pub use storage_postgres::PostgresTravelRequestStore;
