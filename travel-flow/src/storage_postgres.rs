use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{error, info};

use crate::{
    error::{RecommendError, Result},
    models::{NewTravelRequest, Place, Statistics, TravelRequest, round2},
    storage::TravelRequestStore,
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS travel_requests (
    id            BIGSERIAL PRIMARY KEY,
    text          TEXT NOT NULL,
    exclude       JSONB NOT NULL DEFAULT '[]'::jsonb,
    num_places    INTEGER NOT NULL DEFAULT 3,
    response_json JSONB NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_travel_requests_created_at ON travel_requests (created_at DESC)";

const COLUMNS: &str = "id, text, exclude, num_places, response_json, created_at";

#[derive(FromRow)]
struct TravelRequestRow {
    id: i64,
    text: String,
    exclude: Json<Vec<String>>,
    num_places: i32,
    response_json: Json<Vec<Place>>,
    created_at: DateTime<Utc>,
}

impl From<TravelRequestRow> for TravelRequest {
    fn from(row: TravelRequestRow) -> Self {
        TravelRequest {
            id: row.id,
            text: row.text,
            exclude: row.exclude.0,
            num_places: row.num_places.max(0) as u32,
            response_json: row.response_json.0,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL implementation of TravelRequestStore
pub struct PostgresTravelRequestStore {
    pool: PgPool,
}

impl PostgresTravelRequestStore {
    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        info!("travel_requests schema ready");
        Ok(())
    }
}

/// Escape LIKE wildcards so the term matches literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn to_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl TravelRequestStore for PostgresTravelRequestStore {
    async fn create(&self, request: NewTravelRequest) -> Result<TravelRequest> {
        let num_places = i32::try_from(request.num_places)
            .map_err(|_| RecommendError::InvalidInput("num_places is too large".into()))?;

        // dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, TravelRequestRow>(&format!(
            "INSERT INTO travel_requests (text, exclude, num_places, response_json) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(&request.text)
        .bind(Json(&request.exclude))
        .bind(num_places)
        .bind(Json(&request.response_json))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert travel request");
            RecommendError::Storage(format!("Failed to create travel request: {}", e))
        })?;
        tx.commit().await?;

        Ok(row.into())
    }

    async fn get(&self, id: i64) -> Result<Option<TravelRequest>> {
        let row = sqlx::query_as::<_, TravelRequestRow>(&format!(
            "SELECT {COLUMNS} FROM travel_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TravelRequest>> {
        self.list(limit, 0).await
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<TravelRequest>> {
        let rows = sqlx::query_as::<_, TravelRequestRow>(&format!(
            "SELECT {COLUMNS} FROM travel_requests \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(to_limit(limit))
        .bind(to_limit(offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_refinement(
        &self,
        id: i64,
        exclude: Vec<String>,
        response_json: Vec<Place>,
    ) -> Result<Option<TravelRequest>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, TravelRequestRow>(&format!(
            "UPDATE travel_requests SET exclude = $2, response_json = $3 \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(Json(&exclude))
        .bind(Json(&response_json))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, id, "Failed to update travel request");
            RecommendError::Storage(format!("Failed to update travel request: {}", e))
        })?;
        tx.commit().await?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM travel_requests WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, id, "Failed to delete travel request");
                RecommendError::Storage(format!("Failed to delete travel request: {}", e))
            })?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<TravelRequest>> {
        let rows = sqlx::query_as::<_, TravelRequestRow>(&format!(
            "SELECT {COLUMNS} FROM travel_requests WHERE text ILIKE $1 ESCAPE '\\' \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(like_pattern(term))
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn statistics(&self) -> Result<Statistics> {
        let (total_requests, today_requests, average): (i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE (created_at AT TIME ZONE 'UTC')::date = (now() AT TIME ZONE 'UTC')::date), \
                    AVG(num_places)::float8 \
             FROM travel_requests",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Statistics {
            total_requests,
            today_requests,
            average_places: average.map(round2).unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("рим"), "%рим%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    async fn test_store() -> PostgresTravelRequestStore {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
        let pool = PgPool::connect(&database_url).await.unwrap();
        let store = PostgresTravelRequestStore::from_pool(pool);
        store.migrate().await.unwrap();
        store
    }

    fn new_request(text: String, num_places: u32) -> NewTravelRequest {
        NewTravelRequest {
            text,
            exclude: vec!["Colosseum".into()],
            num_places,
            response_json: vec![Place::new("Pantheon", "Roman temple", 41.8986, 12.4769)],
        }
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn test_postgres_round_trip_and_refinement() {
        let store = test_store().await;
        let marker = format!("pg-roundtrip-{}", Utc::now().timestamp_nanos_opt().unwrap_or(0));

        let created = store
            .create(new_request(format!("Rome {marker}"), 2))
            .await
            .unwrap();
        assert_eq!(created.num_places, 2);
        assert_eq!(created.exclude, vec!["Colosseum".to_string()]);
        assert_eq!(created.response_json[0].coords.lat, 41.8986);
        assert_eq!(store.get(created.id).await.unwrap(), Some(created.clone()));

        let updated = store
            .update_refinement(
                created.id,
                vec!["Colosseum".into(), "Pantheon".into()],
                vec![Place::new("Roman Forum", "Ruins", 41.8925, 12.4853)],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.response_json[0].name, "Roman Forum");

        assert!(store.delete(created.id).await.unwrap());
        assert!(!store.delete(created.id).await.unwrap());
        assert!(store.get(created.id).await.unwrap().is_none());
        assert!(
            store
                .update_refinement(created.id, vec![], vec![])
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn test_postgres_search_escapes_wildcards_and_counts_today() {
        let store = test_store().await;
        let marker = format!("pg-search-{}", Utc::now().timestamp_nanos_opt().unwrap_or(0));

        let literal = store
            .create(new_request(format!("Weekend in ROME 100% {marker}"), 3))
            .await
            .unwrap();
        let other = store
            .create(new_request(format!("Weekend in Rome 1000 {marker}"), 3))
            .await
            .unwrap();

        let found = store.search(&format!("rome 100% {marker}"), 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, literal.id);

        let both = store.search(&marker, 10).await.unwrap();
        assert_eq!(
            both.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![other.id, literal.id]
        );

        let stats = store.statistics().await.unwrap();
        assert!(stats.total_requests >= 2);
        assert!(stats.today_requests >= 2);
        assert!(stats.average_places > 0.0);

        store.delete(literal.id).await.unwrap();
        store.delete(other.id).await.unwrap();
    }
}
