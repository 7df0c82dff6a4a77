//! Relevance scores produced by the external model, one per (client, advertiser).

use std::collections::HashMap;

use super::Database;
use anyhow::Result;
use uuid::Uuid;

use crate::RelevanceDirectory;

impl Database {
    pub async fn bulk_relevance(
        &self,
        client_id: Uuid,
        advertiser_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>> {
        if advertiser_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT advertiser_id, score FROM relevance_scores
             WHERE client_id = $1 AND advertiser_id = ANY($2)",
        )
        .bind(client_id)
        .bind(advertiser_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn upsert_relevance(&self, client_id: Uuid, advertiser_id: Uuid, score: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO relevance_scores (client_id, advertiser_id, score)
             VALUES ($1, $2, $3)
             ON CONFLICT (client_id, advertiser_id) DO UPDATE SET score = EXCLUDED.score",
        )
        .bind(client_id)
        .bind(advertiser_id)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl RelevanceDirectory for Database {
    async fn bulk_relevance(
        &self,
        client_id: Uuid,
        advertiser_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>> {
        Database::bulk_relevance(self, client_id, advertiser_ids).await
    }

    async fn upsert_relevance(&self, client_id: Uuid, advertiser_id: Uuid, score: i64) -> Result<()> {
        Database::upsert_relevance(self, client_id, advertiser_id, score).await
    }
}
