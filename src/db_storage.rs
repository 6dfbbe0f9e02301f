use crate::errors::AppError;
use crate::models::PlotRecord;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Storage for plot enrichment records.
///
/// The JSONB `||` merge in the upsert is the concurrency contract for the
/// `enrichment_data` column: concurrent writers touching disjoint top-level
/// keys never clobber each other; writers touching the same key race
/// last-write-wins.
pub struct PlotStorage {
    pool: PgPool,
}

impl PlotStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a plot row, shallow-merging `enrichment` into whatever
    /// `enrichment_data` the row already carries.
    pub async fn upsert_enrichment(
        &self,
        plot_id: Uuid,
        latitude: f64,
        longitude: f64,
        enrichment: &Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO geo.plots AS p (id, latitude, longitude, enrichment_data, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (id) DO UPDATE
            SET enrichment_data = COALESCE(p.enrichment_data, '{}'::jsonb)
                                  || EXCLUDED.enrichment_data,
                updated_at = now()
            "#,
        )
        .bind(plot_id)
        .bind(latitude)
        .bind(longitude)
        .bind(enrichment)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        tracing::info!("✓ Stored enrichment for plot {}", plot_id);
        Ok(())
    }

    /// Overwrites the plot's authoritative coordinates only when they differ
    /// from the stored pair. Provenance (manual survey vs. automated run) is
    /// not modeled; the equality check is the entire guard.
    pub async fn maybe_update_real_coordinates(
        &self,
        plot_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE geo.plots
            SET real_latitude = $2,
                real_longitude = $3,
                updated_at = now()
            WHERE id = $1
              AND (real_latitude IS DISTINCT FROM $2 OR real_longitude IS DISTINCT FROM $3)
            "#,
        )
        .bind(plot_id)
        .bind(latitude)
        .bind(longitude)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        let updated = result.rows_affected() > 0;
        if updated {
            tracing::info!("Updated real coordinates for plot {}", plot_id);
        }
        Ok(updated)
    }

    pub async fn get_plot(&self, plot_id: Uuid) -> Result<Option<PlotRecord>, AppError> {
        let plot = sqlx::query_as::<_, PlotRecord>(
            r#"
            SELECT id, latitude, longitude, real_latitude, real_longitude,
                   municipality_id, enrichment_data
            FROM geo.plots
            WHERE id = $1
            "#,
        )
        .bind(plot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plot)
    }

    /// Pages through plots that have no enrichment yet (or are missing the
    /// layers key). The batch workers pull from this cursor.
    pub async fn plots_needing_enrichment(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PlotRecord>, AppError> {
        let plots = sqlx::query_as::<_, PlotRecord>(
            r#"
            SELECT id, latitude, longitude, real_latitude, real_longitude,
                   municipality_id, enrichment_data
            FROM geo.plots
            WHERE enrichment_data IS NULL OR NOT enrichment_data ? 'layers'
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(plots)
    }
}

/// In-memory mirror of the SQL `||` merge: top-level keys of `new` are laid
/// over `existing`, leaving every other key intact. Used to build the merged
/// object returned to callers so the response matches what was persisted.
pub fn shallow_merge(existing: &Value, new: &Value) -> Value {
    match (existing, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        // jsonb || replaces wholesale for non-object operands
        _ => new.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_preserves_disjoint_keys() {
        let existing = json!({"zoning": {"label": "Urban"}});
        let new = json!({"layers": {"count": 3}});
        let merged = shallow_merge(&existing, &new);
        assert_eq!(merged["zoning"]["label"], "Urban");
        assert_eq!(merged["layers"]["count"], 3);
    }

    #[test]
    fn merge_is_shallow_last_write_wins() {
        let existing = json!({"zoning": {"label": "Urban", "code": "1.1"}});
        let new = json!({"zoning": {"label": "Rural"}});
        let merged = shallow_merge(&existing, &new);
        // The whole top-level key is replaced, not deep-merged.
        assert_eq!(merged["zoning"], json!({"label": "Rural"}));
    }
}
