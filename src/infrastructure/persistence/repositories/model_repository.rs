use crate::domain::ml::model_descriptor::ModelDescriptor;
use crate::domain::repositories::ModelRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

pub struct SqliteModelRepository {
    pool: SqlitePool,
}

impl SqliteModelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelRepository for SqliteModelRepository {
    async fn save(&self, descriptor: &ModelDescriptor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ml_models (
                name, model_type, supported_horizons_json, artifact_location,
                feature_config_json, metrics_json, is_active, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                model_type = excluded.model_type,
                supported_horizons_json = excluded.supported_horizons_json,
                artifact_location = excluded.artifact_location,
                feature_config_json = excluded.feature_config_json,
                metrics_json = excluded.metrics_json,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&descriptor.name)
        .bind(&descriptor.model_type)
        .bind(serde_json::to_string(&descriptor.supported_horizons)?)
        .bind(&descriptor.artifact_location)
        .bind(serde_json::to_string(&descriptor.feature_config)?)
        .bind(serde_json::to_string(&descriptor.metrics)?)
        .bind(descriptor.is_active)
        .bind(descriptor.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save model descriptor")?;

        info!("Persisted model descriptor {}", descriptor.name);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ModelDescriptor>> {
        let rows = sqlx::query("SELECT * FROM ml_models ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut descriptors = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let horizons: String = row.try_get("supported_horizons_json")?;
            let feature_config: String = row.try_get("feature_config_json")?;
            let metrics: String = row.try_get("metrics_json")?;
            let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

            descriptors.push(ModelDescriptor {
                supported_horizons: serde_json::from_str(&horizons)
                    .with_context(|| format!("Corrupt horizons for model {}", name))?,
                feature_config: serde_json::from_str(&feature_config)
                    .with_context(|| format!("Corrupt feature config for model {}", name))?,
                metrics: serde_json::from_str(&metrics)
                    .with_context(|| format!("Corrupt metrics for model {}", name))?,
                model_type: row.try_get("model_type")?,
                artifact_location: row.try_get("artifact_location")?,
                is_active: row.try_get("is_active")?,
                updated_at,
                name,
            });
        }
        Ok(descriptors)
    }
}
