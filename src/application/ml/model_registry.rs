use crate::application::ml::artifact::ArtifactLoader;
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::ml::model_descriptor::ModelDescriptor;
use crate::domain::repositories::ModelRepository;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Process-wide mapping from model name to descriptor.
///
/// Writes hold the lock across validation and the write-through to the
/// repository, so readers never see a descriptor that failed to persist.
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, ModelDescriptor>>,
    loader: Arc<dyn ArtifactLoader>,
    repository: Option<Arc<dyn ModelRepository>>,
}

impl ModelRegistry {
    /// Volatile registry. Nothing survives a restart.
    pub fn new(loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            models: RwLock::new(BTreeMap::new()),
            loader,
            repository: None,
        }
    }

    /// Registry backed by `repository`, pre-populated from it.
    pub async fn restore(
        loader: Arc<dyn ArtifactLoader>,
        repository: Arc<dyn ModelRepository>,
    ) -> anyhow::Result<Self> {
        let descriptors = repository.get_all().await?;
        let mut models = BTreeMap::new();
        for descriptor in descriptors {
            if let Err(e) = descriptor.validate() {
                warn!("ModelRegistry: skipping stored descriptor: {}", e);
                continue;
            }
            models.insert(descriptor.name.clone(), descriptor);
        }
        info!("ModelRegistry: restored {} model(s)", models.len());

        Ok(Self {
            models: RwLock::new(models),
            loader,
            repository: Some(repository),
        })
    }

    pub fn ensure_reachable(&self, descriptor: &ModelDescriptor) -> ForecastResult<()> {
        if self.loader.exists(&descriptor.artifact_location) {
            return Ok(());
        }
        Err(ForecastError::InvalidDescriptor {
            name: descriptor.name.clone(),
            reason: format!("artifact not reachable at {}", descriptor.artifact_location),
        })
    }

    /// Inserts or overwrites by name and bumps `updated_at`.
    ///
    /// Callers holding a model cache must refresh the entry for this name.
    pub async fn register(&self, mut descriptor: ModelDescriptor) -> ForecastResult<ModelDescriptor> {
        descriptor.validate()?;
        self.ensure_reachable(&descriptor)?;

        let mut models = self.models.write().await;

        // Strictly increasing per name, even if the wall clock is coarse
        let now = Utc::now();
        descriptor.updated_at = match models.get(&descriptor.name) {
            Some(prev) if prev.updated_at >= now => prev.updated_at + Duration::nanoseconds(1),
            _ => now,
        };

        self.write_through(&descriptor).await?;

        let replaced = models
            .insert(descriptor.name.clone(), descriptor.clone())
            .is_some();
        info!(
            "ModelRegistry: {} '{}' ({}, horizons {:?})",
            if replaced { "re-registered" } else { "registered" },
            descriptor.name,
            descriptor.model_type,
            descriptor.horizons()
        );
        Ok(descriptor)
    }

    /// Active descriptor for `name`. Missing and inactive are indistinguishable.
    pub async fn get(&self, name: &str) -> ForecastResult<ModelDescriptor> {
        let models = self.models.read().await;
        match models.get(name) {
            Some(d) if d.is_active => Ok(d.clone()),
            Some(_) => {
                debug!("ModelRegistry: '{}' is inactive", name);
                Err(ForecastError::ModelNotFound {
                    name: name.to_string(),
                })
            }
            None => Err(ForecastError::ModelNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Descriptors sorted by name.
    pub async fn list(&self, include_inactive: bool) -> Vec<ModelDescriptor> {
        let models = self.models.read().await;
        models
            .values()
            .filter(|d| include_inactive || d.is_active)
            .cloned()
            .collect()
    }

    /// Marks `name` inactive. The descriptor is kept.
    pub async fn deactivate(&self, name: &str) -> ForecastResult<ModelDescriptor> {
        let mut models = self.models.write().await;
        let Some(current) = models.get(name) else {
            return Err(ForecastError::ModelNotFound {
                name: name.to_string(),
            });
        };
        if !current.is_active {
            return Ok(current.clone());
        }

        let mut updated = current.clone();
        updated.is_active = false;
        let now = Utc::now();
        updated.updated_at = if current.updated_at >= now {
            current.updated_at + Duration::nanoseconds(1)
        } else {
            now
        };

        self.write_through(&updated).await?;
        models.insert(name.to_string(), updated.clone());
        info!("ModelRegistry: deactivated '{}'", name);
        Ok(updated)
    }

    async fn write_through(&self, descriptor: &ModelDescriptor) -> ForecastResult<()> {
        if let Some(repo) = &self.repository {
            repo.save(descriptor)
                .await
                .map_err(|e| ForecastError::RegistryStorage {
                    reason: format!("failed to save '{}': {}", descriptor.name, e),
                })?;
        }
        Ok(())
    }
}
