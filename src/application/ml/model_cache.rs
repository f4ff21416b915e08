use crate::application::ml::artifact::ArtifactLoader;
use crate::application::ml::predictor::ForecastModel;
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::ml::model_descriptor::{FeatureConfig, ModelDescriptor};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// A deserialized artifact together with the descriptor state it was loaded for.
pub struct CachedArtifact {
    pub model_name: String,
    pub model_type: String,
    pub model: Arc<dyn ForecastModel>,
    pub feature_config: FeatureConfig,
    pub updated_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<Arc<CachedArtifact>>>>;

/// Lazily loaded artifacts, one slot per model name.
///
/// Each slot has its own lock, so a slow load blocks only callers of the
/// same model. Entries are unbounded; the registry holds tens of models.
pub struct ModelCache {
    loader: Arc<dyn ArtifactLoader>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Returns the artifact for `descriptor`, loading it if the cached entry is
    /// missing or was loaded for a different `updated_at`.
    ///
    /// Concurrent callers for the same name wait on one load. A failed load
    /// leaves the slot empty so the next caller retries.
    pub async fn load(&self, descriptor: &ModelDescriptor) -> ForecastResult<Arc<CachedArtifact>> {
        let slot = self.slot(&descriptor.name).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref()
            && cached.updated_at == descriptor.updated_at
        {
            debug!("ModelCache: hit for '{}'", descriptor.name);
            return Ok(cached.clone());
        }

        let model = self.load_checked(descriptor).await?;
        let artifact = self.entry_for(descriptor, model);
        *entry = Some(artifact.clone());

        info!(
            "ModelCache: loaded '{}' ({}) from {}",
            descriptor.name,
            artifact.model.family(),
            descriptor.artifact_location
        );
        Ok(artifact)
    }

    /// Loads and shape-checks the artifact for `descriptor` without caching it.
    pub async fn verify(&self, descriptor: &ModelDescriptor) -> ForecastResult<Arc<dyn ForecastModel>> {
        self.load_checked(descriptor).await
    }

    /// Installs a model already verified for `descriptor`, replacing any entry.
    pub async fn insert(
        &self,
        descriptor: &ModelDescriptor,
        model: Arc<dyn ForecastModel>,
    ) -> Arc<CachedArtifact> {
        let artifact = self.entry_for(descriptor, model);
        let slot = self.slot(&descriptor.name).await;
        *slot.lock().await = Some(artifact.clone());
        debug!("ModelCache: installed '{}'", descriptor.name);
        artifact
    }

    fn entry_for(&self, descriptor: &ModelDescriptor, model: Arc<dyn ForecastModel>) -> Arc<CachedArtifact> {
        Arc::new(CachedArtifact {
            model_name: descriptor.name.clone(),
            model_type: descriptor.model_type.clone(),
            model,
            feature_config: descriptor.feature_config.clone(),
            updated_at: descriptor.updated_at,
            loaded_at: Utc::now(),
        })
    }

    async fn load_checked(&self, descriptor: &ModelDescriptor) -> ForecastResult<Arc<dyn ForecastModel>> {
        let load_error = |reason: String| ForecastError::ArtifactLoad {
            model: descriptor.name.clone(),
            location: descriptor.artifact_location.clone(),
            reason,
        };

        let loader = self.loader.clone();
        let location = descriptor.artifact_location.clone();
        let model = tokio::task::spawn_blocking(move || loader.load(&location))
            .await
            .map_err(|e| load_error(format!("loader task failed: {}", e)))?
            .map_err(|reason| {
                error!(
                    "ModelCache: failed to load '{}' from {}: {}",
                    descriptor.name, descriptor.artifact_location, reason
                );
                load_error(reason)
            })?;

        for horizon in &descriptor.supported_horizons {
            let expected = descriptor.feature_config.input_width(*horizon);
            match model.input_width(*horizon) {
                Some(width) if width == expected => {}
                Some(width) => {
                    return Err(load_error(format!(
                        "head {}h takes {} features but feature_config declares {}",
                        horizon, width, expected
                    )));
                }
                None => {
                    return Err(load_error(format!(
                        "artifact has no head for declared horizon {}h (has {:?})",
                        horizon,
                        model.horizons()
                    )));
                }
            }
        }
        Ok(model)
    }

    /// Evicts `name`. A load already in flight finishes into a detached slot.
    pub async fn invalidate(&self, name: &str) {
        if self.slots.lock().await.remove(name).is_some() {
            debug!("ModelCache: invalidated '{}'", name);
        }
    }

    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        let n = slots.len();
        slots.clear();
        info!("ModelCache: cleared {} slot(s)", n);
    }

    /// Number of models with a loaded artifact. Slots busy with a load count
    /// as not loaded.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        slots
            .iter()
            .filter(|slot| slot.try_lock().is_ok_and(|entry| entry.is_some()))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
