//! Versioned model registry shared by the orchestrator, scheduler and API.
//!
//! The catalog is loaded lazily on first access, exactly once. Readers take the
//! shared lock; loading and active-version changes take the exclusive lock.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::params::{
    default_catalog, minimal_model, CalculationStrategy, ModelVersion, DEFAULT_MODEL_VERSION,
};

/// Tolerance on the sum of per-game recency weights.
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

struct RegistryInner {
    initialized: bool,
    /// Models loaded on first access; `None` means the built-in catalog
    seed: Option<Vec<ModelVersion>>,
    models: Vec<ModelVersion>,
    active_id: i64,
}

impl ModelRegistry {
    /// Registry over the built-in catalog with `active_id` as the active version.
    pub fn new(active_id: i64) -> Self {
        Self::build(None, active_id)
    }

    /// Registry over an explicit model list.
    pub fn with_models(models: Vec<ModelVersion>, active_id: i64) -> Self {
        Self::build(Some(models), active_id)
    }

    fn build(seed: Option<Vec<ModelVersion>>, active_id: i64) -> Self {
        ModelRegistry {
            inner: Arc::new(RwLock::new(RegistryInner {
                initialized: false,
                seed,
                models: Vec::new(),
                active_id,
            })),
        }
    }

    async fn ensure_loaded(&self) {
        if self.inner.read().await.initialized {
            return;
        }
        let mut inner = self.inner.write().await;
        if inner.initialized {
            return;
        }

        let mut models = inner.seed.take().unwrap_or_else(default_catalog);
        for model in &mut models {
            model.active = model.id == inner.active_id;
            check_recency_weights(model);
        }
        if !models.iter().any(|m| m.id == inner.active_id) {
            warn!(
                "Active model version {} is not registered; falling back to version {}",
                inner.active_id, DEFAULT_MODEL_VERSION
            );
        }

        info!("Loaded {} model versions (active: {})", models.len(), inner.active_id);
        inner.models = models;
        inner.initialized = true;
    }

    /// The requested version, else the active one, else the default, else a
    /// hard-coded minimal model. Never fails.
    pub async fn get_model_version(&self, id: i64) -> ModelVersion {
        self.ensure_loaded().await;
        let inner = self.inner.read().await;

        [id, inner.active_id, DEFAULT_MODEL_VERSION]
            .iter()
            .find_map(|wanted| inner.models.iter().find(|m| m.id == *wanted))
            .cloned()
            .unwrap_or_else(minimal_model)
    }

    pub async fn active_model(&self) -> ModelVersion {
        let id = self.active_version().await;
        self.get_model_version(id).await
    }

    pub async fn active_version(&self) -> i64 {
        self.ensure_loaded().await;
        self.inner.read().await.active_id
    }

    pub async fn set_active_version(&self, id: i64) {
        self.ensure_loaded().await;
        let mut inner = self.inner.write().await;
        if !inner.models.iter().any(|m| m.id == id) {
            warn!("Activating unregistered model version {}", id);
        }
        inner.active_id = id;
        for model in &mut inner.models {
            model.active = model.id == id;
        }
        info!("Active model version set to {}", id);
    }

    /// Snapshot of every registered version.
    pub async fn all_models(&self) -> Vec<ModelVersion> {
        self.ensure_loaded().await;
        self.inner.read().await.models.clone()
    }
}

fn check_recency_weights(model: &ModelVersion) {
    if model.strategy != CalculationStrategy::WeightedRecency {
        return;
    }
    let sum = model.parameters.recency_weight_sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        warn!(
            "Model {} ({}) recency weights sum to {:.3}; predictions use the normalized weighted mean",
            model.id, model.name, sum
        );
    }
}
