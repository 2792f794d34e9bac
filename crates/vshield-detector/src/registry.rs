//! Lazily populated detector cache.
//!
//! One slot exists per catalog model. A slot is filled the first time its
//! model is requested and never emptied afterwards. Filling a slot happens
//! under that slot's own lock, re-checked after the lock is taken, so
//! concurrent first requests for a model construct it exactly once while
//! requests for other models proceed independently. Reads of a filled slot
//! take no lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use vshield_models::{ModelCatalog, ModelId, UnknownModelError};

use crate::detector::{Detector, DetectorFactory};
use crate::error::{DetectorError, DetectorResult};

const DETECTOR_LOADS_TOTAL: &str = "vshield_detector_loads_total";
const DETECTOR_LOAD_FAILURES_TOTAL: &str = "vshield_detector_load_failures_total";
const DETECTOR_LOAD_DURATION_SECONDS: &str = "vshield_detector_load_duration_seconds";

#[derive(Default)]
struct Slot {
    detector: OnceLock<Arc<dyn Detector>>,
    init: Mutex<()>,
}

impl Slot {
    /// Return the cached detector, constructing it first if needed.
    ///
    /// Blocks while another caller constructs the same model.
    fn get_or_load(
        &self,
        factory: &dyn DetectorFactory,
        model: &ModelId,
    ) -> DetectorResult<Arc<dyn Detector>> {
        // The guarded value is (), so a poisoned lock carries no broken state.
        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(detector) = self.detector.get() {
            return Ok(Arc::clone(detector));
        }

        info!(model = %model, "Loading detector");
        let start = Instant::now();

        let detector = match factory.create(model) {
            Ok(detector) => detector,
            Err(e) => {
                counter!(DETECTOR_LOAD_FAILURES_TOTAL, "model" => model.to_string()).increment(1);
                warn!(model = %model, error = %e, "Detector construction failed");
                return Err(e);
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        counter!(DETECTOR_LOADS_TOTAL, "model" => model.to_string()).increment(1);
        histogram!(DETECTOR_LOAD_DURATION_SECONDS, "model" => model.to_string()).record(elapsed);
        info!(model = %model, duration_secs = elapsed, "Detector loaded");

        Ok(Arc::clone(self.detector.get_or_init(|| detector)))
    }
}

/// Process-wide cache of detectors keyed by [`ModelId`].
pub struct DetectorRegistry {
    catalog: ModelCatalog,
    factory: Arc<dyn DetectorFactory>,
    slots: HashMap<ModelId, Arc<Slot>>,
}

impl DetectorRegistry {
    /// Create an empty registry serving the models in `catalog`.
    pub fn new(catalog: ModelCatalog, factory: Arc<dyn DetectorFactory>) -> Self {
        let slots = catalog
            .iter()
            .map(|model| (model.clone(), Arc::new(Slot::default())))
            .collect();

        Self {
            catalog,
            factory,
            slots,
        }
    }

    /// The configured model catalog.
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Resolve a model name and return its detector.
    ///
    /// Unknown names fail before anything is constructed; the error lists the
    /// configured models.
    pub async fn get_detector(&self, model_name: &str) -> DetectorResult<Arc<dyn Detector>> {
        let model = self.catalog.resolve(model_name)?;
        self.get(&model).await
    }

    /// Return the detector for a resolved model, constructing it on first use.
    ///
    /// Construction runs on the blocking pool and completes even if the
    /// caller stops waiting, so its result is never lost.
    pub async fn get(&self, model: &ModelId) -> DetectorResult<Arc<dyn Detector>> {
        let slot = self.slot(model)?;

        if let Some(detector) = slot.detector.get() {
            debug!(model = %model, "Detector cache hit");
            return Ok(Arc::clone(detector));
        }

        let slot = Arc::clone(slot);
        let factory = Arc::clone(&self.factory);
        let model = model.clone();

        tokio::task::spawn_blocking(move || slot.get_or_load(factory.as_ref(), &model))
            .await
            .map_err(|e| DetectorError::internal(format!("Detector construction task failed: {}", e)))?
    }

    /// Whether a detector has been constructed for `model`.
    pub fn is_loaded(&self, model: &ModelId) -> bool {
        self.slots
            .get(model)
            .is_some_and(|slot| slot.detector.get().is_some())
    }

    /// Models with a constructed detector, in catalog order.
    pub fn loaded_models(&self) -> Vec<ModelId> {
        self.catalog
            .iter()
            .filter(|model| self.is_loaded(model))
            .cloned()
            .collect()
    }

    /// Construct every configured detector up front.
    pub async fn preload(&self) -> DetectorResult<()> {
        for model in self.catalog.iter() {
            self.get(model).await?;
        }
        Ok(())
    }

    fn slot(&self, model: &ModelId) -> DetectorResult<&Arc<Slot>> {
        // A ModelId minted by a different catalog may share a name with none of ours.
        self.slots.get(model).ok_or_else(|| {
            DetectorError::UnknownModel(UnknownModelError {
                requested: model.to_string(),
                available: self.catalog.names(),
            })
        })
    }
}
