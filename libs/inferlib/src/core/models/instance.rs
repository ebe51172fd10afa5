// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Model instances: loaded versions of a model with immutable tensor metadata
//!
//! A `ModelInstance` is one loaded `(model, version)` pair. Its input and
//! output metadata never change for the lifetime of the instance; a reload
//! produces a fresh instance and notifies subscribers. Request and
//! validation paths pin an instance against unload through
//! [`ModelInstance::wait_for_loaded`], which hands back a scoped guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, Result};
use crate::core::lifecycle::{AvailabilityState, InFlightCounter, StateTracker};
use crate::core::models::subscribers::{
    DependencyChange, DependencyChangeListener, SubscriberList,
};
use crate::core::tensor::TensorInfo;

/// Model version number; `0` is reserved to mean "default version".
pub type ModelVersion = u64;

/// Whether a model parameter is fixed at load time or adapts per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    #[default]
    Fixed,
    Auto,
}

/// Load-time configuration of a model instance.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    pub batching_mode: ParameterMode,
    /// Shape mode per input name.
    pub shape_modes: HashMap<String, ParameterMode>,
}

impl ModelConfig {
    pub fn fixed() -> Self {
        Self::default()
    }

    pub fn with_auto_batching() -> Self {
        Self {
            batching_mode: ParameterMode::Auto,
            shape_modes: HashMap::new(),
        }
    }

    pub fn with_auto_shape(input: impl Into<String>) -> Self {
        let mut shape_modes = HashMap::new();
        shape_modes.insert(input.into(), ParameterMode::Auto);
        Self {
            batching_mode: ParameterMode::Fixed,
            shape_modes,
        }
    }

    pub fn has_dynamic_shape(&self) -> bool {
        self.shape_modes
            .values()
            .any(|mode| *mode == ParameterMode::Auto)
    }
}

/// One loaded version of a model.
pub struct ModelInstance {
    name: String,
    version: ModelVersion,
    inputs: HashMap<String, TensorInfo>,
    outputs: HashMap<String, TensorInfo>,
    config: ModelConfig,
    status: StateTracker,
    in_flight: InFlightCounter,
    subscribers: SubscriberList,
}

impl ModelInstance {
    pub fn new(
        name: impl Into<String>,
        version: ModelVersion,
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
        config: ModelConfig,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            inputs: inputs.into_iter().map(|t| (t.name.clone(), t)).collect(),
            outputs: outputs.into_iter().map(|t| (t.name.clone(), t)).collect(),
            config,
            status: StateTracker::new(),
            in_flight: InFlightCounter::new(),
            subscribers: SubscriberList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> ModelVersion {
        self.version
    }

    pub fn inputs_info(&self) -> &HashMap<String, TensorInfo> {
        &self.inputs
    }

    pub fn outputs_info(&self) -> &HashMap<String, TensorInfo> {
        &self.outputs
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> AvailabilityState {
        self.status.state()
    }

    /// Mark the instance serveable. Called by the manager on registration.
    pub fn make_available(&self) {
        self.status.notify_validation_passed();
    }

    /// Begin tearing the instance down; pending waiters observe the change.
    pub fn start_unloading(&self) {
        self.status.notify_retire();
    }

    pub fn retire(&self) {
        self.status.notify_retire();
        self.in_flight.wait_until_drained();
        self.status.notify_retired();
    }

    /// Pin the instance against unload.
    ///
    /// Blocks up to `timeout` for the instance to become available. The
    /// returned guard keeps the instance pinned until dropped; it is never
    /// held while waiting.
    pub fn wait_for_loaded(self: &Arc<Self>, timeout: Duration) -> Result<ModelUnloadGuard> {
        let deadline = Instant::now() + timeout;
        let mut guard = ModelUnloadGuard::new(Arc::clone(self));
        loop {
            let state = self.status.state();
            if state == AvailabilityState::Available {
                return Ok(guard);
            }
            drop(guard);
            if state.is_beyond_available() {
                tracing::debug!(model = %self.name, version = self.version,
                    "wait for model ended, instance started unloading");
                return Err(PipelineError::NotLoadedAnymore);
            }
            let state = self.status.wait_while_loading(deadline);
            if state == AvailabilityState::Loading {
                tracing::debug!(model = %self.name, version = self.version,
                    "wait for model ended due to timeout");
                return Err(PipelineError::NotLoadedYet);
            }
            if state.is_beyond_available() {
                return Err(PipelineError::NotLoadedAnymore);
            }
            guard = ModelUnloadGuard::new(Arc::clone(self));
        }
    }

    pub fn subscribe(&self, listener: &Arc<dyn DependencyChangeListener>) {
        self.subscribers.subscribe(listener);
    }

    pub fn unsubscribe(&self, listener: &Arc<dyn DependencyChangeListener>) {
        self.subscribers.unsubscribe(listener);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Tell subscribed pipelines that this instance changed.
    pub fn notify_subscribers(&self) {
        self.subscribers.notify(&DependencyChange {
            model_name: self.name.clone(),
            model_version: self.version,
        });
    }

    pub(crate) fn in_flight(&self) -> &InFlightCounter {
        &self.in_flight
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &self.state())
            .finish()
    }
}

/// Scoped pin preventing instance teardown while alive.
#[derive(Debug)]
pub struct ModelUnloadGuard {
    instance: Arc<ModelInstance>,
}

impl ModelUnloadGuard {
    fn new(instance: Arc<ModelInstance>) -> Self {
        instance.in_flight().acquire();
        Self { instance }
    }
}

impl Drop for ModelUnloadGuard {
    fn drop(&mut self) {
        self.instance.in_flight().release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::Precision;

    fn instance() -> Arc<ModelInstance> {
        Arc::new(ModelInstance::new(
            "resnet",
            1,
            vec![TensorInfo::new("image", vec![1, 3, 224, 224], Precision::Fp32)],
            vec![TensorInfo::new("prob", vec![1, 1000], Precision::Fp32)],
            ModelConfig::fixed(),
        ))
    }

    #[test]
    fn test_wait_for_loaded_before_available_times_out() {
        let instance = instance();
        let err = instance.wait_for_loaded(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, PipelineError::NotLoadedYet);
        assert_eq!(instance.in_flight().active(), 0);
    }

    #[test]
    fn test_wait_for_loaded_pins_available_instance() {
        let instance = instance();
        instance.make_available();
        let guard = instance.wait_for_loaded(Duration::ZERO).expect("available");
        assert_eq!(instance.in_flight().active(), 1);
        drop(guard);
        assert_eq!(instance.in_flight().active(), 0);
    }

    #[test]
    fn test_wait_for_loaded_after_unloading_fails() {
        let instance = instance();
        instance.make_available();
        instance.start_unloading();
        let err = instance.wait_for_loaded(Duration::ZERO).unwrap_err();
        assert_eq!(err, PipelineError::NotLoadedAnymore);
        assert_eq!(instance.in_flight().active(), 0);
    }

    #[test]
    fn test_dynamic_shape_detection() {
        assert!(!ModelConfig::fixed().has_dynamic_shape());
        assert!(ModelConfig::with_auto_shape("image").has_dynamic_shape());
    }
}
