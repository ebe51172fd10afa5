// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Model registry: named models, their versions, and change subscriptions
//!
//! The manager owns every model the serving process knows about and hands
//! out shared handles to their instances. Pipelines subscribe either to a
//! specific instance (pinned version) or to the model as a whole (default
//! version tracking); both paths store weak back-references only.

mod instance;
mod subscribers;

pub use instance::{ModelConfig, ModelInstance, ModelUnloadGuard, ModelVersion, ParameterMode};
pub use subscribers::{DependencyChange, DependencyChangeListener, SubscriberList};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::core::error::{PipelineError, Result};

/// A named model with one or more loaded versions.
pub struct Model {
    name: String,
    versions: RwLock<BTreeMap<ModelVersion, Arc<ModelInstance>>>,
    subscribers: SubscriberList,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: RwLock::new(BTreeMap::new()),
            subscribers: SubscriberList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_version(&self, instance: Arc<ModelInstance>) {
        self.versions.write().insert(instance.version(), instance);
    }

    pub fn remove_version(&self, version: ModelVersion) -> Option<Arc<ModelInstance>> {
        self.versions.write().remove(&version)
    }

    /// Exact version lookup.
    pub fn instance_by_version(&self, version: ModelVersion) -> Option<Arc<ModelInstance>> {
        self.versions.read().get(&version).cloned()
    }

    /// The default version is the highest one registered.
    pub fn default_instance(&self) -> Option<Arc<ModelInstance>> {
        self.versions
            .read()
            .last_key_value()
            .map(|(_, instance)| Arc::clone(instance))
    }

    /// Resolve `version`, where `0` means the default version.
    pub fn resolve_instance(&self, version: ModelVersion) -> Option<Arc<ModelInstance>> {
        if version == 0 {
            self.default_instance()
        } else {
            self.instance_by_version(version)
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

    /// Tell whole-model subscribers that the default version changed.
    pub fn notify_subscribers(&self) {
        self.subscribers.notify(&DependencyChange {
            model_name: self.name.clone(),
            model_version: 0,
        });
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let versions: Vec<ModelVersion> = self.versions.read().keys().copied().collect();
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("versions", &versions)
            .finish()
    }
}

/// Concurrent registry of all models known to the serving process.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone, Default)]
pub struct ModelManager {
    models: Arc<DashMap<String, Arc<Model>>>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance, creating its model entry when absent.
    ///
    /// Registered instances are serveable immediately.
    pub fn register_instance(&self, instance: ModelInstance) -> Arc<ModelInstance> {
        let instance = Arc::new(instance);
        instance.make_available();
        let model = self
            .models
            .entry(instance.name().to_string())
            .or_insert_with(|| Arc::new(Model::new(instance.name())))
            .clone();
        model.add_version(Arc::clone(&instance));
        tracing::info!(model = instance.name(), version = instance.version(),
            "registered model instance");
        instance
    }

    pub fn find_model_by_name(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Find an instance; `version` `0` resolves to the default version.
    pub fn find_model_instance(
        &self,
        name: &str,
        version: ModelVersion,
    ) -> Option<Arc<ModelInstance>> {
        self.find_model_by_name(name)
            .and_then(|model| model.resolve_instance(version))
    }

    /// Find an instance and pin it against unload with a zero-wait guard.
    pub fn model_instance_with_guard(
        &self,
        name: &str,
        version: ModelVersion,
    ) -> Result<(Arc<ModelInstance>, ModelUnloadGuard)> {
        let instance = self
            .find_model_instance(name, version)
            .ok_or(PipelineError::ModelMissing)?;
        let guard = instance.wait_for_loaded(Duration::ZERO)?;
        Ok((instance, guard))
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("models", &self.models.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::{Precision, TensorInfo};

    fn instance(version: ModelVersion) -> ModelInstance {
        ModelInstance::new(
            "resnet",
            version,
            vec![TensorInfo::new("image", vec![1, 3, 224, 224], Precision::Fp32)],
            vec![TensorInfo::new("prob", vec![1, 1000], Precision::Fp32)],
            ModelConfig::fixed(),
        )
    }

    #[test]
    fn test_default_version_is_highest() {
        let manager = ModelManager::new();
        manager.register_instance(instance(1));
        manager.register_instance(instance(3));
        manager.register_instance(instance(2));

        let default = manager.find_model_instance("resnet", 0).expect("default");
        assert_eq!(default.version(), 3);
    }

    #[test]
    fn test_exact_version_lookup() {
        let manager = ModelManager::new();
        manager.register_instance(instance(1));
        manager.register_instance(instance(2));

        assert_eq!(manager.find_model_instance("resnet", 1).map(|i| i.version()), Some(1));
        assert!(manager.find_model_instance("resnet", 9).is_none());
        assert!(manager.find_model_instance("bert", 0).is_none());
    }

    #[test]
    fn test_instance_with_guard_missing_model() {
        let manager = ModelManager::new();
        let err = manager.model_instance_with_guard("resnet", 0).unwrap_err();
        assert_eq!(err, PipelineError::ModelMissing);
    }

    #[test]
    fn test_instance_with_guard_pins_instance() {
        let manager = ModelManager::new();
        let registered = manager.register_instance(instance(1));
        let (found, guard) = manager.model_instance_with_guard("resnet", 1).expect("guarded");
        assert_eq!(found.version(), 1);
        assert_eq!(registered.in_flight().active(), 1);
        drop(guard);
        assert_eq!(registered.in_flight().active(), 0);
    }
}
