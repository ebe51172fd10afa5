// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline definitions: declared graphs with a serving lifecycle
//!
//! A `PipelineDefinition` owns the declared node list and connection map,
//! keeps subscriptions to every model it references, and materialises a
//! runnable [`Pipeline`] per request. Request threads and the control
//! plane share one definition: readers pin it through an unload guard,
//! the single mutator (reload/retire) waits for those guards to drain
//! before touching content.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::core::error::{PipelineError, Result};
use crate::core::events::{PipelineEvent, PipelineEventSender};
use crate::core::graph::{ConnectionMap, GraphValidator, NodeInfo, NodeKind};
use crate::core::lifecycle::{AvailabilityState, InFlightCounter, StateTracker};
use crate::core::models::{
    DependencyChange, DependencyChangeListener, ModelManager, ModelVersion,
};
use crate::core::runtime::{
    DlNode, EntryNode, ExitNode, InferenceRequest, InferenceResponse, NodeMap, Pipeline,
    RuntimeNode,
};
use crate::core::tensor::TensorInfo;

/// How long `create` waits for the definition to become available.
const DEFAULT_WAIT_FOR_LOADED_TIMEOUT: Duration = Duration::from_millis(500);

/// Named tensor metadata exposed by schema introspection.
pub type TensorInfoMap = std::collections::HashMap<String, TensorInfo>;

#[derive(Default)]
struct GraphContent {
    node_infos: Vec<NodeInfo>,
    connections: ConnectionMap,
}

pub struct PipelineDefinition {
    name: String,
    content: RwLock<GraphContent>,
    status: StateTracker,
    in_flight: InFlightCounter,
    subscriptions: Mutex<HashSet<(String, ModelVersion)>>,
    /// Serialises reload/retire; request paths never take it.
    control: Mutex<()>,
    revalidation_requested: AtomicBool,
    event_tx: Mutex<Option<PipelineEventSender>>,
}

impl PipelineDefinition {
    pub fn new(
        name: impl Into<String>,
        node_infos: Vec<NodeInfo>,
        connections: ConnectionMap,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            content: RwLock::new(GraphContent {
                node_infos,
                connections,
            }),
            status: StateTracker::new(),
            in_flight: InFlightCounter::new(),
            subscriptions: Mutex::new(HashSet::new()),
            control: Mutex::new(()),
            revalidation_requested: AtomicBool::new(false),
            event_tx: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AvailabilityState {
        self.status.state()
    }

    /// Install the control-plane event feed.
    pub fn set_event_sender(&self, sender: PipelineEventSender) {
        *self.event_tx.lock() = Some(sender);
    }

    /// Whether a subscribed model changed since the last validation.
    pub fn needs_revalidation(&self) -> bool {
        self.revalidation_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.active()
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(sender) = self.event_tx.lock().as_ref() {
            let _ = sender.send(event);
        }
    }

    fn as_listener(self: &Arc<Self>) -> Arc<dyn DependencyChangeListener> {
        Arc::clone(self) as Arc<dyn DependencyChangeListener>
    }

    /// Initial load: subscribe to referenced models, then validate.
    pub fn load(self: &Arc<Self>, manager: &ModelManager) -> Result<()> {
        let _control = self.control.lock();
        self.make_subscriptions(manager);
        self.validate(manager)
    }

    /// Validate the declared graph against the manager's current models.
    ///
    /// On success the definition becomes available; on failure it stays in
    /// loading state and the first violation is returned.
    pub fn validate(&self, manager: &ModelManager) -> Result<()> {
        let result = {
            let content = self.content.read();
            GraphValidator::new(&self.name, &content.node_infos, &content.connections)
                .validate(manager)
        };
        match result {
            Ok(()) => {
                self.revalidation_requested.store(false, Ordering::SeqCst);
                self.status.notify_validation_passed();
                self.emit(PipelineEvent::ValidationPassed {
                    pipeline: self.name.clone(),
                });
                tracing::info!(pipeline = %self.name, "pipeline definition validated");
                Ok(())
            }
            Err(error) => {
                self.status.notify_validation_failed();
                self.emit(PipelineEvent::ValidationFailed {
                    pipeline: self.name.clone(),
                    error,
                });
                Err(error)
            }
        }
    }

    /// Replace the declared graph.
    ///
    /// Subscriptions are dropped first, then new content is committed only
    /// once every in-flight request has finished. On validation failure
    /// the definition stays in loading state with the new content in
    /// place.
    pub fn reload(
        self: &Arc<Self>,
        manager: &ModelManager,
        node_infos: Vec<NodeInfo>,
        connections: ConnectionMap,
    ) -> Result<()> {
        let _control = self.control.lock();
        if self.status.state() == AvailabilityState::Retired {
            tracing::warn!(pipeline = %self.name, "reload rejected, definition is retired");
            return Err(PipelineError::NotLoadedAnymore);
        }
        tracing::info!(pipeline = %self.name, "reloading pipeline definition");

        self.reset_subscriptions(manager);
        self.status.notify_load_in_progress();
        self.in_flight.wait_until_drained();

        {
            let mut content = self.content.write();
            content.node_infos = node_infos;
            content.connections = connections;
        }

        self.make_subscriptions(manager);
        self.validate(manager)
    }

    /// Tear the definition down for good. Idempotent.
    pub fn retire(self: &Arc<Self>, manager: &ModelManager) {
        let _control = self.control.lock();
        if self.status.state() == AvailabilityState::Retired {
            return;
        }
        tracing::info!(pipeline = %self.name, "retiring pipeline definition");

        self.reset_subscriptions(manager);
        self.status.notify_retire();
        self.in_flight.wait_until_drained();

        {
            let mut content = self.content.write();
            content.node_infos.clear();
            content.connections.clear();
        }

        self.status.notify_retired();
        self.emit(PipelineEvent::Retired {
            pipeline: self.name.clone(),
        });
    }

    /// Subscribe to every model referenced by a DL node.
    ///
    /// Missing models are logged and skipped; validation diagnoses them
    /// with a precise code afterwards.
    fn make_subscriptions(self: &Arc<Self>, manager: &ModelManager) {
        let listener = self.as_listener();
        let content = self.content.read();
        let mut subscriptions = self.subscriptions.lock();
        for node in &content.node_infos {
            let Some(key) = node.subscription_key() else {
                continue;
            };
            if subscriptions.contains(&key) {
                continue;
            }

            let NodeKind::Dl {
                model_name,
                model_version,
                ..
            } = &node.kind
            else {
                continue;
            };
            let Some(model) = manager.find_model_by_name(model_name) else {
                tracing::warn!(pipeline = %self.name, model = %model_name,
                    version = model_version.unwrap_or(0),
                    "failed to subscribe to model because it is missing");
                continue;
            };
            match model_version {
                Some(version) => {
                    let Some(instance) = model.instance_by_version(*version) else {
                        tracing::warn!(pipeline = %self.name, model = %model_name,
                            version = *version,
                            "failed to subscribe to model version because it is missing");
                        continue;
                    };
                    tracing::info!(pipeline = %self.name, model = %model_name,
                        version = *version, "subscribing to model version");
                    instance.subscribe(&listener);
                }
                None => {
                    tracing::info!(pipeline = %self.name, model = %model_name,
                        "subscribing to model");
                    model.subscribe(&listener);
                }
            }
            subscriptions.insert(key);
        }
    }

    /// Drop every subscription made by [`make_subscriptions`].
    ///
    /// [`make_subscriptions`]: PipelineDefinition::make_subscriptions
    fn reset_subscriptions(self: &Arc<Self>, manager: &ModelManager) {
        let listener = self.as_listener();
        let mut subscriptions = self.subscriptions.lock();
        for (model_name, version) in subscriptions.drain() {
            let Some(model) = manager.find_model_by_name(&model_name) else {
                continue;
            };
            if version != 0 {
                tracing::info!(pipeline = %self.name, model = %model_name,
                    version = version, "unsubscribing from model version");
                if let Some(instance) = model.instance_by_version(version) {
                    instance.unsubscribe(&listener);
                }
            } else {
                tracing::info!(pipeline = %self.name, model = %model_name,
                    "unsubscribing from model");
                model.unsubscribe(&listener);
            }
        }
    }

    /// Current subscription keys; `0` marks a default-version subscription.
    pub fn subscriptions(&self) -> HashSet<(String, ModelVersion)> {
        self.subscriptions.lock().clone()
    }

    fn acquire_guard(self: &Arc<Self>) -> DefinitionUnloadGuard {
        DefinitionUnloadGuard::new(Arc::clone(self))
    }

    /// Block until the definition is available, returning a guard that
    /// pins it for the caller's request.
    ///
    /// The guard is never held while waiting, so a concurrent reload can
    /// drain and commit; it is re-acquired and the state re-checked after
    /// every wakeup.
    pub fn wait_for_loaded(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<DefinitionUnloadGuard> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.acquire_guard();
        loop {
            let state = self.status.state();
            if state == AvailabilityState::Available {
                tracing::debug!(pipeline = %self.name, "successfully waited for pipeline");
                return Ok(guard);
            }
            drop(guard);
            if state.is_beyond_available() {
                tracing::debug!(pipeline = %self.name,
                    "waiting for pipeline ended since it started unloading");
                return Err(PipelineError::NotLoadedAnymore);
            }

            let state = self.status.wait_while_loading(deadline);
            if state == AvailabilityState::Loading {
                tracing::debug!(pipeline = %self.name,
                    "waiting for pipeline ended due to timeout");
                return Err(PipelineError::NotLoadedYet);
            }
            if state.is_beyond_available() {
                tracing::debug!(pipeline = %self.name,
                    "waiting for pipeline ended since it started unloading");
                return Err(PipelineError::NotLoadedAnymore);
            }
            guard = self.acquire_guard();
        }
    }

    /// Materialise a runnable pipeline from the current graph snapshot.
    ///
    /// The definition guard travels with the returned pipeline and is
    /// released when the pipeline finishes.
    pub fn create(
        self: &Arc<Self>,
        request: InferenceRequest,
        response: InferenceResponse,
        manager: &ModelManager,
    ) -> Result<Pipeline> {
        let guard = self.wait_for_loaded(DEFAULT_WAIT_FOR_LOADED_TIMEOUT)?;

        let content = self.content.read();
        let mut nodes = NodeMap::with_capacity(content.node_infos.len());
        let mut entry_name: Option<String> = None;
        let mut exit_name: Option<String> = None;
        let mut request = Some(request);
        let mut response = Some(response);

        for info in &content.node_infos {
            tracing::debug!(pipeline = %self.name, node = %info.name, "adding pipeline node");
            let node = match &info.kind {
                NodeKind::Entry { .. } => {
                    let Some(request) = request.take() else {
                        return Err(PipelineError::Internal);
                    };
                    entry_name = Some(info.name.clone());
                    RuntimeNode::Entry(EntryNode::new(info.name.as_str(), request))
                }
                NodeKind::Dl {
                    model_name,
                    model_version,
                    output_aliases,
                } => RuntimeNode::Dl(DlNode::new(
                    info.name.as_str(),
                    model_name.as_str(),
                    *model_version,
                    manager.clone(),
                    output_aliases.clone(),
                )),
                NodeKind::Exit => {
                    let Some(response) = response.take() else {
                        return Err(PipelineError::Internal);
                    };
                    exit_name = Some(info.name.clone());
                    RuntimeNode::Exit(ExitNode::new(info.name.as_str(), response))
                }
            };
            nodes.insert(info.name.clone(), node);
        }

        let (Some(entry_name), Some(exit_name)) = (entry_name, exit_name) else {
            return Err(PipelineError::Internal);
        };

        for (dependant, row) in &content.connections {
            for (dependency, mapping) in row {
                tracing::debug!(pipeline = %self.name, from = %dependency, to = %dependant,
                    "connecting pipeline nodes");
                Pipeline::connect(&mut nodes, dependency, dependant, mapping)?;
            }
        }

        let mut pipeline = Pipeline::new(self.name.as_str(), entry_name, exit_name, guard);
        for (_, node) in nodes {
            pipeline.push(node);
        }
        Ok(pipeline)
    }

    /// Aggregate input schema: every value the request node feeds into the
    /// graph, keyed by the externally visible input name.
    ///
    /// Only callable meaningfully on an available definition.
    pub fn get_inputs_info(&self, manager: &ModelManager) -> Result<TensorInfoMap> {
        let content = self.content.read();
        let find = |name: &str| content.node_infos.iter().find(|n| n.name == name);

        let mut inputs_info = TensorInfoMap::new();
        for (dependant_name, row) in &content.connections {
            let Some(dependant) = find(dependant_name) else {
                return Err(PipelineError::Internal);
            };
            for (dependency_name, mapping) in row {
                let Some(dependency) = find(dependency_name) else {
                    return Err(PipelineError::Internal);
                };
                if !dependency.is_entry() {
                    continue;
                }

                match &dependant.kind {
                    NodeKind::Exit => {
                        for pair in mapping {
                            inputs_info
                                .insert(pair.alias.clone(), TensorInfo::unspecified());
                        }
                    }
                    NodeKind::Dl {
                        model_name,
                        model_version,
                        ..
                    } => {
                        let Some(instance) =
                            manager.find_model_instance(model_name, model_version.unwrap_or(0))
                        else {
                            tracing::debug!(pipeline = %self.name, model = %model_name,
                                "model unavailable while fetching pipeline inputs info");
                            return Err(PipelineError::ModelMissing);
                        };
                        let _guard = instance.wait_for_loaded(Duration::ZERO)?;
                        for pair in mapping {
                            let Some(info) = instance.inputs_info().get(&pair.real_name) else {
                                return Err(PipelineError::Internal);
                            };
                            inputs_info.insert(pair.alias.clone(), info.clone());
                        }
                    }
                    // Validation does not allow connections into the entry node.
                    NodeKind::Entry { .. } => {
                        tracing::error!(pipeline = %self.name,
                            "unexpected dependant node kind while fetching inputs info");
                        return Err(PipelineError::Internal);
                    }
                }
            }
        }
        Ok(inputs_info)
    }

    /// Aggregate output schema: every value the response node consumes,
    /// keyed by the pipeline's exposed output name.
    pub fn get_outputs_info(&self, manager: &ModelManager) -> Result<TensorInfoMap> {
        let content = self.content.read();
        let find = |name: &str| content.node_infos.iter().find(|n| n.name == name);

        let mut outputs_info = TensorInfoMap::new();
        for (dependant_name, row) in &content.connections {
            let Some(dependant) = find(dependant_name) else {
                return Err(PipelineError::Internal);
            };
            if !dependant.is_exit() {
                continue;
            }

            for (dependency_name, mapping) in row {
                let Some(dependency) = find(dependency_name) else {
                    return Err(PipelineError::Internal);
                };

                match &dependency.kind {
                    NodeKind::Entry { .. } => {
                        for pair in mapping {
                            outputs_info
                                .insert(pair.real_name.clone(), TensorInfo::unspecified());
                        }
                    }
                    NodeKind::Dl {
                        model_name,
                        model_version,
                        output_aliases,
                    } => {
                        let Some(instance) =
                            manager.find_model_instance(model_name, model_version.unwrap_or(0))
                        else {
                            tracing::debug!(pipeline = %self.name, model = %model_name,
                                "model unavailable while fetching pipeline outputs info");
                            return Err(PipelineError::ModelMissing);
                        };
                        let _guard = instance.wait_for_loaded(Duration::ZERO)?;
                        for pair in mapping {
                            let final_name =
                                output_aliases.get(&pair.alias).unwrap_or(&pair.alias);
                            let Some(info) = instance.outputs_info().get(final_name) else {
                                return Err(PipelineError::Internal);
                            };
                            outputs_info.insert(pair.real_name.clone(), info.clone());
                        }
                    }
                    // Validation does not allow connections out of the exit node.
                    NodeKind::Exit => {
                        tracing::error!(pipeline = %self.name,
                            "unexpected dependency node kind while fetching outputs info");
                        return Err(PipelineError::Internal);
                    }
                }
            }
        }
        Ok(outputs_info)
    }
}

impl DependencyChangeListener for PipelineDefinition {
    fn listener_name(&self) -> &str {
        &self.name
    }

    fn on_dependency_changed(&self, change: &DependencyChange) {
        tracing::info!(pipeline = %self.name, model = %change.model_name,
            version = change.model_version,
            "subscribed model changed, revalidation requested");
        self.revalidation_requested.store(true, Ordering::SeqCst);
        self.emit(PipelineEvent::DependencyChanged {
            pipeline: self.name.clone(),
            model_name: change.model_name.clone(),
            model_version: change.model_version,
        });
    }
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Scoped pin preventing definition teardown while a request uses it.
#[derive(Debug)]
pub struct DefinitionUnloadGuard {
    definition: Arc<PipelineDefinition>,
}

impl DefinitionUnloadGuard {
    fn new(definition: Arc<PipelineDefinition>) -> Self {
        definition.in_flight.acquire();
        Self { definition }
    }
}

impl Drop for DefinitionUnloadGuard {
    fn drop(&mut self) {
        self.definition.in_flight.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::pipeline_event_channel;
    use crate::core::graph::{alias_map, insert_connection, AliasMapping};
    use crate::core::models::{ModelConfig, ModelInstance};
    use crate::core::tensor::Precision;

    fn manager_with_model() -> ModelManager {
        let manager = ModelManager::new();
        manager.register_instance(ModelInstance::new(
            "m1",
            1,
            vec![TensorInfo::new("a", vec![1, 10], Precision::Fp32)],
            vec![TensorInfo::new("b", vec![1, 10], Precision::Fp32)],
            ModelConfig::fixed(),
        ));
        manager
    }

    fn minimal_graph() -> (Vec<NodeInfo>, ConnectionMap) {
        let nodes = vec![
            NodeInfo::entry(["a"]),
            NodeInfo::dl("d1", "m1", Some(1), alias_map([("b", "b")])),
            NodeInfo::exit(),
        ];
        let mut connections = ConnectionMap::new();
        insert_connection(&mut connections, "d1", "request", AliasMapping::new("a", "a"));
        insert_connection(&mut connections, "response", "d1", AliasMapping::new("b", "b"));
        (nodes, connections)
    }

    #[test]
    fn test_load_makes_definition_available() {
        let manager = manager_with_model();
        let (nodes, connections) = minimal_graph();
        let definition = PipelineDefinition::new("p", nodes, connections);

        assert_eq!(definition.state(), AvailabilityState::Loading);
        definition.load(&manager).expect("valid pipeline");
        assert_eq!(definition.state(), AvailabilityState::Available);

        let subscriptions = definition.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert!(subscriptions.contains(&("m1".to_string(), 1)));
    }

    #[test]
    fn test_wait_for_loaded_times_out_before_load() {
        let (nodes, connections) = minimal_graph();
        let definition = PipelineDefinition::new("p", nodes, connections);

        let err = definition
            .wait_for_loaded(Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, PipelineError::NotLoadedYet);
        assert_eq!(definition.in_flight_count(), 0);
    }

    #[test]
    fn test_create_guard_travels_with_pipeline() {
        let manager = manager_with_model();
        let (nodes, connections) = minimal_graph();
        let definition = PipelineDefinition::new("p", nodes, connections);
        definition.load(&manager).expect("valid pipeline");

        let pipeline = definition
            .create(InferenceRequest::default(), InferenceResponse::new(), &manager)
            .expect("create");
        assert_eq!(pipeline.node_count(), 3);
        assert_eq!(definition.in_flight_count(), 1);
        drop(pipeline);
        assert_eq!(definition.in_flight_count(), 0);
    }

    #[test]
    fn test_retire_clears_subscriptions_and_rejects_requests() {
        let manager = manager_with_model();
        let (nodes, connections) = minimal_graph();
        let definition = PipelineDefinition::new("p", nodes, connections);
        definition.load(&manager).expect("valid pipeline");

        let instance = manager.find_model_instance("m1", 1).expect("registered");
        assert_eq!(instance.subscriber_count(), 1);

        definition.retire(&manager);
        assert_eq!(definition.state(), AvailabilityState::Retired);
        assert!(definition.subscriptions().is_empty());
        assert_eq!(instance.subscriber_count(), 0);

        let err = definition.wait_for_loaded(Duration::ZERO).unwrap_err();
        assert_eq!(err, PipelineError::NotLoadedAnymore);
    }

    #[test]
    fn test_dependency_change_requests_revalidation() {
        let manager = manager_with_model();
        let (nodes, connections) = minimal_graph();
        let definition = PipelineDefinition::new("p", nodes, connections);
        let (tx, rx) = pipeline_event_channel();
        definition.set_event_sender(tx);
        definition.load(&manager).expect("valid pipeline");
        assert!(!definition.needs_revalidation());
        // load emits a validation-passed event
        assert_eq!(
            rx.try_recv(),
            Ok(PipelineEvent::ValidationPassed {
                pipeline: "p".to_string()
            })
        );

        let instance = manager.find_model_instance("m1", 1).expect("registered");
        instance.notify_subscribers();

        assert!(definition.needs_revalidation());
        assert_eq!(
            rx.try_recv(),
            Ok(PipelineEvent::DependencyChanged {
                pipeline: "p".to_string(),
                model_name: "m1".to_string(),
                model_version: 1,
            })
        );

        definition.validate(&manager).expect("still valid");
        assert!(!definition.needs_revalidation());
    }

    #[test]
    fn test_retired_definition_rejects_reload() {
        let manager = manager_with_model();
        let (nodes, connections) = minimal_graph();
        let definition = PipelineDefinition::new("p", nodes, connections);
        definition.load(&manager).expect("valid pipeline");
        definition.retire(&manager);

        let (nodes, connections) = minimal_graph();
        assert_eq!(
            definition.reload(&manager, nodes, connections),
            Err(PipelineError::NotLoadedAnymore)
        );
        assert_eq!(definition.state(), AvailabilityState::Retired);
    }

    #[test]
    fn test_default_version_subscription_tracks_whole_model() {
        let manager = manager_with_model();
        let nodes = vec![
            NodeInfo::entry(["a"]),
            NodeInfo::dl("d1", "m1", None, alias_map([("b", "b")])),
            NodeInfo::exit(),
        ];
        let mut connections = ConnectionMap::new();
        insert_connection(&mut connections, "d1", "request", AliasMapping::new("a", "a"));
        insert_connection(&mut connections, "response", "d1", AliasMapping::new("b", "b"));
        let definition = PipelineDefinition::new("p", nodes, connections);
        definition.load(&manager).expect("valid pipeline");

        assert!(definition.subscriptions().contains(&("m1".to_string(), 0)));
        let model = manager.find_model_by_name("m1").expect("registered");
        assert_eq!(model.subscriber_count(), 1);

        definition.retire(&manager);
        assert_eq!(model.subscriber_count(), 0);
    }
}
