// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Structural and semantic validation of a pipeline graph
//!
//! Validation runs in a fixed, observable order: endpoint cardinality,
//! node-name uniqueness, per-node checks (model resolution, dynamic
//! parameter ban, connection bookkeeping, tensor compatibility), then cycle
//! and connectivity detection. The first violation wins; nothing is
//! mutated on failure.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::error::{PipelineError, Result};
use crate::core::graph::connections::ConnectionMap;
use crate::core::graph::cycles::detect_cycles;
use crate::core::graph::node::{NodeInfo, NodeKind};
use crate::core::models::{ModelInstance, ModelManager, ModelUnloadGuard, ParameterMode};

pub(crate) struct GraphValidator<'a> {
    pipeline_name: &'a str,
    node_infos: &'a [NodeInfo],
    connections: &'a ConnectionMap,
}

impl<'a> GraphValidator<'a> {
    pub fn new(
        pipeline_name: &'a str,
        node_infos: &'a [NodeInfo],
        connections: &'a ConnectionMap,
    ) -> Self {
        Self {
            pipeline_name,
            node_infos,
            connections,
        }
    }

    pub fn validate(&self, manager: &ModelManager) -> Result<()> {
        self.validate_nodes(manager)?;
        detect_cycles(self.pipeline_name, self.node_infos, self.connections)
    }

    fn find_node(&self, name: &str) -> Option<&NodeInfo> {
        self.node_infos.iter().find(|node| node.name == name)
    }

    fn validate_nodes(&self, manager: &ModelManager) -> Result<()> {
        tracing::debug!(pipeline = self.pipeline_name, "validating pipeline nodes");

        let entry_count = self.node_infos.iter().filter(|n| n.is_entry()).count();
        let exit_count = self.node_infos.iter().filter(|n| n.is_exit()).count();

        if entry_count == 0 {
            tracing::error!(pipeline = self.pipeline_name, "pipeline is missing its request node");
            return Err(PipelineError::MissingEntryOrExit);
        }
        if exit_count == 0 {
            tracing::error!(pipeline = self.pipeline_name, "pipeline is missing its response node");
            return Err(PipelineError::MissingEntryOrExit);
        }
        if entry_count > 1 {
            tracing::error!(pipeline = self.pipeline_name, "pipeline has multiple request nodes");
            return Err(PipelineError::MultipleEntryNodes);
        }
        if exit_count > 1 {
            tracing::error!(pipeline = self.pipeline_name, "pipeline has multiple response nodes");
            return Err(PipelineError::MultipleExitNodes);
        }

        for node in self.node_infos {
            let duplicates = self
                .node_infos
                .iter()
                .filter(|other| other.name == node.name)
                .count();
            if duplicates > 1 {
                tracing::error!(pipeline = self.pipeline_name, node = %node.name,
                    "pipeline has multiple nodes with the same name");
                return Err(PipelineError::DuplicateNodeName);
            }

            self.validate_node(manager, node)?;
        }

        Ok(())
    }

    /// Resolve a DL node's instance, pinned against unload.
    fn resolve_dl_instance(
        &self,
        manager: &ModelManager,
        node: &NodeInfo,
    ) -> Result<(Arc<ModelInstance>, ModelUnloadGuard)> {
        let NodeKind::Dl {
            model_name,
            model_version,
            ..
        } = &node.kind
        else {
            return Err(PipelineError::Internal);
        };
        manager
            .model_instance_with_guard(model_name, model_version.unwrap_or(0))
            .map_err(|_| {
                tracing::error!(pipeline = self.pipeline_name, node = %node.name,
                    model = %model_name, version = model_version.unwrap_or(0),
                    "pipeline node refers to a missing model");
                PipelineError::NodeReferringToMissingModel
            })
    }

    /// Check every connection entering `dependant`, in declaration order.
    fn validate_node(&self, manager: &ModelManager, dependant: &NodeInfo) -> Result<()> {
        tracing::debug!(pipeline = self.pipeline_name, node = %dependant.name,
            "validating node");

        // For DL dependants, resolve the backing instance and seed the set
        // of inputs that must each be fed exactly once.
        let mut dependant_instance: Option<(Arc<ModelInstance>, ModelUnloadGuard)> = None;
        let mut remaining_inputs: HashSet<String> = HashSet::new();
        if dependant.is_dl() {
            let resolved = self.resolve_dl_instance(manager, dependant)?;

            let config = resolved.0.config();
            if config.batching_mode == ParameterMode::Auto {
                tracing::error!(pipeline = self.pipeline_name, node = %dependant.name,
                    "node uses a model with dynamic batch size, which is forbidden in pipelines");
                return Err(PipelineError::ForbiddenDynamicParameter);
            }
            if config.has_dynamic_shape() {
                tracing::error!(pipeline = self.pipeline_name, node = %dependant.name,
                    "node uses a model with dynamic shape, which is forbidden in pipelines");
                return Err(PipelineError::ForbiddenDynamicParameter);
            }

            remaining_inputs = resolved.0.inputs_info().keys().cloned().collect();
            dependant_instance = Some(resolved);
        }

        let Some(incoming) = self.connections.get(&dependant.name) else {
            return self.check_all_inputs_connected(dependant, &remaining_inputs);
        };

        for (dependency_name, mapping) in incoming {
            // Entry nodes may appear as dependants only through declared
            // edges with no data flow.
            if dependant.is_entry() {
                if !mapping.is_empty() {
                    return Err(PipelineError::Internal);
                }
                continue;
            }

            let Some(dependency) = self.find_node(dependency_name) else {
                tracing::error!(pipeline = self.pipeline_name, node = %dependant.name,
                    dependency = %dependency_name,
                    "node is connected to a missing dependency node");
                return Err(PipelineError::NodeReferringToMissingNode);
            };

            // The response node cannot feed anything.
            if dependency.is_exit() {
                return Err(PipelineError::Internal);
            }

            let mut dependency_instance: Option<(Arc<ModelInstance>, ModelUnloadGuard)> = None;
            if dependency.is_dl() {
                dependency_instance = Some(self.resolve_dl_instance(manager, dependency)?);
            }

            for pair in mapping {
                // A DL dependant consumes each model input from exactly one
                // source; an unknown or already consumed name is rejected.
                if dependant.is_dl() && !remaining_inputs.remove(&pair.real_name) {
                    tracing::error!(pipeline = self.pipeline_name, node = %dependant.name,
                        input = %pair.real_name,
                        "node model has no input with this name, or it is already connected");
                    return Err(PipelineError::ConnectionToMissingNodeInput);
                }

                let Some(resolved_output) = dependency
                    .output_aliases()
                    .and_then(|aliases| aliases.get(&pair.alias))
                else {
                    tracing::error!(pipeline = self.pipeline_name,
                        dependency = %dependency.name, alias = %pair.alias,
                        node = %dependant.name,
                        "dependency node does not produce this data item");
                    return Err(PipelineError::NodeReferringToMissingDataSource);
                };

                if let Some((dependency_model, _)) = &dependency_instance {
                    if !dependency_model.outputs_info().contains_key(resolved_output) {
                        tracing::error!(pipeline = self.pipeline_name,
                            dependency = %dependency.name, output = %resolved_output,
                            "dependency model has no such output");
                        return Err(PipelineError::NodeReferringToMissingModelOutput);
                    }
                }

                // Request-fed inputs must be declared as pipeline inputs.
                if dependant.is_dl() && dependency.is_entry() {
                    let declared = dependency
                        .output_aliases()
                        .is_some_and(|inputs| inputs.contains_key(&pair.alias));
                    if !declared {
                        tracing::error!(pipeline = self.pipeline_name,
                            input = %pair.alias, node = %dependant.name,
                            "pipeline input is not declared");
                        return Err(PipelineError::NodeReferringToMissingDataSource);
                    }
                }

                if let (Some((dependant_model, _)), Some((dependency_model, _))) =
                    (&dependant_instance, &dependency_instance)
                {
                    let (Some(tensor_input), Some(tensor_output)) = (
                        dependant_model.inputs_info().get(&pair.real_name),
                        dependency_model.outputs_info().get(resolved_output),
                    ) else {
                        return Err(PipelineError::Internal);
                    };
                    if tensor_input.shape != tensor_output.shape {
                        tracing::error!(pipeline = self.pipeline_name,
                            node = %dependant.name, input = %pair.real_name,
                            input_shape = %tensor_input.shape_string(),
                            dependency = %dependency.name, output = %resolved_output,
                            output_shape = %tensor_output.shape_string(),
                            "shape mismatch between connected nodes");
                        return Err(PipelineError::ShapeMismatch);
                    }
                    if tensor_input.precision != tensor_output.precision {
                        tracing::error!(pipeline = self.pipeline_name,
                            node = %dependant.name, input = %pair.real_name,
                            input_precision = tensor_input.precision.as_str(),
                            dependency = %dependency.name, output = %resolved_output,
                            output_precision = tensor_output.precision.as_str(),
                            "precision mismatch between connected nodes");
                        return Err(PipelineError::PrecisionMismatch);
                    }
                }
            }
        }

        self.check_all_inputs_connected(dependant, &remaining_inputs)
    }

    fn check_all_inputs_connected(
        &self,
        dependant: &NodeInfo,
        remaining_inputs: &HashSet<String>,
    ) -> Result<()> {
        if dependant.is_dl() && !remaining_inputs.is_empty() {
            let unconnected: Vec<&str> = remaining_inputs.iter().map(String::as_str).collect();
            tracing::error!(pipeline = self.pipeline_name, node = %dependant.name,
                inputs = unconnected.join(", "),
                "node has model inputs not connected to any data source");
            return Err(PipelineError::NotAllInputsConnected);
        }
        Ok(())
    }
}
