// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runnable pipeline: a per-request materialisation of a definition
//!
//! A `Pipeline` owns every runtime node plus the definition unload guard
//! it was created under; the guard is released when the pipeline is
//! dropped, which is what lets reloads drain in-flight requests.

use std::collections::HashMap;

use crate::core::definition::DefinitionUnloadGuard;
use crate::core::error::{PipelineError, Result};
use crate::core::graph::MappingList;
use crate::core::runtime::nodes::RuntimeNode;

pub type NodeMap = HashMap<String, RuntimeNode>;

pub struct Pipeline {
    name: String,
    entry_name: String,
    exit_name: String,
    nodes: NodeMap,
    _guard: DefinitionUnloadGuard,
}

impl Pipeline {
    pub(crate) fn new(
        name: impl Into<String>,
        entry_name: impl Into<String>,
        exit_name: impl Into<String>,
        guard: DefinitionUnloadGuard,
    ) -> Self {
        Self {
            name: name.into(),
            entry_name: entry_name.into(),
            exit_name: exit_name.into(),
            nodes: NodeMap::new(),
            _guard: guard,
        }
    }

    /// Transfer ownership of a node into the pipeline.
    pub fn push(&mut self, node: RuntimeNode) {
        self.nodes.insert(node.name().to_string(), node);
    }

    /// Wire a `dependency → dependant` pair, recording the mapping on both
    /// ends.
    pub fn connect(
        nodes: &mut NodeMap,
        dependency: &str,
        dependant: &str,
        mapping: &MappingList,
    ) -> Result<()> {
        {
            let Some(from) = nodes.get_mut(dependency) else {
                return Err(PipelineError::Internal);
            };
            from.links_mut().dependants.push(dependant.to_string());
        }
        let Some(to) = nodes.get_mut(dependant) else {
            return Err(PipelineError::Internal);
        };
        to.links_mut()
            .dependencies
            .push((dependency.to_string(), mapping.clone()));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> Option<&RuntimeNode> {
        self.nodes.get(&self.entry_name)
    }

    pub fn exit(&self) -> Option<&RuntimeNode> {
        self.nodes.get(&self.exit_name)
    }

    pub fn node(&self, name: &str) -> Option<&RuntimeNode> {
        self.nodes.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
