// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime nodes materialised from a validated pipeline definition
//!
//! These are the per-request counterparts of [`NodeInfo`] descriptors: an
//! entry node wrapping the request, one DL node per inference step, and an
//! exit node wrapping the response. Connection wiring records which node
//! feeds which; scheduling and execution live in the pipeline runner.
//!
//! [`NodeInfo`]: crate::core::graph::NodeInfo

use crate::core::graph::{AliasMap, MappingList};
use crate::core::models::{ModelManager, ModelVersion};

/// Opaque request envelope handed to the entry node.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    payload: serde_json::Value,
}

impl InferenceRequest {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// Opaque response envelope filled through the exit node.
#[derive(Debug, Clone, Default)]
pub struct InferenceResponse {
    payload: serde_json::Value,
}

impl InferenceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: serde_json::Value) {
        self.payload = payload;
    }
}

/// Wiring recorded on each runtime node as connections are applied.
#[derive(Debug, Clone, Default)]
pub struct NodeLinks {
    /// Nodes this node consumes from, with the values each one feeds.
    pub dependencies: Vec<(String, MappingList)>,
    /// Nodes consuming from this node.
    pub dependants: Vec<String>,
}

#[derive(Debug)]
pub struct EntryNode {
    name: String,
    request: InferenceRequest,
    links: NodeLinks,
}

impl EntryNode {
    pub fn new(name: impl Into<String>, request: InferenceRequest) -> Self {
        Self {
            name: name.into(),
            request,
            links: NodeLinks::default(),
        }
    }

    pub fn request(&self) -> &InferenceRequest {
        &self.request
    }
}

#[derive(Debug)]
pub struct ExitNode {
    name: String,
    response: InferenceResponse,
    links: NodeLinks,
}

impl ExitNode {
    pub fn new(name: impl Into<String>, response: InferenceResponse) -> Self {
        Self {
            name: name.into(),
            response,
            links: NodeLinks::default(),
        }
    }

    pub fn response(&self) -> &InferenceResponse {
        &self.response
    }
}

/// Inference step bound to a managed model; resolution happens at
/// execution time through the manager handle.
#[derive(Debug)]
pub struct DlNode {
    name: String,
    model_name: String,
    model_version: Option<ModelVersion>,
    manager: ModelManager,
    output_aliases: AliasMap,
    links: NodeLinks,
}

impl DlNode {
    pub fn new(
        name: impl Into<String>,
        model_name: impl Into<String>,
        model_version: Option<ModelVersion>,
        manager: ModelManager,
        output_aliases: AliasMap,
    ) -> Self {
        Self {
            name: name.into(),
            model_name: model_name.into(),
            model_version,
            manager,
            output_aliases,
            links: NodeLinks::default(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn model_version(&self) -> Option<ModelVersion> {
        self.model_version
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    pub fn output_aliases(&self) -> &AliasMap {
        &self.output_aliases
    }
}

/// A node of a materialised pipeline.
#[derive(Debug)]
pub enum RuntimeNode {
    Entry(EntryNode),
    Dl(DlNode),
    Exit(ExitNode),
}

impl RuntimeNode {
    pub fn name(&self) -> &str {
        match self {
            RuntimeNode::Entry(node) => &node.name,
            RuntimeNode::Dl(node) => &node.name,
            RuntimeNode::Exit(node) => &node.name,
        }
    }

    pub fn links(&self) -> &NodeLinks {
        match self {
            RuntimeNode::Entry(node) => &node.links,
            RuntimeNode::Dl(node) => &node.links,
            RuntimeNode::Exit(node) => &node.links,
        }
    }

    pub(crate) fn links_mut(&mut self) -> &mut NodeLinks {
        match self {
            RuntimeNode::Entry(node) => &mut node.links,
            RuntimeNode::Dl(node) => &mut node.links,
            RuntimeNode::Exit(node) => &mut node.links,
        }
    }
}
