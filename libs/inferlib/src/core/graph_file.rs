// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Declarative pipeline file format for loading definitions from JSON.
//!
//! Model nodes are identified by local names and reference their data
//! sources as `"node.alias"`; the request entry and response exit nodes are
//! synthesized by the loader under their reserved names.
//!
//! # Example Pipeline File
//!
//! ```json
//! {
//!   "name": "detect-classify",
//!   "inputs": ["image"],
//!   "nodes": [
//!     {
//!       "name": "detector",
//!       "kind": "DL",
//!       "model": "detect",
//!       "version": 1,
//!       "inputs": [ { "input": "image", "source": "request.image" } ],
//!       "outputs": [ { "alias": "boxes", "output": "detection_out" } ]
//!     }
//!   ],
//!   "outputs": [ { "name": "boxes", "source": "detector.boxes" } ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, Result};
use crate::core::graph::{
    insert_connection, AliasMap, AliasMapping, ConnectionMap, NodeInfo, DL_NODE_CONFIG_TYPE,
    EXIT_NODE_NAME,
};

/// Declarative pipeline definition loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineGraphFile {
    /// Pipeline name used for serving and logging.
    pub name: String,

    /// Declared pipeline input names, fed by the request.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Model node definitions.
    pub nodes: Vec<NodeDefinition>,

    /// Pipeline outputs surfaced on the response.
    #[serde(default)]
    pub outputs: Vec<OutputDefinition>,
}

/// A model node in the pipeline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Node name, unique within the pipeline.
    pub name: String,

    /// Node kind token; only `"DL"` is supported.
    pub kind: String,

    /// Name of the served model backing this node.
    pub model: String,

    /// Pinned model version; absent tracks the default version.
    #[serde(default)]
    pub version: Option<u64>,

    /// Values consumed by the node's model inputs.
    #[serde(default)]
    pub inputs: Vec<InputDefinition>,

    /// Aliases this node publishes for its model outputs.
    #[serde(default)]
    pub outputs: Vec<OutputAliasDefinition>,
}

/// One consumed value: `source` is `"node.alias"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDefinition {
    pub input: String,
    pub source: String,
}

/// One published value: `alias` is the externally visible name of the
/// model output named `output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputAliasDefinition {
    pub alias: String,
    pub output: String,
}

/// One pipeline output: `source` is `"node.alias"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub name: String,
    pub source: String,
}

/// Parse `"node.alias"` into components.
fn parse_source_ref(source: &str) -> Result<(&str, &str)> {
    match source.split_once('.') {
        Some((node, alias)) if !node.is_empty() && !alias.is_empty() => Ok((node, alias)),
        _ => {
            tracing::error!(source, "invalid source reference, expected 'node.alias'");
            Err(PipelineError::Internal)
        }
    }
}

impl PipelineGraphFile {
    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            tracing::error!(error = %err, "failed to parse pipeline file");
            PipelineError::Internal
        })
    }

    /// Load from a JSON file path.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            tracing::error!(path = %path.as_ref().display(), error = %err,
                "failed to read pipeline file");
            PipelineError::Internal
        })?;
        Self::from_json(&text)
    }

    /// Build the node list and transposed connection map.
    ///
    /// The request entry and response exit nodes are synthesized here;
    /// declared nodes keep their file order between them.
    pub fn build(&self) -> Result<(Vec<NodeInfo>, ConnectionMap)> {
        let mut node_infos = Vec::with_capacity(self.nodes.len() + 2);
        node_infos.push(NodeInfo::entry(self.inputs.iter().cloned()));

        for node in &self.nodes {
            if node.kind != DL_NODE_CONFIG_TYPE {
                tracing::error!(node = %node.name, kind = %node.kind,
                    "unsupported node kind");
                return Err(PipelineError::WrongNodeKindConfiguration);
            }
            let aliases: AliasMap = node
                .outputs
                .iter()
                .map(|out| (out.alias.clone(), out.output.clone()))
                .collect();
            node_infos.push(NodeInfo::dl(
                node.name.as_str(),
                node.model.as_str(),
                node.version,
                aliases,
            ));
        }

        node_infos.push(NodeInfo::exit());

        let mut connections = ConnectionMap::new();
        for node in &self.nodes {
            for input in &node.inputs {
                let (source_node, source_alias) = parse_source_ref(&input.source)?;
                insert_connection(
                    &mut connections,
                    &node.name,
                    source_node,
                    AliasMapping::new(source_alias, input.input.as_str()),
                );
            }
        }
        for output in &self.outputs {
            let (source_node, source_alias) = parse_source_ref(&output.source)?;
            insert_connection(
                &mut connections,
                EXIT_NODE_NAME,
                source_node,
                AliasMapping::new(source_alias, output.name.as_str()),
            );
        }

        Ok((node_infos, connections))
    }
}
