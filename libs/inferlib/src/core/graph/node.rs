// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::models::ModelVersion;

/// Reserved name of the synthesized request-entry node.
pub const ENTRY_NODE_NAME: &str = "request";

/// Reserved name of the synthesized response-exit node.
pub const EXIT_NODE_NAME: &str = "response";

/// Kind token accepted for model nodes in declarative configuration.
pub const DL_NODE_CONFIG_TYPE: &str = "DL";

/// Mapping from externally visible alias to the producing node's own name
/// for that value. For entry nodes alias and real name coincide, so the map
/// doubles as the set of declared pipeline inputs.
pub type AliasMap = HashMap<String, String>;

/// What a node in the pipeline graph does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    /// Request source; `inputs` enumerates the pipeline's input names.
    Entry { inputs: AliasMap },
    /// Deep-learning inference step backed by a managed model.
    Dl {
        model_name: String,
        /// Absent means "default version as resolved by the manager".
        model_version: Option<ModelVersion>,
        output_aliases: AliasMap,
    },
    /// Response sink; consumes connections only.
    Exit,
}

/// Immutable descriptor of a node in the pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl NodeInfo {
    /// Entry node declaring the given pipeline input names.
    pub fn entry<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs = inputs
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), name)
            })
            .collect();
        Self {
            name: ENTRY_NODE_NAME.to_string(),
            kind: NodeKind::Entry { inputs },
        }
    }

    pub fn dl(
        name: impl Into<String>,
        model_name: impl Into<String>,
        model_version: Option<ModelVersion>,
        output_aliases: AliasMap,
    ) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Dl {
                model_name: model_name.into(),
                model_version,
                output_aliases,
            },
        }
    }

    pub fn exit() -> Self {
        Self {
            name: EXIT_NODE_NAME.to_string(),
            kind: NodeKind::Exit,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, NodeKind::Entry { .. })
    }

    pub fn is_dl(&self) -> bool {
        matches!(self.kind, NodeKind::Dl { .. })
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, NodeKind::Exit)
    }

    /// Names this node offers to its dependants. `None` for exit nodes.
    pub fn output_aliases(&self) -> Option<&AliasMap> {
        match &self.kind {
            NodeKind::Entry { inputs } => Some(inputs),
            NodeKind::Dl { output_aliases, .. } => Some(output_aliases),
            NodeKind::Exit => None,
        }
    }

    /// Subscription key for DL nodes: `(model_name, version or 0)`.
    pub fn subscription_key(&self) -> Option<(String, ModelVersion)> {
        match &self.kind {
            NodeKind::Dl {
                model_name,
                model_version,
                ..
            } => Some((model_name.clone(), model_version.unwrap_or(0))),
            _ => None,
        }
    }
}

/// Build an alias map from `(alias, real_name)` pairs.
pub fn alias_map<const N: usize>(pairs: [(&str, &str); N]) -> AliasMap {
    pairs
        .into_iter()
        .map(|(alias, real)| (alias.to_string(), real.to_string()))
        .collect()
}
