// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Cycle and connectivity detection on the pipeline graph
//!
//! The connection map stores edges dependant → dependency, i.e. the
//! transpose of the data-flow direction. A graph and its transpose share
//! cycle sets, so the search runs on the stored orientation directly; do
//! not rewrite it against the data-flow direction.

use crate::core::error::{PipelineError, Result};
use crate::core::graph::connections::ConnectionMap;
use crate::core::graph::node::NodeInfo;

/// Iterative depth-first search from the exit node.
///
/// `visited` keeps discovery order and doubles as the visited set;
/// `parents` is the stack of currently open ancestors. A successor that is
/// already visited and still open is a back-edge, i.e. a cycle. Once the
/// search exhausts, every node must have been discovered or the graph has
/// parts the response can never observe.
pub(crate) fn detect_cycles(
    pipeline_name: &str,
    node_infos: &[NodeInfo],
    connections: &ConnectionMap,
) -> Result<()> {
    let Some(exit) = node_infos.iter().find(|node| node.is_exit()) else {
        tracing::error!(pipeline = pipeline_name, "pipeline does not contain a response node");
        return Err(PipelineError::MissingEntryOrExit);
    };

    let mut visited: Vec<&str> = Vec::with_capacity(node_infos.len());
    let mut parents: Vec<&str> = Vec::with_capacity(node_infos.len());
    let mut node_name: &str = &exit.name;
    visited.push(node_name);

    let mut any_unvisited_left = true;
    while any_unvisited_left {
        let mut unvisited_found = false;
        if let Some(row) = connections.get(node_name) {
            for dependency in row.keys() {
                let dependency = dependency.as_str();
                if dependency == node_name {
                    tracing::error!(pipeline = pipeline_name, node = node_name,
                        "node is connected to itself");
                    return Err(PipelineError::CycleFound);
                }

                if !visited.contains(&dependency) {
                    parents.push(node_name);
                    visited.push(dependency);
                    node_name = dependency;
                    unvisited_found = true;
                    break;
                } else if parents.contains(&dependency) {
                    tracing::error!(pipeline = pipeline_name,
                        cycle = parents.join(", "),
                        "pipeline nodes create a cycle");
                    return Err(PipelineError::CycleFound);
                }
            }
        }

        if !unvisited_found {
            match parents.pop() {
                Some(previous) => node_name = previous,
                None => {
                    any_unvisited_left = false;
                    if visited.len() != node_infos.len() {
                        tracing::error!(pipeline = pipeline_name,
                            visited = visited.len(),
                            declared = node_infos.len(),
                            "pipeline has nodes not connected to the response node");
                        return Err(PipelineError::ContainsUnconnectedNodes);
                    }
                }
            }
        }
    }
    Ok(())
}
