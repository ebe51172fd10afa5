// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One value handed across an edge: the dependency produces it under
/// `alias`, the dependant consumes it under `real_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasMapping {
    pub alias: String,
    pub real_name: String,
}

impl AliasMapping {
    pub fn new(alias: impl Into<String>, real_name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            real_name: real_name.into(),
        }
    }
}

/// Ordered data flow of a single edge. Empty means "declared edge with no
/// data flow".
pub type MappingList = Vec<AliasMapping>;

/// Edges of the pipeline graph, stored transposed: keyed by dependant, each
/// row maps a dependency node to the values it feeds into the dependant.
/// The cycle detector walks this orientation directly.
pub type ConnectionMap = HashMap<String, HashMap<String, MappingList>>;

/// Append a mapping to the `dependant ← dependency` edge, creating it when
/// absent.
pub fn insert_connection(
    connections: &mut ConnectionMap,
    dependant: &str,
    dependency: &str,
    mapping: AliasMapping,
) {
    connections
        .entry(dependant.to_string())
        .or_default()
        .entry(dependency.to_string())
        .or_default()
        .push(mapping);
}

/// Declare a `dependant ← dependency` edge without any data flow.
pub fn insert_empty_connection(connections: &mut ConnectionMap, dependant: &str, dependency: &str) {
    connections
        .entry(dependant.to_string())
        .or_default()
        .entry(dependency.to_string())
        .or_default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_connection_groups_by_edge() {
        let mut connections = ConnectionMap::new();
        insert_connection(&mut connections, "d1", "request", AliasMapping::new("a", "a"));
        insert_connection(&mut connections, "d1", "request", AliasMapping::new("b", "b"));
        insert_connection(&mut connections, "response", "d1", AliasMapping::new("out", "out"));

        assert_eq!(connections["d1"]["request"].len(), 2);
        assert_eq!(connections["response"]["d1"].len(), 1);
    }

    #[test]
    fn test_empty_connection_keeps_edge() {
        let mut connections = ConnectionMap::new();
        insert_empty_connection(&mut connections, "d1", "request");
        assert!(connections["d1"]["request"].is_empty());
    }
}
