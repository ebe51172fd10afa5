//! Pipeline graph model and validation
//!
//! Pure data describing the declared graph, plus the validator and cycle
//! detector that decide whether a declaration is serveable.

mod connections;
mod cycles;
mod node;
mod validation;

pub use connections::{
    insert_connection, insert_empty_connection, AliasMapping, ConnectionMap, MappingList,
};
pub use node::{
    alias_map, AliasMap, NodeInfo, NodeKind, DL_NODE_CONFIG_TYPE, ENTRY_NODE_NAME, EXIT_NODE_NAME,
};

pub(crate) use validation::GraphValidator;
