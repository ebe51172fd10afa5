//! Per-request pipeline materialisation
//!
//! The definition's factory builds these types; execution scheduling is
//! the pipeline runner's concern and lives outside this subsystem.

mod nodes;
mod pipeline;

pub use nodes::{
    DlNode, EntryNode, ExitNode, InferenceRequest, InferenceResponse, NodeLinks, RuntimeNode,
};
pub use pipeline::{NodeMap, Pipeline};
