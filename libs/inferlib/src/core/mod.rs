//! inferlib core: pipeline definitions, validation, and lifecycle
//!
//! This module holds the pipeline-definition subsystem: the declarative
//! graph model, its validator and cycle detector, the subscription fabric
//! that tracks referenced model instances, the lifecycle state machine,
//! and the factory that materialises a runnable [`Pipeline`] per request.

pub mod definition;
pub mod error;
pub mod events;
pub mod graph;
pub mod graph_file;
pub mod lifecycle;
pub mod models;
pub mod runtime;
pub mod tensor;

// Re-export core types
pub use definition::{DefinitionUnloadGuard, PipelineDefinition};
pub use error::{PipelineError, Result};
pub use events::{pipeline_event_channel, PipelineEvent, PipelineEventReceiver, PipelineEventSender};
pub use graph::{
    alias_map, insert_connection, insert_empty_connection, AliasMap, AliasMapping, ConnectionMap,
    MappingList, NodeInfo, NodeKind, DL_NODE_CONFIG_TYPE, ENTRY_NODE_NAME, EXIT_NODE_NAME,
};
pub use graph_file::PipelineGraphFile;
pub use lifecycle::{AvailabilityState, InFlightCounter, StateTracker};
pub use models::{
    DependencyChange, DependencyChangeListener, Model, ModelConfig, ModelInstance, ModelManager,
    ModelUnloadGuard, ModelVersion, ParameterMode,
};
pub use runtime::{
    DlNode, EntryNode, ExitNode, InferenceRequest, InferenceResponse, Pipeline, RuntimeNode,
};
pub use tensor::{Precision, Shape, TensorInfo};
