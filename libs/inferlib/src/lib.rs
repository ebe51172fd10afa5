//! # inferlib - Pipeline Definitions for Model Serving
//!
//! A pipeline definition composes multiple model inference steps into a
//! directed graph and exposes that graph as a single logical prediction
//! endpoint.
//!
//! ## Architecture
//!
//! ```text
//! inferlib
//!   ├─ core/graph      - node descriptors, connection maps, validation
//!   ├─ core/models     - model manager, instances, change subscriptions
//!   ├─ core/definition - lifecycle + per-request pipeline factory
//!   └─ core/runtime    - runnable pipeline and its entry/DL/exit nodes
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use inferlib::{PipelineDefinition, PipelineGraphFile};
//!
//! let file = PipelineGraphFile::from_json(text)?;
//! let (nodes, connections) = file.build()?;
//! let definition = PipelineDefinition::new(file.name.clone(), nodes, connections);
//! definition.load(&manager)?;
//! let pipeline = definition.create(request, response, &manager)?;
//! ```

// Core module (always included)
pub mod core;

// Re-export core types at crate root
pub use crate::core::{
    alias_map, insert_connection, insert_empty_connection, pipeline_event_channel, AliasMap,
    AliasMapping, AvailabilityState, ConnectionMap, DefinitionUnloadGuard, DependencyChange,
    DependencyChangeListener, DlNode, EntryNode, ExitNode, InferenceRequest, InferenceResponse,
    MappingList, Model, ModelConfig, ModelInstance, ModelManager, ModelUnloadGuard, ModelVersion,
    NodeInfo, NodeKind, ParameterMode, Pipeline, PipelineDefinition, PipelineError, PipelineEvent,
    PipelineGraphFile, Precision, Result, RuntimeNode, Shape, TensorInfo,
};
