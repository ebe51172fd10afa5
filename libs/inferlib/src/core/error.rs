//! Error types for inferlib
//!
//! Every operation in the subsystem returns a status; there are no panics
//! in control flow. Variants carry no payload - the detail that explains a
//! failure goes to the log at the site that detected it.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unsupported node kind in pipeline configuration")]
    WrongNodeKindConfiguration,

    #[error("pipeline is missing its request or response node")]
    MissingEntryOrExit,

    #[error("pipeline has multiple request nodes")]
    MultipleEntryNodes,

    #[error("pipeline has multiple response nodes")]
    MultipleExitNodes,

    #[error("pipeline has multiple nodes with the same name")]
    DuplicateNodeName,

    #[error("pipeline node refers to a missing model")]
    NodeReferringToMissingModel,

    #[error("pipeline node is connected to a missing node")]
    NodeReferringToMissingNode,

    #[error("pipeline node refers to a missing data source")]
    NodeReferringToMissingDataSource,

    #[error("pipeline node refers to a missing model output")]
    NodeReferringToMissingModelOutput,

    #[error("connection refers to a missing or already connected model input")]
    ConnectionToMissingNodeInput,

    #[error("pipeline node has model inputs not connected to any data source")]
    NotAllInputsConnected,

    #[error("pipeline graph contains a cycle")]
    CycleFound,

    #[error("pipeline graph contains nodes not connected to the response node")]
    ContainsUnconnectedNodes,

    #[error("referenced model uses dynamic batch size or dynamic shape")]
    ForbiddenDynamicParameter,

    #[error("tensor shape mismatch between connected nodes")]
    ShapeMismatch,

    #[error("tensor precision mismatch between connected nodes")]
    PrecisionMismatch,

    #[error("model is not available")]
    ModelMissing,

    #[error("version is not loaded yet")]
    NotLoadedYet,

    #[error("version is not loaded anymore")]
    NotLoadedAnymore,

    #[error("internal error")]
    Internal,
}

/// Result type that uses PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
