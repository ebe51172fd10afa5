// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control-plane events emitted by pipeline definitions
//!
//! Model reloads notify their subscribed pipelines asynchronously; the
//! definition records the fact and forwards an event on this channel so the
//! owning control loop can schedule a revalidation. Dispatch is
//! fire-and-forget: a missing or full receiver never blocks the notifier.

use crate::core::error::PipelineError;
use crate::core::models::ModelVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A model or model instance this pipeline depends on changed.
    DependencyChanged {
        pipeline: String,
        model_name: String,
        model_version: ModelVersion,
    },
    /// The definition validated successfully and became available.
    ValidationPassed { pipeline: String },
    /// Validation failed; the definition stays in loading state.
    ValidationFailed {
        pipeline: String,
        error: PipelineError,
    },
    /// The definition was retired and accepts no further operations.
    Retired { pipeline: String },
}

pub type PipelineEventSender = crossbeam_channel::Sender<PipelineEvent>;
pub type PipelineEventReceiver = crossbeam_channel::Receiver<PipelineEvent>;

/// Create an unbounded control-plane event channel.
pub fn pipeline_event_channel() -> (PipelineEventSender, PipelineEventReceiver) {
    crossbeam_channel::unbounded()
}
