// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Weak-reference subscriber lists for model change notification
//!
//! Models and model instances notify the pipelines that reference them when
//! they reload or retire. The list stores non-owning handles: a model never
//! keeps a pipeline alive, and a dropped listener is cleaned up on the next
//! notify instead of requiring an explicit unsubscribe.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::models::ModelVersion;

/// Identity of the dependency that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyChange {
    pub model_name: String,
    /// `0` means the change concerns the model's default version.
    pub model_version: ModelVersion,
}

/// Receives change notifications from subscribed models.
pub trait DependencyChangeListener: Send + Sync {
    /// Name used in subscription log lines.
    fn listener_name(&self) -> &str;

    /// Called when a subscribed model or instance reloads or retires.
    ///
    /// Runs on the notifier's thread; implementations must not block.
    fn on_dependency_changed(&self, change: &DependencyChange);
}

/// List of weak listener references with identity-based removal.
#[derive(Default)]
pub struct SubscriberList {
    listeners: Mutex<Vec<Weak<dyn DependencyChangeListener>>>,
}

// Identity is the data pointer only; vtable pointers are not stable across
// codegen units.
fn same_listener(a: &Weak<dyn DependencyChangeListener>, b: &Weak<dyn DependencyChangeListener>) -> bool {
    std::ptr::addr_eq(a.as_ptr(), b.as_ptr())
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: &Arc<dyn DependencyChangeListener>) {
        let weak = Arc::downgrade(listener);
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|existing| same_listener(existing, &weak)) {
            return;
        }
        listeners.push(weak);
    }

    pub fn unsubscribe(&self, listener: &Arc<dyn DependencyChangeListener>) {
        let weak = Arc::downgrade(listener);
        self.listeners
            .lock()
            .retain(|existing| !same_listener(existing, &weak));
    }

    /// Fan the change out to all live listeners, dropping dead references.
    pub fn notify(&self, change: &DependencyChange) {
        let live: Vec<Arc<dyn DependencyChangeListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            tracing::debug!(
                listener = listener.listener_name(),
                model = %change.model_name,
                version = change.model_version,
                "notifying subscriber of dependency change"
            );
            listener.on_dependency_changed(change);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
