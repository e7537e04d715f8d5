use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::ModelArtifact;
use crate::error::ModelError;

/// Shared, lazily loaded global model.
///
/// The artifact is decoded outside the lock and published with a single
/// write, so readers see either no model or a complete one. A failed load
/// leaves the slot empty and is retried on the next access.
#[derive(Debug)]
pub struct ModelHandle {
    path: Option<PathBuf>,
    slot: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ModelHandle {
    /// Handle that loads from `path` on first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            slot: RwLock::new(None),
        }
    }

    /// Handle that never has a model
    pub fn disabled() -> Self {
        Self {
            path: None,
            slot: RwLock::new(None),
        }
    }

    /// Handle pre-populated with an in-memory artifact
    pub fn with_artifact(artifact: ModelArtifact) -> Self {
        Self {
            path: None,
            slot: RwLock::new(Some(Arc::new(artifact))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn current(&self) -> Option<Arc<ModelArtifact>> {
        match self.slot.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, artifact: Arc<ModelArtifact>) {
        match self.slot.write() {
            Ok(mut slot) => *slot = Some(artifact),
            Err(poisoned) => *poisoned.into_inner() = Some(artifact),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// The current artifact, attempting a load when none is published yet
    pub fn get(&self) -> Option<Arc<ModelArtifact>> {
        if let Some(artifact) = self.current() {
            return Some(artifact);
        }
        self.try_load()
    }

    /// Load from disk and publish; failures are logged and yield `None`
    pub fn try_load(&self) -> Option<Arc<ModelArtifact>> {
        let path = self.path.as_deref()?;
        match ModelArtifact::load(path) {
            Ok(artifact) => {
                tracing::info!(
                    path = %path.display(),
                    version = artifact.version,
                    features = artifact.feature_order.len(),
                    rows = artifact.row_count,
                    "Loaded global model"
                );
                let artifact = Arc::new(artifact);
                self.publish(Arc::clone(&artifact));
                Some(artifact)
            }
            Err(ModelError::NotFound { path }) => {
                tracing::info!(path = %path.display(), "No global model artifact, continuing without it");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load global model");
                None
            }
        }
    }

    /// Replace the published artifact with a fresh load. In-flight readers keep
    /// the artifact they already hold. Returns whether a new model was published.
    pub fn reload(&self) -> bool {
        self.try_load().is_some()
    }
}
