//! Viewport synchronizer: the single writer of the scene's view transform.
//!
//! The store's viewport is the source of truth. Pan and zoom requests mutate
//! the store; the engine turns each `ViewportChanged` notification into one
//! high-priority frame task, and that task calls [`ViewportSync::apply`].
//! Nothing else holds the [`ViewCapability`], so nothing else can move the
//! camera.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use crate::scene::{LayerKind, SceneGraph, ViewCapability};
use crate::viewport::Viewport;

#[derive(Debug)]
pub struct ViewportSync {
    capability: ViewCapability,
    applied: Option<Viewport>,
    applications: usize,
}

impl Default for ViewportSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportSync {
    #[must_use]
    pub fn new() -> Self {
        Self { capability: ViewCapability::new(), applied: None, applications: 0 }
    }

    /// Write `viewport` into the scene and repaint every layer.
    pub fn apply(&mut self, viewport: Viewport, scene: &mut SceneGraph) {
        scene.set_view_transform(&self.capability, viewport.to_affine());
        for kind in LayerKind::ALL {
            scene.request_repaint(kind);
        }
        self.applied = Some(viewport);
        self.applications += 1;
        tracing::debug!(x = viewport.x, y = viewport.y, scale = viewport.scale, "viewport applied");
    }

    /// The viewport last written to the scene.
    #[must_use]
    pub fn applied(&self) -> Option<Viewport> {
        self.applied
    }

    /// Number of times [`apply`](Self::apply) ran.
    #[must_use]
    pub fn applications(&self) -> usize {
        self.applications
    }
}
