//! Input layers and the buffers behind them
//!
//! An [`OverlayLayer`] describes one entry of the per-frame layer stack handed to
//! [`PlaneManager::validate_layers`](crate::manager::PlaneManager::validate_layers).
//! The engine only ever borrows layers for the duration of one call; the outcome
//! for each layer is reported back through [`LayerFeedback`] instead of being
//! written into the layer itself.

use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use drm_fourcc::DrmFourcc;

use crate::utils::{Buffer, Physical, Rectangle, Transform};

/// A framebuffer object handle as understood by the display driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framebuffer(pub u32);

/// Access to the scan-out relevant parts of a buffer
///
/// Framebuffer handles are created lazily and owned by the buffer object.
/// Implementations typically keep the handle in interior-mutable state so that a
/// buffer shared between layers only ever creates it once.
pub trait LayerBuffer: fmt::Debug {
    /// Pixel format of the buffer contents
    fn format(&self) -> DrmFourcc;

    /// The framebuffer handle, if one has been created for this buffer
    fn framebuffer(&self) -> Option<Framebuffer>;

    /// Create a framebuffer handle for this buffer
    ///
    /// Returns `None` if the driver rejects the buffer, in which case the engine
    /// falls back to GPU composition for any layer using it.
    fn create_framebuffer(&self, gpu_fd: RawFd) -> Option<Framebuffer>;
}

/// One entry of the layer stack to present
///
/// Layers are ordered bottom to top. The z-order doubles as the key for
/// [`LayerFeedback`]: main layers occupy `0..layers.len()`, cursor layers
/// continue at `layers.len()..`.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    z_order: usize,
    buffer: Arc<dyn LayerBuffer>,
    /// Where the layer goes on the display
    pub display_frame: Rectangle<i32, Physical>,
    /// The (possibly fractional) region of the buffer to sample from
    pub source_crop: Rectangle<f64, Buffer>,
    /// Transformation applied while scanning out the buffer
    pub transform: Transform,
    /// Whether the buffer carries video content handled by the video backend
    pub video: bool,
    /// Whether this layer is a cursor
    pub cursor: bool,
    /// Hint that this layer should get a plane of its own even if it cannot be
    /// scanned out directly
    pub prefer_separate_plane: bool,
}

impl OverlayLayer {
    /// Create a layer at the given stack position backed by `buffer`
    pub fn new(z_order: usize, buffer: Arc<dyn LayerBuffer>) -> Self {
        OverlayLayer {
            z_order,
            buffer,
            display_frame: Rectangle::zero(),
            source_crop: Rectangle::zero(),
            transform: Transform::Normal,
            video: false,
            cursor: false,
            prefer_separate_plane: false,
        }
    }

    /// Position of this layer in the stack
    pub fn z_order(&self) -> usize {
        self.z_order
    }

    /// The buffer backing this layer
    pub fn buffer(&self) -> &Arc<dyn LayerBuffer> {
        &self.buffer
    }
}

/// Per-layer outcome of a validation pass, keyed by z-order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerFeedback {
    /// The layer is composed by the GPU into an off-screen target this frame
    pub gpu_rendered: bool,
    /// The plane scanning out this layer uses its hardware scalar
    pub use_plane_scalar: bool,
}
