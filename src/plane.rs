//! Hardware planes and the commit-test oracle
//!
//! [`DisplayPlane`]s are enumerated once by the [`PlaneHandler`] in scan-out
//! z-order, primary plane first. Whether a full set of (plane, layer) bindings
//! can actually be lit up in one atomic commit is only known to the driver, so
//! the engine repeatedly asks the handler to dry-run a proposal via
//! [`PlaneHandler::test_commit`].

use drm_fourcc::DrmFourcc;

use crate::layer::{Framebuffer, OverlayLayer};
use crate::utils::{Buffer, Physical, Rectangle, Size, Transform};

/// Identifier correlating a plane with the driver object it was enumerated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneId(pub u32);

/// Capability record of one hardware plane
///
/// Produced by [`PlaneHandler::populate_planes`]; the capability fields drive
/// the cheap per-layer checks of [`validate_layer`](DisplayPlane::validate_layer),
/// everything else is left to the commit test.
#[derive(Debug)]
pub struct DisplayPlane {
    id: PlaneId,
    universal: bool,
    in_use: bool,
    /// Format used for off-screen composition targets scanned out by this plane
    pub preferred_format: DrmFourcc,
    /// Format used for video composition targets scanned out by this plane
    pub preferred_video_format: DrmFourcc,
    /// Formats this plane can scan out directly
    pub formats: Vec<DrmFourcc>,
    /// Transforms this plane can apply while scanning out
    pub transforms: Vec<Transform>,
    /// Maximum dimensions this plane can scan out, if limited (e.g. cursor planes)
    pub max_size: Option<Size<i32, Physical>>,
}

impl DisplayPlane {
    /// Create a plane record
    ///
    /// `universal` planes can show arbitrary content; non-universal ones are
    /// specialized by the hardware (typically cursor-only).
    pub fn new(id: PlaneId, universal: bool) -> Self {
        DisplayPlane {
            id,
            universal,
            in_use: false,
            preferred_format: DrmFourcc::Xrgb8888,
            preferred_video_format: DrmFourcc::Nv12,
            formats: vec![DrmFourcc::Xrgb8888, DrmFourcc::Argb8888],
            transforms: vec![Transform::Normal],
            max_size: None,
        }
    }

    /// The driver identifier of this plane
    pub fn id(&self) -> PlaneId {
        self.id
    }

    /// Whether this plane can show arbitrary content
    pub fn is_universal(&self) -> bool {
        self.universal
    }

    /// Whether this plane has been claimed by the current frame
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub(crate) fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }

    /// Whether this plane can scan out buffers of the given format
    pub fn is_supported_format(&self, format: DrmFourcc) -> bool {
        self.formats.contains(&format)
    }

    /// Cheap per-layer feasibility check against the plane capabilities
    ///
    /// This covers format, transform and size only; whether the binding works
    /// together with the rest of a proposal is decided by the commit test.
    pub fn validate_layer(&self, layer: &OverlayLayer) -> bool {
        if !self.is_supported_format(layer.buffer().format()) {
            return false;
        }
        if !self.transforms.contains(&layer.transform) {
            return false;
        }
        if let Some(max) = self.max_size {
            if layer.display_frame.size.w > max.w || layer.display_frame.size.h > max.h {
                return false;
            }
        }
        true
    }
}

/// Owned snapshot of one (plane, layer) binding inside a proposed commit
///
/// Snapshots are materialized freshly for every test so that lazily created
/// framebuffer handles are visible to the handler.
#[derive(Debug, Clone)]
pub struct PlaneCommit {
    /// The plane this binding targets
    pub plane: PlaneId,
    /// Source region sampled from the buffer
    pub src: Rectangle<f64, Buffer>,
    /// Destination region on the display
    pub dst: Rectangle<i32, Physical>,
    /// Transform applied during scan-out
    pub transform: Transform,
    /// Framebuffer handle to scan out, if one exists
    pub framebuffer: Option<Framebuffer>,
    /// Pixel format of the bound buffer
    pub format: DrmFourcc,
}

impl PlaneCommit {
    pub(crate) fn new(plane: PlaneId, layer: &OverlayLayer) -> Self {
        PlaneCommit {
            plane,
            src: layer.source_crop,
            dst: layer.display_frame,
            transform: layer.transform,
            framebuffer: layer.buffer().framebuffer(),
            format: layer.buffer().format(),
        }
    }
}

/// Interface to the display driver
pub trait PlaneHandler {
    /// Enumerate the hardware planes in scan-out z-order, primary plane first
    ///
    /// Called exactly once when the manager is created.
    fn populate_planes(&mut self) -> Result<Vec<DisplayPlane>, Box<dyn std::error::Error + Send + Sync>>;

    /// Dry-run whether the given bindings would commit atomically
    ///
    /// Must be free of side effects on the display state; the engine may call
    /// this many times per frame.
    fn test_commit(&self, commit: &[PlaneCommit]) -> bool;
}
