//! Off-screen composition targets
//!
//! When a plane cannot scan out its layers directly the GPU composes them into a
//! [`NativeSurface`] and the plane scans out that surface instead. Surfaces are
//! pooled and recycled across frames by the
//! [`PlaneManager`](crate::manager::PlaneManager); a surface stays reserved for
//! as long as some plane state holds a [`SurfaceHandle`] to it.

use std::cell::{Ref, RefCell, RefMut};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::Arc;

use drm_fourcc::DrmFourcc;

use crate::layer::{LayerBuffer, OverlayLayer};
use crate::state::{crop_from_frame, DisplayPlaneState};
use crate::utils::{Buffer, Physical, Rectangle, Transform};

/// Allocator for the buffers backing off-screen composition targets
///
/// Implementations own whatever resource manager the platform requires; the
/// returned buffers are ready to be rendered into and exported for scan-out.
pub trait SurfaceFactory {
    /// Allocate backing storage for a 3D composition target
    fn create_3d_buffer(&mut self, width: u32, height: u32, format: DrmFourcc) -> Arc<dyn LayerBuffer>;

    /// Allocate backing storage for a video composition target
    fn create_video_buffer(&mut self, width: u32, height: u32, format: DrmFourcc) -> Arc<dyn LayerBuffer>;
}

/// An off-screen target a plane can scan out
///
/// The surface owns the [`OverlayLayer`] describing itself to the plane; plane
/// states and commit snapshots borrow that descriptor, there is no cycle back
/// into the layer stack.
#[derive(Debug)]
pub struct NativeSurface {
    layer: OverlayLayer,
    width: u32,
    height: u32,
    cursor: bool,
    in_use: bool,
}

impl NativeSurface {
    pub(crate) fn new(buffer: Arc<dyn LayerBuffer>, width: u32, height: u32, cursor: bool) -> Self {
        let mut layer = OverlayLayer::new(0, buffer);
        layer.display_frame = Rectangle::new((0, 0), (width as i32, height as i32));
        layer.source_crop = Rectangle::new((0.0, 0.0), (width as f64, height as f64));
        NativeSurface {
            layer,
            width,
            height,
            cursor,
            in_use: false,
        }
    }

    /// The descriptor of this surface as seen by the plane scanning it out
    pub fn layer(&self) -> &OverlayLayer {
        &self.layer
    }

    /// Dimensions the surface was allocated with
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether this surface came out of the cursor-sized pool
    pub fn is_cursor_target(&self) -> bool {
        self.cursor
    }

    /// Whether some plane state currently holds on to this surface
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub(crate) fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }

    /// Point the surface descriptor at the region covered by `state` and make
    /// sure the backing buffer can be scanned out.
    pub(crate) fn set_plane_target(&mut self, state: &DisplayPlaneState, gpu_fd: RawFd) {
        let frame = state.display_frame();
        self.layer.display_frame = frame;
        self.layer.source_crop = crop_from_frame(frame);
        self.layer.transform = Transform::Normal;
        if self.layer.buffer().framebuffer().is_none()
            && self.layer.buffer().create_framebuffer(gpu_fd).is_none()
        {
            // The final commit test will reject the proposal and collapse it.
            tracing::warn!("failed to create framebuffer for off-screen target");
        }
    }

    pub(crate) fn reset_display_frame(&mut self, frame: Rectangle<i32, Physical>) {
        self.layer.display_frame = frame;
    }

    pub(crate) fn reset_source_crop(&mut self, crop: Rectangle<f64, Buffer>) {
        self.layer.source_crop = crop;
    }
}

/// Reservation of a pooled [`NativeSurface`]
///
/// Dropping the handle releases the surface back to the pool, so the in-use
/// lifetime of a surface is exactly the lifetime of the plane states holding it.
#[derive(Debug)]
pub struct SurfaceHandle(Rc<RefCell<NativeSurface>>);

impl SurfaceHandle {
    pub(crate) fn acquire(surface: Rc<RefCell<NativeSurface>>) -> Self {
        surface.borrow_mut().set_in_use(true);
        SurfaceHandle(surface)
    }

    /// Borrow the reserved surface
    pub fn surface(&self) -> Ref<'_, NativeSurface> {
        self.0.borrow()
    }

    pub(crate) fn surface_mut(&self) -> RefMut<'_, NativeSurface> {
        self.0.borrow_mut()
    }

    pub(crate) fn rc(&self) -> &Rc<RefCell<NativeSurface>> {
        &self.0
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        self.0.borrow_mut().set_in_use(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Framebuffer;

    #[derive(Debug)]
    struct Buf(DrmFourcc);

    impl LayerBuffer for Buf {
        fn format(&self) -> DrmFourcc {
            self.0
        }
        fn framebuffer(&self) -> Option<Framebuffer> {
            Some(Framebuffer(7))
        }
        fn create_framebuffer(&self, _gpu_fd: RawFd) -> Option<Framebuffer> {
            Some(Framebuffer(7))
        }
    }

    #[test]
    fn handle_reserves_and_releases() {
        let surface = Rc::new(RefCell::new(NativeSurface::new(
            Arc::new(Buf(DrmFourcc::Xrgb8888)),
            1920,
            1080,
            false,
        )));
        assert!(!surface.borrow().in_use());

        let handle = SurfaceHandle::acquire(surface.clone());
        assert!(surface.borrow().in_use());

        drop(handle);
        assert!(!surface.borrow().in_use());
    }

    #[test]
    fn descriptor_covers_allocation() {
        let surface = NativeSurface::new(Arc::new(Buf(DrmFourcc::Argb8888)), 256, 256, true);
        assert!(surface.is_cursor_target());
        assert_eq!(surface.layer().display_frame, Rectangle::new((0, 0), (256, 256)));
        assert_eq!(surface.layer().buffer().format(), DrmFourcc::Argb8888);
    }
}
