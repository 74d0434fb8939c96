//! Per-plane assignment state
//!
//! A [`DisplayPlaneState`] records which source layers a plane presents this
//! frame and how: either by scanning out the single layer's buffer directly, or
//! by scanning out an off-screen target the GPU composes the layers into.

use crate::layer::OverlayLayer;
use crate::surface::SurfaceHandle;
use crate::utils::{Buffer, Physical, Rectangle};

/// An ordered set of plane states, primary plane at index 0
pub type Composition = Vec<DisplayPlaneState>;

/// Convert a display frame into the matching source-crop rectangle
///
/// Off-screen targets are display-sized, so scanning out the region covered by
/// a plane means sampling the same rectangle out of the target.
pub(crate) fn crop_from_frame(frame: Rectangle<i32, Physical>) -> Rectangle<f64, Buffer> {
    Rectangle::new(
        (frame.loc.x as f64, frame.loc.y as f64),
        (frame.size.w as f64, frame.size.h as f64),
    )
}

/// Assignment of one or more source layers to a hardware plane
#[derive(Debug)]
pub struct DisplayPlaneState {
    plane: usize,
    source_layers: Vec<usize>,
    display_frame: Rectangle<i32, Physical>,
    source_crop: Rectangle<f64, Buffer>,
    surfaces: Vec<SurfaceHandle>,
    composition_regions: Vec<Rectangle<i32, Physical>>,
    video: bool,
    uses_plane_scalar: bool,
    force_gpu: bool,
}

impl DisplayPlaneState {
    pub(crate) fn new(plane: usize, layer: &OverlayLayer) -> Self {
        DisplayPlaneState {
            plane,
            source_layers: vec![layer.z_order()],
            display_frame: layer.display_frame,
            source_crop: crop_from_frame(layer.display_frame),
            surfaces: Vec::new(),
            composition_regions: Vec::new(),
            video: false,
            uses_plane_scalar: false,
            force_gpu: false,
        }
    }

    /// Index of the assigned plane in the manager's scan-out ordered plane list
    pub fn plane(&self) -> usize {
        self.plane
    }

    /// Z-orders of the source layers shown by this plane, bottom to top
    pub fn source_layers(&self) -> &[usize] {
        &self.source_layers
    }

    /// Union of the display frames of all source layers
    pub fn display_frame(&self) -> Rectangle<i32, Physical> {
        self.display_frame
    }

    /// Region sampled from the scanned-out buffer
    pub fn source_crop(&self) -> Rectangle<f64, Buffer> {
        self.source_crop
    }

    /// The active off-screen target, if the plane scans one out
    pub fn offscreen_target(&self) -> Option<&SurfaceHandle> {
        self.surfaces.first()
    }

    /// Target history, newest first
    ///
    /// Surfaces stay reserved while referenced here, even after being replaced
    /// as the active target.
    pub fn surfaces(&self) -> &[SurfaceHandle] {
        &self.surfaces
    }

    /// Whether the GPU has to compose this plane's layers into an off-screen
    /// target before scan-out
    pub fn needs_offscreen_composition(&self) -> bool {
        self.force_gpu || self.source_layers.len() > 1
    }

    /// Whether this plane presents video content through the video backend
    pub fn is_video_plane(&self) -> bool {
        self.video
    }

    /// Whether the plane's hardware scalar resizes source crop to display frame
    pub fn is_using_plane_scalar(&self) -> bool {
        self.uses_plane_scalar
    }

    /// Damage regions for the off-screen composition of this plane
    pub fn composition_regions(&self) -> &[Rectangle<i32, Physical>] {
        &self.composition_regions
    }

    /// Mutable access for the renderer tracking composition damage
    pub fn composition_regions_mut(&mut self) -> &mut Vec<Rectangle<i32, Physical>> {
        &mut self.composition_regions
    }

    pub(crate) fn add_layer(&mut self, layer: &OverlayLayer) {
        self.source_layers.push(layer.z_order());
        self.display_frame = self.display_frame.merge(layer.display_frame);
        if !self.uses_plane_scalar {
            self.source_crop = crop_from_frame(self.display_frame);
        }
    }

    pub(crate) fn set_video_plane(&mut self) {
        self.video = true;
    }

    pub(crate) fn unset_video_plane(&mut self) {
        self.video = false;
    }

    pub(crate) fn force_gpu_rendering(&mut self) {
        self.force_gpu = true;
    }

    pub(crate) fn set_offscreen_target(&mut self, handle: SurfaceHandle) {
        self.surfaces.insert(0, handle);
    }

    pub(crate) fn clear_surfaces(&mut self) {
        self.surfaces.clear();
    }

    pub(crate) fn set_source_crop(&mut self, crop: Rectangle<f64, Buffer>) {
        self.source_crop = crop;
    }

    pub(crate) fn reset_source_rect_to_display_frame(&mut self) {
        self.source_crop = crop_from_frame(self.display_frame);
    }

    pub(crate) fn use_plane_scalar(&mut self, enable: bool) {
        self.uses_plane_scalar = enable;
    }

    pub(crate) fn clear_composition_regions(&mut self) {
        self.composition_regions.clear();
    }

    /// Push the current source crop into every surface in the target history
    pub(crate) fn reset_surfaces_source_crop(&self) {
        for handle in &self.surfaces {
            handle.surface_mut().reset_source_crop(self.source_crop);
        }
    }

    /// Push the current display frame into every surface in the target history
    pub(crate) fn reset_surfaces_display_frame(&self) {
        for handle in &self.surfaces {
            handle.surface_mut().reset_display_frame(self.display_frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drm_fourcc::DrmFourcc;

    use super::*;
    use crate::layer::Framebuffer;

    #[derive(Debug)]
    struct Buf;

    impl crate::layer::LayerBuffer for Buf {
        fn format(&self) -> DrmFourcc {
            DrmFourcc::Xrgb8888
        }
        fn framebuffer(&self) -> Option<Framebuffer> {
            Some(Framebuffer(1))
        }
        fn create_framebuffer(&self, _gpu_fd: std::os::unix::io::RawFd) -> Option<Framebuffer> {
            Some(Framebuffer(1))
        }
    }

    fn layer(z: usize, frame: Rectangle<i32, Physical>) -> OverlayLayer {
        let mut layer = OverlayLayer::new(z, Arc::new(Buf));
        layer.display_frame = frame;
        layer.source_crop = crop_from_frame(frame);
        layer
    }

    #[test]
    fn single_layer_scans_out_directly() {
        let state = DisplayPlaneState::new(0, &layer(0, Rectangle::new((0, 0), (800, 600))));
        assert!(!state.needs_offscreen_composition());
        assert_eq!(state.source_layers(), &[0]);
    }

    #[test]
    fn adding_layers_requires_composition_and_merges_frames() {
        let mut state = DisplayPlaneState::new(0, &layer(0, Rectangle::new((0, 0), (800, 600))));
        state.add_layer(&layer(1, Rectangle::new((700, 500), (200, 200))));

        assert!(state.needs_offscreen_composition());
        assert_eq!(state.display_frame(), Rectangle::new((0, 0), (900, 700)));
        assert_eq!(state.source_crop(), crop_from_frame(state.display_frame()));
    }

    #[test]
    fn forced_gpu_rendering_requires_composition() {
        let mut state = DisplayPlaneState::new(0, &layer(0, Rectangle::new((0, 0), (800, 600))));
        state.force_gpu_rendering();
        assert!(state.needs_offscreen_composition());
        assert_eq!(state.source_layers().len(), 1);
    }

    #[test]
    fn scalar_keeps_source_crop_on_fold() {
        let mut state = DisplayPlaneState::new(0, &layer(0, Rectangle::new((0, 0), (800, 600))));
        let crop = Rectangle::new((0.0, 0.0), (400.0, 300.0));
        state.set_source_crop(crop);
        state.use_plane_scalar(true);

        state.add_layer(&layer(1, Rectangle::new((0, 0), (100, 100))));
        assert_eq!(state.source_crop(), crop);

        state.use_plane_scalar(false);
        state.reset_source_rect_to_display_frame();
        assert_eq!(state.source_crop(), crop_from_frame(state.display_frame()));
    }
}
