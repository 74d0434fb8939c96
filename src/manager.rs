//! The plane assignment engine
//!
//! [`PlaneManager`] decides, once per frame, how an ordered stack of
//! [`OverlayLayer`]s is split between direct scan-out on hardware planes and GPU
//! composition into off-screen targets. The driver is only reached through the
//! [`PlaneHandler`] commit-test oracle, so every decision is made by proposing a
//! binding and asking whether the resulting set would still commit atomically.
//!
//! Two entry points exist per frame: [`validate_layers`](PlaneManager::validate_layers)
//! computes a fresh assignment, while [`revalidate_layers`](PlaneManager::revalidate_layers)
//! cheaply re-tests the previous frame's assignment against the current stack
//! and requests a full pass only when that fails.

use std::cell::RefCell;
use std::fmt;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use bitflags::bitflags;
use tracing::{debug, instrument, trace, warn};

use crate::error::Error;
use crate::layer::{LayerFeedback, OverlayLayer};
use crate::plane::{DisplayPlane, PlaneCommit, PlaneHandler};
use crate::state::{Composition, DisplayPlaneState};
use crate::surface::{NativeSurface, SurfaceFactory, SurfaceHandle};
use crate::utils::Transform;

/// The primary plane is always the first enumerated plane.
const PRIMARY_PLANE: usize = 0;

bitflags! {
    /// Per-frame conditions influencing the assignment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u32 {
        /// A modeset is pending; multi-layer frames are composed by the GPU
        const PENDING_MODESET = 1 << 0;
        /// Overlay usage is administratively disabled for this frame
        const DISABLE_OVERLAY = 1 << 1;
        /// Video layers must be processed by the video backend this frame
        const REQUEST_VIDEO_EFFECT = 1 << 2;
    }
}

/// Tunables fixed at construction time
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Reserve the topmost plane for cursor-only use when more than three
    /// planes exist, and keep it out of overlay assignment
    pub disable_cursor_plane: bool,
}

/// Result of a full validation pass
#[derive(Debug)]
pub struct Validated {
    /// The produced plane assignment, primary plane first
    pub composition: Composition,
    /// Whether any plane requires GPU composition before scan-out
    pub render_required: bool,
    /// Per-layer outcome, indexed by z-order
    pub feedback: Vec<LayerFeedback>,
}

/// Result of the revalidation fast path
#[derive(Debug)]
pub struct Revalidation {
    /// Whether any plane requires GPU composition before scan-out
    pub render_required: bool,
    /// The previous assignment no longer commits; run a full validation
    pub request_full: bool,
    /// Per-layer outcome, indexed by z-order; only meaningful if the
    /// assignment was accepted
    pub feedback: Vec<LayerFeedback>,
}

/// The main layer stack and the cursor stack of one frame, resolved by z-order
struct LayerStack<'a> {
    layers: &'a [OverlayLayer],
    cursors: &'a [OverlayLayer],
}

impl<'a> LayerStack<'a> {
    fn new(layers: &'a [OverlayLayer], cursors: &'a [OverlayLayer]) -> Self {
        LayerStack { layers, cursors }
    }

    fn len(&self) -> usize {
        self.layers.len() + self.cursors.len()
    }

    fn get(&self, z_order: usize) -> &'a OverlayLayer {
        if z_order < self.layers.len() {
            &self.layers[z_order]
        } else {
            &self.cursors[z_order - self.layers.len()]
        }
    }

    fn empty_feedback(&self) -> Vec<LayerFeedback> {
        vec![LayerFeedback::default(); self.len()]
    }
}

/// The layer a proposed binding scans out: either a source layer of the frame
/// or an off-screen target.
enum CommitLayer {
    Source(usize),
    Target(Rc<RefCell<NativeSurface>>),
}

/// One entry of the running commit proposal.
struct CommitSlot {
    plane: usize,
    layer: CommitLayer,
}

fn slot_for_state(state: &DisplayPlaneState) -> CommitSlot {
    match state.offscreen_target() {
        Some(target) => CommitSlot {
            plane: state.plane(),
            layer: CommitLayer::Target(target.rc().clone()),
        },
        None => CommitSlot {
            plane: state.plane(),
            layer: CommitLayer::Source(state.source_layers()[0]),
        },
    }
}

fn feedback_for(composition: &Composition, stack: &LayerStack<'_>) -> Vec<LayerFeedback> {
    let mut feedback = stack.empty_feedback();
    for state in composition {
        if !state.needs_offscreen_composition() {
            continue;
        }
        let use_plane_scalar = state.is_using_plane_scalar();
        for &z_order in state.source_layers() {
            if let Some(entry) = feedback.get_mut(z_order) {
                entry.gpu_rendered = true;
                entry.use_plane_scalar = use_plane_scalar;
            }
        }
    }
    feedback
}

/// Display plane assignment engine for one display
///
/// Owns the plane list enumerated from the [`PlaneHandler`] and both off-screen
/// surface pools. One instance serves exactly one display and is driven from
/// that display's composition thread; the type is deliberately not `Send`.
pub struct PlaneManager<H, F> {
    handler: H,
    factory: F,
    config: ManagerConfig,
    planes: Vec<DisplayPlane>,
    cursor_plane: Option<usize>,
    width: u32,
    height: u32,
    gpu_fd: RawFd,
    surfaces: Vec<Rc<RefCell<NativeSurface>>>,
    cursor_surfaces: Vec<Rc<RefCell<NativeSurface>>>,
}

impl<H, F> fmt::Debug for PlaneManager<H, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaneManager")
            .field("planes", &self.planes)
            .field("cursor_plane", &self.cursor_plane)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("surfaces", &self.surfaces.len())
            .field("cursor_surfaces", &self.cursor_surfaces.len())
            .finish_non_exhaustive()
    }
}

impl<H, F> PlaneManager<H, F>
where
    H: PlaneHandler,
    F: SurfaceFactory,
{
    /// Create a manager for a display of the given dimensions
    ///
    /// Enumerates the hardware planes once. The topmost plane becomes the
    /// reserved cursor plane if it is cursor-only hardware, or if
    /// [`ManagerConfig::disable_cursor_plane`] is set and more than three
    /// planes exist.
    pub fn new(
        mut handler: H,
        factory: F,
        gpu_fd: RawFd,
        width: u32,
        height: u32,
        config: ManagerConfig,
    ) -> Result<Self, Error> {
        let planes = handler.populate_planes().map_err(Error::Enumeration)?;
        if planes.is_empty() {
            return Err(Error::NoPlanes);
        }

        let mut cursor_plane = None;
        if planes.len() > 1 {
            let topmost = planes.len() - 1;
            let needs_cursor_reservation = config.disable_cursor_plane && planes.len() > 3;
            if needs_cursor_reservation || !planes[topmost].is_universal() {
                debug!("reserving plane {:?} for cursor use", planes[topmost].id());
                cursor_plane = Some(topmost);
            }
        }

        Ok(PlaneManager {
            handler,
            factory,
            config,
            planes,
            cursor_plane,
            width,
            height,
            gpu_fd,
            surfaces: Vec::new(),
            cursor_surfaces: Vec::new(),
        })
    }

    /// The enumerated planes, in scan-out z-order
    ///
    /// [`DisplayPlaneState::plane`] indexes into this slice.
    pub fn planes(&self) -> &[DisplayPlane] {
        &self.planes
    }

    /// Compute a fresh plane assignment for this frame
    ///
    /// `layers` is the bottom-to-top stack of non-cursor layers and must not be
    /// empty; `cursor_layers` are handled separately by the cursor planner.
    /// Z-orders must be contiguous: `layers[i].z_order() == i` and
    /// `cursor_layers[i].z_order() == layers.len() + i`.
    #[instrument(level = "trace", skip_all)]
    pub fn validate_layers(
        &mut self,
        layers: &[OverlayLayer],
        cursor_layers: &[OverlayLayer],
        flags: FrameFlags,
    ) -> Validated {
        let stack = LayerStack::new(layers, cursor_layers);
        if layers.is_empty() {
            return Validated {
                composition: Vec::new(),
                render_required: false,
                feedback: stack.empty_feedback(),
            };
        }
        debug_assert!(layers.iter().enumerate().all(|(i, l)| l.z_order() == i));
        debug_assert!(cursor_layers
            .iter()
            .enumerate()
            .all(|(i, l)| l.z_order() == layers.len() + i));

        for plane in &mut self.planes {
            plane.set_in_use(false);
        }

        let mut composition: Composition = Vec::new();
        let mut slots: Vec<CommitSlot> = Vec::new();

        // Primary plane seeding: the bottom layer always starts out there.
        let primary_layer = &layers[0];
        slots.push(CommitSlot {
            plane: PRIMARY_PLANE,
            layer: CommitLayer::Source(primary_layer.z_order()),
        });
        composition.push(DisplayPlaneState::new(PRIMARY_PLANE, primary_layer));
        self.planes[PRIMARY_PLANE].set_in_use(true);

        let mut prefer_separate_plane = primary_layer.prefer_separate_plane;
        let force_gpu = (flags.contains(FrameFlags::PENDING_MODESET) && layers.len() > 1)
            || flags.contains(FrameFlags::DISABLE_OVERLAY);
        let force_va = flags.contains(FrameFlags::REQUEST_VIDEO_EFFECT) && primary_layer.video;

        let mut primary_fallback = false;
        if force_gpu || force_va || self.fallback_to_gpu(PRIMARY_PLANE, primary_layer, &slots, &stack) {
            primary_fallback = true;
            if force_gpu || !prefer_separate_plane {
                trace!("composing the whole stack on the primary plane");
                {
                    let state = composition.last_mut().unwrap();
                    for layer in layers[1..].iter().chain(cursor_layers.iter()) {
                        state.add_layer(layer);
                    }
                    if primary_layer.video && state.source_layers().len() == 1 {
                        state.set_video_plane();
                    }
                }
                let state = composition.last_mut().unwrap();
                let slot = slots.last_mut().unwrap();
                self.reset_plane_target(state, slot);

                let feedback = feedback_for(&composition, &stack);
                return Validated {
                    composition,
                    render_required: true,
                    feedback,
                };
            }

            trace!("primary layer needs GPU composition on its own plane");
            let state = composition.last_mut().unwrap();
            if primary_layer.video {
                state.set_video_plane();
            }
            let slot = slots.last_mut().unwrap();
            self.reset_plane_target(state, slot);
        }

        if primary_fallback {
            let state = composition.last_mut().unwrap();
            self.validate_for_display_scaling(state, &mut slots, primary_layer, false, &stack);
        }

        // Overlay assignment: walk the remaining planes in scan-out order and
        // bind layers greedily; whatever a plane rejects is folded into the
        // last established plane state.
        let mut next_layer = 1;
        for plane_idx in 1..self.planes.len() {
            if self.config.disable_cursor_plane && Some(plane_idx) == self.cursor_plane {
                continue;
            }

            while next_layer < layers.len() {
                let layer = &layers[next_layer];
                slots.push(CommitSlot {
                    plane: plane_idx,
                    layer: CommitLayer::Source(layer.z_order()),
                });
                next_layer += 1;

                let mut fall_back = self.fallback_to_gpu(plane_idx, layer, &slots, &stack);
                if flags.contains(FrameFlags::REQUEST_VIDEO_EFFECT) && layer.video {
                    fall_back = true;
                }

                if !fall_back || prefer_separate_plane || layer.prefer_separate_plane {
                    trace!(z_order = layer.z_order(), plane = plane_idx, "binding layer to plane");
                    composition.push(DisplayPlaneState::new(plane_idx, layer));
                    self.planes[plane_idx].set_in_use(true);
                    if fall_back {
                        let state = composition.last_mut().unwrap();
                        if layer.video {
                            state.set_video_plane();
                        }
                        let slot = slots.last_mut().unwrap();
                        self.reset_plane_target(state, slot);
                    }
                    prefer_separate_plane = layer.prefer_separate_plane;
                    break;
                }

                trace!(z_order = layer.z_order(), "folding layer into previous plane");
                slots.pop();
                let state = composition.last_mut().unwrap();
                state.add_layer(layer);
                if state.offscreen_target().is_none() {
                    self.set_offscreen_plane_target(state);
                }
            }
        }

        // Out of planes: everything left goes into the last plane state.
        let mut last_spilled = None;
        {
            let state = composition.last_mut().unwrap();
            for layer in &layers[next_layer..] {
                trace!(z_order = layer.z_order(), "no planes left, folding layer");
                state.add_layer(layer);
                last_spilled = Some(layer.z_order());
            }
        }
        if composition.last().unwrap().needs_offscreen_composition() {
            if let Some(z_order) = last_spilled {
                let state = composition.last_mut().unwrap();
                if state.is_video_plane()
                    && state.source_layers().len() > 1
                    && state.offscreen_target().is_some()
                {
                    // The video backend cannot compose multiple layers.
                    trace!("invalidating video target of spilled-into plane");
                    state.clear_surfaces();
                    state.unset_video_plane();
                }
                if state.offscreen_target().is_none() {
                    self.set_offscreen_plane_target(state);
                    refresh_slot(&mut slots, state);
                }
                let state = composition.last_mut().unwrap();
                let layer = stack.get(z_order);
                self.validate_for_display_scaling(state, &mut slots, layer, false, &stack);
            }
        }

        let cursor_rendered = self.validate_cursor_layers(cursor_layers, &mut composition, &stack);

        let render_layers = composition.iter().any(|s| s.needs_offscreen_composition()) || cursor_rendered;
        if render_layers {
            self.validate_final_layers(&mut composition, layers, cursor_layers, &stack);
        }

        let render_required =
            composition.iter().any(|s| s.needs_offscreen_composition()) || cursor_rendered;
        let feedback = feedback_for(&composition, &stack);
        Validated {
            composition,
            render_required,
            feedback,
        }
    }

    /// Re-test the previous frame's assignment against the current stacks
    ///
    /// On success the assignment (including plane scalar decisions, which are
    /// re-validated) is kept and per-layer feedback is reported as if
    /// [`validate_layers`](Self::validate_layers) had run. On failure
    /// `request_full` is set and the caller is expected to run a full pass.
    #[instrument(level = "trace", skip_all)]
    pub fn revalidate_layers(
        &mut self,
        layers: &[OverlayLayer],
        cursor_layers: &[OverlayLayer],
        composition: &mut Composition,
    ) -> Revalidation {
        let stack = LayerStack::new(layers, cursor_layers);
        let stale = composition.is_empty()
            || composition
                .iter()
                .any(|s| s.source_layers().iter().any(|&z| z >= stack.len()));
        if stale {
            trace!("previous composition does not match the layer stack");
            return Revalidation {
                render_required: false,
                request_full: true,
                feedback: stack.empty_feedback(),
            };
        }

        let mut slots = Vec::with_capacity(composition.len());
        for state in composition.iter_mut() {
            slots.push(slot_for_state(state));
            if state.is_using_plane_scalar() {
                let z_order = *state.source_layers().last().unwrap();
                let layer = stack.get(z_order);
                self.validate_for_display_scaling(state, &mut slots, layer, true, &stack);
            }
        }

        if self.test_commit(&slots, &stack) {
            let render_required = composition.iter().any(|s| s.needs_offscreen_composition());
            let feedback = feedback_for(composition, &stack);
            Revalidation {
                render_required,
                request_full: false,
                feedback,
            }
        } else {
            trace!("previous composition no longer commits, requesting full validation");
            Revalidation {
                render_required: false,
                request_full: true,
                feedback: stack.empty_feedback(),
            }
        }
    }

    /// Materialize the authoritative binding list for the real atomic commit
    pub fn commit_plan(
        &self,
        composition: &Composition,
        layers: &[OverlayLayer],
        cursor_layers: &[OverlayLayer],
    ) -> Vec<PlaneCommit> {
        let stack = LayerStack::new(layers, cursor_layers);
        let slots: Vec<_> = composition.iter().map(slot_for_state).collect();
        self.materialize(&slots, &stack)
    }

    /// Drop both surface pools entirely (e.g. on modeset)
    pub fn release_all_off_screen_targets(&mut self) {
        self.surfaces.clear();
        self.cursor_surfaces.clear();
    }

    /// Compact the surface pools down to the surfaces still reserved
    pub fn release_free_off_screen_targets(&mut self) {
        self.surfaces.retain(|s| s.borrow().in_use());
        self.cursor_surfaces.retain(|s| s.borrow().in_use());
    }

    /// Assign cursor layers to the remaining free planes, topmost first;
    /// cursors no plane accepts are folded into the topmost used overlay.
    fn validate_cursor_layers(
        &mut self,
        cursor_layers: &[OverlayLayer],
        composition: &mut Composition,
        stack: &LayerStack<'_>,
    ) -> bool {
        if cursor_layers.is_empty() {
            return false;
        }

        let mut last_used = self.last_used_overlay(composition);
        let mut is_video = composition[last_used].is_video_plane();
        let mut slots: Vec<_> = composition.iter().map(slot_for_state).collect();

        // Under the cursor-plane reservation the reserved plane is only used
        // once every other plane is taken.
        let reserved = self
            .cursor_plane
            .filter(|_| self.config.disable_cursor_plane);
        let plane_order = (0..self.planes.len())
            .rev()
            .filter(|idx| Some(*idx) != reserved)
            .chain(reserved);

        let mut rendered = false;
        let mut cursor_index = 0;
        for plane_idx in plane_order {
            if cursor_index == cursor_layers.len() {
                break;
            }
            if self.planes[plane_idx].in_use() {
                continue;
            }

            let cursor_layer = &cursor_layers[cursor_index];
            slots.push(CommitSlot {
                plane: plane_idx,
                layer: CommitLayer::Source(cursor_layer.z_order()),
            });
            if self.fallback_to_gpu(plane_idx, cursor_layer, &slots, stack) {
                trace!(
                    z_order = cursor_layer.z_order(),
                    "cursor cannot scan out, folding into last used overlay"
                );
                slots.pop();
                let reset_overlay;
                {
                    let state = &mut composition[last_used];
                    state.add_layer(cursor_layer);
                    reset_overlay = state.offscreen_target().is_none() || is_video;
                    self.prepare_plane_for_cursor(state, is_video);
                }
                if reset_overlay {
                    // The scanned-out layer of the fold target changed.
                    slots = composition.iter().map(slot_for_state).collect();
                }
                let state = &mut composition[last_used];
                self.validate_for_display_scaling(state, &mut slots, cursor_layer, false, stack);
                rendered = true;
            } else {
                trace!(
                    z_order = cursor_layer.z_order(),
                    plane = plane_idx,
                    "binding cursor layer to plane"
                );
                composition.push(DisplayPlaneState::new(plane_idx, cursor_layer));
                self.planes[plane_idx].set_in_use(true);
                last_used = self.last_used_overlay(composition);
                is_video = composition[last_used].is_video_plane();
            }

            cursor_index += 1;
        }

        // More cursors than planes: the rest piles into the last used overlay.
        let mut last_spilled = None;
        for cursor_layer in &cursor_layers[cursor_index..] {
            composition[last_used].add_layer(cursor_layer);
            rendered = true;
            last_spilled = Some(cursor_layer.z_order());
        }
        if let Some(z_order) = last_spilled {
            {
                let state = &mut composition[last_used];
                self.prepare_plane_for_cursor(state, is_video);
            }
            let state = &mut composition[last_used];
            let layer = stack.get(z_order);
            self.validate_for_display_scaling(state, &mut slots, layer, false, stack);
        }

        rendered
    }

    /// Topmost plane state that is not the reserved cursor-only plane
    fn last_used_overlay(&self, composition: &Composition) -> usize {
        for (idx, state) in composition.iter().enumerate().rev() {
            if Some(state.plane()) == self.cursor_plane && !self.planes[state.plane()].is_universal() {
                continue;
            }
            return idx;
        }
        0
    }

    /// Make a fold target ready to also compose a cursor layer
    ///
    /// With `reset_buffer` the active target is replaced by a cursor target;
    /// the replaced surface stays reserved in the state's history until the
    /// state is released.
    fn prepare_plane_for_cursor(&mut self, state: &mut DisplayPlaneState, reset_buffer: bool) {
        if reset_buffer || state.offscreen_target().is_none() {
            let frame = state.display_frame();
            let width = frame.size.w.max(1) as u32;
            let height = frame.size.h.max(1) as u32;
            self.set_offscreen_cursor_plane_target(state, width, height);
        }
        state.clear_composition_regions();
        state.reset_surfaces_display_frame();
    }

    /// Decide whether the plane's hardware scalar or the GPU resizes the layer
    fn validate_for_display_scaling(
        &self,
        state: &mut DisplayPlaneState,
        slots: &mut [CommitSlot],
        layer: &OverlayLayer,
        ignore_format: bool,
        stack: &LayerStack<'_>,
    ) {
        if state.is_using_plane_scalar() {
            state.use_plane_scalar(false);
            state.reset_source_rect_to_display_frame();
            state.reset_surfaces_source_crop();
        }

        // Layers composed together rarely share one scaling ratio.
        if state.source_layers().len() > 1 {
            return;
        }

        let frame_width = layer.display_frame.size.w;
        let frame_height = layer.display_frame.size.h;
        let crop_width = layer.source_crop.size.w.round() as i32;
        let crop_height = layer.source_crop.size.h.round() as i32;

        if frame_width == crop_width && frame_height == crop_height {
            return;
        }

        // Without rotation and with a format the plane understands the layer
        // does not need GPU composition, so there is nothing to win here.
        if !ignore_format
            && layer.transform == Transform::Normal
            && self.planes[state.plane()].is_supported_format(layer.buffer().format())
        {
            return;
        }

        // Pure downscaling is cheaper on the GPU.
        if frame_width < crop_width && frame_height < crop_height {
            return;
        }

        if frame_width > crop_width && frame_height < crop_height {
            let width_cost = (frame_width - crop_width) * frame_height;
            let height_cost = (crop_height - frame_height) * frame_width;
            if height_cost > width_cost {
                return;
            }
        }

        if frame_width < crop_width && frame_height > crop_height {
            let width_cost = (crop_width - frame_width) * frame_height;
            let height_cost = (frame_height - crop_height) * frame_width;
            if width_cost > height_cost {
                return;
            }
        }

        let Some(target) = state.offscreen_target() else {
            return;
        };
        let target = target.rc().clone();

        state.set_source_crop(layer.source_crop);
        state.reset_surfaces_source_crop();
        if let Some(slot) = slots.iter_mut().find(|s| s.plane == state.plane()) {
            slot.layer = CommitLayer::Target(target.clone());
        }

        let fall_back = self.fallback_to_gpu(state.plane(), target.borrow().layer(), slots, stack);
        if fall_back {
            trace!("plane scalar rejected by commit test, reverting");
            state.reset_source_rect_to_display_frame();
            state.reset_surfaces_source_crop();
        } else {
            trace!("using plane scalar for layer {}", layer.z_order());
            state.use_plane_scalar(true);
        }
    }

    /// Make sure every composed plane has a target and the whole proposal
    /// commits; otherwise collapse to GPU composition on the primary plane.
    fn validate_final_layers(
        &mut self,
        composition: &mut Composition,
        layers: &[OverlayLayer],
        cursor_layers: &[OverlayLayer],
        stack: &LayerStack<'_>,
    ) {
        for state in composition.iter_mut() {
            if state.needs_offscreen_composition() && state.offscreen_target().is_none() {
                self.ensure_offscreen_target(state);
            }
        }

        let slots: Vec<_> = composition.iter().map(slot_for_state).collect();
        if self.test_commit(&slots, stack) {
            return;
        }

        warn!("final atomic test failed, collapsing to GPU composition on the primary plane");
        composition.clear();

        let primary_layer = &layers[0];
        let mut state = DisplayPlaneState::new(PRIMARY_PLANE, primary_layer);
        self.planes[PRIMARY_PLANE].set_in_use(true);
        state.force_gpu_rendering();
        for layer in layers[1..].iter().chain(cursor_layers.iter()) {
            state.add_layer(layer);
        }
        self.ensure_offscreen_target(&mut state);
        composition.push(state);
        self.release_free_off_screen_targets();
    }

    /// Whether `layer` cannot be scanned out by `plane` within the proposal
    fn fallback_to_gpu(
        &self,
        plane: usize,
        layer: &OverlayLayer,
        slots: &[CommitSlot],
        stack: &LayerStack<'_>,
    ) -> bool {
        let plane = &self.planes[plane];
        if !plane.validate_layer(layer) {
            trace!(
                z_order = layer.z_order(),
                "layer rejected by plane capabilities"
            );
            return true;
        }
        if layer.buffer().framebuffer().is_none()
            && layer.buffer().create_framebuffer(self.gpu_fd).is_none()
        {
            trace!(z_order = layer.z_order(), "framebuffer creation failed");
            return true;
        }
        if !self.test_commit(slots, stack) {
            trace!(z_order = layer.z_order(), "proposal rejected by commit test");
            return true;
        }
        false
    }

    fn test_commit(&self, slots: &[CommitSlot], stack: &LayerStack<'_>) -> bool {
        self.handler.test_commit(&self.materialize(slots, stack))
    }

    fn materialize(&self, slots: &[CommitSlot], stack: &LayerStack<'_>) -> Vec<PlaneCommit> {
        slots
            .iter()
            .map(|slot| {
                let id = self.planes[slot.plane].id();
                match &slot.layer {
                    CommitLayer::Source(z_order) => PlaneCommit::new(id, stack.get(*z_order)),
                    CommitLayer::Target(surface) => PlaneCommit::new(id, surface.borrow().layer()),
                }
            })
            .collect()
    }

    /// Attach an off-screen target and mark the plane as GPU composed
    fn set_offscreen_plane_target(&mut self, state: &mut DisplayPlaneState) {
        self.ensure_offscreen_target(state);
        state.force_gpu_rendering();
    }

    fn ensure_offscreen_target(&mut self, state: &mut DisplayPlaneState) {
        if state.offscreen_target().is_some() {
            return;
        }

        let video = state.is_video_plane();
        let plane = &self.planes[state.plane()];
        let preferred_format = if video {
            plane.preferred_video_format
        } else {
            plane.preferred_format
        };

        let existing = self
            .surfaces
            .iter()
            .find(|s| {
                let s = s.borrow();
                !s.in_use() && s.layer().buffer().format() == preferred_format
            })
            .cloned();
        let surface = existing.unwrap_or_else(|| {
            trace!(?preferred_format, video, "allocating new off-screen target");
            let buffer = if video {
                self.factory
                    .create_video_buffer(self.width, self.height, preferred_format)
            } else {
                self.factory
                    .create_3d_buffer(self.width, self.height, preferred_format)
            };
            let surface = Rc::new(RefCell::new(NativeSurface::new(
                buffer,
                self.width,
                self.height,
                false,
            )));
            self.surfaces.push(surface.clone());
            surface
        });

        surface.borrow_mut().set_plane_target(state, self.gpu_fd);
        state.set_offscreen_target(SurfaceHandle::acquire(surface));
    }

    /// Attach a cursor-sized off-screen target from the cursor pool
    fn set_offscreen_cursor_plane_target(
        &mut self,
        state: &mut DisplayPlaneState,
        width: u32,
        height: u32,
    ) {
        let preferred_format = self.planes[state.plane()].preferred_format;
        let existing = self
            .cursor_surfaces
            .iter()
            .find(|s| {
                let s = s.borrow();
                !s.in_use() && s.layer().buffer().format() == preferred_format
            })
            .cloned();
        let surface = existing.unwrap_or_else(|| {
            trace!(?preferred_format, "allocating new cursor off-screen target");
            let buffer = self.factory.create_3d_buffer(width, height, preferred_format);
            let surface = Rc::new(RefCell::new(NativeSurface::new(buffer, width, height, true)));
            self.cursor_surfaces.push(surface.clone());
            surface
        });

        surface.borrow_mut().set_plane_target(state, self.gpu_fd);
        state.set_offscreen_target(SurfaceHandle::acquire(surface));
        state.force_gpu_rendering();
    }

    /// Replace the plane's proposal entry with its (new) off-screen target
    fn reset_plane_target(&mut self, state: &mut DisplayPlaneState, slot: &mut CommitSlot) {
        self.set_offscreen_plane_target(state);
        if let Some(target) = state.offscreen_target() {
            slot.layer = CommitLayer::Target(target.rc().clone());
        }
    }
}

fn refresh_slot(slots: &mut [CommitSlot], state: &DisplayPlaneState) {
    if let Some(target) = state.offscreen_target() {
        if let Some(slot) = slots.iter_mut().find(|s| s.plane == state.plane()) {
            slot.layer = CommitLayer::Target(target.rc().clone());
        }
    }
}
