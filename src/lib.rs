#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! **scanout: display plane assignment for hardware composition**
//!
//! Given the per-frame layer stack of a display, this crate decides which
//! layers the hardware planes scan out directly and which ones the GPU has to
//! compose into off-screen targets first, minimizing GPU work while respecting
//! plane constraints. Feasibility of a concrete set of bindings is decided by
//! the display driver through an atomic test commit, exposed here as the
//! [`PlaneHandler`](plane::PlaneHandler) trait; off-screen targets are pooled
//! and allocated through a [`SurfaceFactory`](surface::SurfaceFactory).
//!
//! The engine never fails a frame: when the chosen configuration is rejected by
//! the driver it collapses to GPU composition of the whole stack on the primary
//! plane, which is always available.
//!
//! ```no_run
//! use std::os::unix::io::RawFd;
//! use std::sync::Arc;
//!
//! use drm_fourcc::DrmFourcc;
//! use scanout::layer::{Framebuffer, LayerBuffer, OverlayLayer};
//! use scanout::manager::{FrameFlags, ManagerConfig, PlaneManager};
//! use scanout::plane::{DisplayPlane, PlaneCommit, PlaneHandler, PlaneId};
//! use scanout::surface::SurfaceFactory;
//! use scanout::utils::Rectangle;
//!
//! #[derive(Debug)]
//! struct MyBuffer(DrmFourcc);
//!
//! impl LayerBuffer for MyBuffer {
//!     fn format(&self) -> DrmFourcc {
//!         self.0
//!     }
//!     fn framebuffer(&self) -> Option<Framebuffer> {
//!         Some(Framebuffer(1))
//!     }
//!     fn create_framebuffer(&self, _gpu_fd: RawFd) -> Option<Framebuffer> {
//!         Some(Framebuffer(1))
//!     }
//! }
//!
//! struct MyHandler;
//!
//! impl PlaneHandler for MyHandler {
//!     fn populate_planes(
//!         &mut self,
//!     ) -> Result<Vec<DisplayPlane>, Box<dyn std::error::Error + Send + Sync>> {
//!         // ...enumerate the real planes of the display here
//!         Ok(vec![
//!             DisplayPlane::new(PlaneId(10), true),
//!             DisplayPlane::new(PlaneId(11), true),
//!         ])
//!     }
//!     fn test_commit(&self, _commit: &[PlaneCommit]) -> bool {
//!         // ...forward to the driver's atomic test-only commit
//!         true
//!     }
//! }
//!
//! struct MyFactory;
//!
//! impl SurfaceFactory for MyFactory {
//!     fn create_3d_buffer(&mut self, _w: u32, _h: u32, format: DrmFourcc) -> Arc<dyn LayerBuffer> {
//!         Arc::new(MyBuffer(format))
//!     }
//!     fn create_video_buffer(&mut self, _w: u32, _h: u32, format: DrmFourcc) -> Arc<dyn LayerBuffer> {
//!         Arc::new(MyBuffer(format))
//!     }
//! }
//!
//! let mut manager = PlaneManager::new(MyHandler, MyFactory, -1, 1920, 1080, ManagerConfig::default())
//!     .expect("failed to initialize plane manager");
//!
//! let mut layer = OverlayLayer::new(0, Arc::new(MyBuffer(DrmFourcc::Xrgb8888)));
//! layer.display_frame = Rectangle::new((0, 0), (1920, 1080));
//! layer.source_crop = Rectangle::new((0.0, 0.0), (1920.0, 1080.0));
//!
//! let validated = manager.validate_layers(&[layer.clone()], &[], FrameFlags::empty());
//! if validated.render_required {
//!     // ...compose the layers marked gpu_rendered into their targets
//! }
//! let plan = manager.commit_plan(&validated.composition, &[layer], &[]);
//! // ...submit `plan` as the real atomic commit
//! ```

pub mod error;
pub mod layer;
pub mod manager;
pub mod plane;
pub mod state;
pub mod surface;
pub mod utils;
