//! Errors of the assignment engine

/// Errors thrown while constructing a [`PlaneManager`](crate::manager::PlaneManager)
///
/// Per-frame operations never fail; every rejected binding is recovered by
/// falling back to GPU composition.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Plane enumeration returned no planes, so not even the primary plane exists
    #[error("Plane enumeration returned no usable planes")]
    NoPlanes,
    /// The plane handler failed to enumerate the hardware planes
    #[error("Failed to enumerate hardware planes")]
    Enumeration(#[source] Box<dyn std::error::Error + Send + Sync>),
}
