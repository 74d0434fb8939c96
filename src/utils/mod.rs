//! Geometry helpers shared across the crate

mod geometry;

pub use self::geometry::{Buffer, Coordinate, Physical, Point, Rectangle, Size, Transform};
