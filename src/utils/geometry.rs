use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

/// Type-level marker for the physical (display) coordinate space
#[derive(Debug)]
pub struct Physical;

/// Type-level marker for the buffer coordinate space
#[derive(Debug)]
pub struct Buffer;

/// Trait for types serving as a coordinate for the geometry utils
pub trait Coordinate:
    Sized + Add<Self, Output = Self> + Sub<Self, Output = Self> + PartialOrd + Default + Copy + fmt::Debug
{
    /// A Coordinate that is 0
    const ZERO: Self;

    /// Compare and return the smaller one
    fn min(self, other: Self) -> Self {
        if self < other {
            self
        } else {
            other
        }
    }

    /// Compare and return the larger one
    fn max(self, other: Self) -> Self {
        if self > other {
            self
        } else {
            other
        }
    }
}

impl Coordinate for i32 {
    const ZERO: i32 = 0;
}

impl Coordinate for f64 {
    const ZERO: f64 = 0.0;
}

/// A point as defined by its x and y coordinates in some coordinate space
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: PhantomData<Kind>,
}

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Point<N, Kind> {
        Point {
            x,
            y,
            _kind: PhantomData,
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Point<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<N: Copy, Kind> Clone for Point<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<N: Copy, Kind> Copy for Point<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Point<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<N: Default, Kind> Default for Point<N, Kind> {
    fn default() -> Self {
        Point {
            x: N::default(),
            y: N::default(),
            _kind: PhantomData,
        }
    }
}

/// A size as defined by its width and height in some coordinate space
pub struct Size<N, Kind> {
    /// horizontal extent
    pub w: N,
    /// vertical extent
    pub h: N,
    _kind: PhantomData<Kind>,
}

impl<N, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Size<N, Kind> {
        Size {
            w,
            h,
            _kind: PhantomData,
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Size<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Size")
            .field("w", &self.w)
            .field("h", &self.h)
            .finish()
    }
}

impl<N: Copy, Kind> Clone for Size<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<N: Copy, Kind> Copy for Size<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Size<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.w == other.w && self.h == other.h
    }
}

impl<N: Default, Kind> Default for Size<N, Kind> {
    fn default() -> Self {
        Size {
            w: N::default(),
            h: N::default(),
            _kind: PhantomData,
        }
    }
}

/// A rectangle defined by its top-left corner and dimensions in some coordinate space
pub struct Rectangle<N, Kind> {
    /// Location of the top-left corner of the rectangle
    pub loc: Point<N, Kind>,
    /// Size of the rectangle, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its dimensions
    #[inline]
    pub fn new(loc: impl Into<Point<N, Kind>>, size: impl Into<Size<N, Kind>>) -> Self {
        Rectangle {
            loc: loc.into(),
            size: size.into(),
        }
    }

    /// Create a new [`Rectangle`] with location and size zero
    #[inline]
    pub fn zero() -> Self {
        Rectangle {
            loc: (N::ZERO, N::ZERO).into(),
            size: (N::ZERO, N::ZERO).into(),
        }
    }

    /// Create a new [`Rectangle`] from the coordinates of its top-left and bottom-right corners
    #[inline]
    pub fn from_extremities(
        topleft: impl Into<Point<N, Kind>>,
        bottomright: impl Into<Point<N, Kind>>,
    ) -> Self {
        let topleft = topleft.into();
        let bottomright = bottomright.into();
        Rectangle {
            loc: topleft,
            size: (bottomright.x - topleft.x, bottomright.y - topleft.y).into(),
        }
    }

    /// Merge two [`Rectangle`]s into the smallest rectangle containing both
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        Rectangle::from_extremities(
            (self.loc.x.min(other.loc.x), self.loc.y.min(other.loc.y)),
            (
                (self.loc.x + self.size.w).max(other.loc.x + other.size.w),
                (self.loc.y + self.size.h).max(other.loc.y + other.size.h),
            ),
        )
    }

    /// Checks whether a given [`Rectangle`] overlaps with this one
    ///
    /// Touching rectangles do not count as overlapping.
    #[inline]
    pub fn overlaps(self, other: impl Into<Rectangle<N, Kind>>) -> bool {
        let other = other.into();

        self.loc.x < other.loc.x + other.size.w
            && other.loc.x < self.loc.x + self.size.w
            && self.loc.y < other.loc.y + other.size.h
            && other.loc.y < self.loc.y + self.size.h
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rectangle")
            .field("loc", &self.loc)
            .field("size", &self.size)
            .finish()
    }
}

impl<N: Copy, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Default::default(),
            size: Default::default(),
        }
    }
}

/// Possible transformations of a buffer on its way to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    /// Identity transformation (buffer is displayed as-is)
    #[default]
    Normal,
    /// Rotation by 90 degrees counter-clockwise
    Rotate90,
    /// Rotation by 180 degrees counter-clockwise
    Rotate180,
    /// Rotation by 270 degrees counter-clockwise
    Rotate270,
    /// Mirror along the vertical axis
    Flipped,
    /// Mirror along the vertical axis, then rotate by 90 degrees
    Flipped90,
    /// Mirror along the vertical axis, then rotate by 180 degrees
    Flipped180,
    /// Mirror along the vertical axis, then rotate by 270 degrees
    Flipped270,
}

#[cfg(test)]
mod tests {
    use super::{Physical, Rectangle};

    #[test]
    fn rectangle_merge() {
        let a = Rectangle::<i32, Physical>::new((0, 0), (100, 50));
        let b = Rectangle::<i32, Physical>::new((50, 25), (100, 50));

        assert_eq!(Rectangle::new((0, 0), (150, 75)), a.merge(b));
    }

    #[test]
    fn rectangle_merge_disjoint() {
        let a = Rectangle::<i32, Physical>::new((10, 10), (10, 10));
        let b = Rectangle::<i32, Physical>::new((40, 40), (10, 10));

        assert_eq!(Rectangle::new((10, 10), (40, 40)), a.merge(b));
    }

    #[test]
    fn rectangle_overlaps() {
        let a = Rectangle::<i32, Physical>::new((0, 0), (20, 20));

        assert!(a.overlaps(Rectangle::new((10, 10), (20, 20))));
        assert!(!a.overlaps(Rectangle::new((20, 0), (20, 20))));
        assert!(!a.overlaps(Rectangle::new((30, 30), (5, 5))));
    }

    #[test]
    fn rectangle_from_extremities() {
        let rect = Rectangle::<f64, Physical>::from_extremities((10.0, 20.0), (40.0, 60.0));

        assert_eq!(Rectangle::new((10.0, 20.0), (30.0, 40.0)), rect);
    }
}
