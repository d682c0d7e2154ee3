//! Height map terrain data.
//!
//! A height map is a regular grid of heights over the local XY plane, with
//! heights along Z. The grid is centered on the local origin:
//!
//! ```text
//!    Z (up)
//!    │    ╱────╲
//!    │   ╱      ╲
//!    │  ╱        ╲
//!    └──────┼──────→ X
//!  -width/2  0  +width/2
//! ```
//!
//! - X spans `[-width/2, width/2]` with `nx` samples
//! - Y spans `[-depth/2, depth/2]` with `ny` samples
//!
//! Queries outside the grid clamp to the nearest edge sample, so the terrain
//! extends as a flat skirt at the border heights.

// Grid indices are small and clamped before every cast.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use nalgebra::{Point3, Vector3};
use sim_types::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Grid of terrain heights.
///
/// Heights are stored row-major with X varying fastest:
/// `heights[j * nx + i]` is the sample at column `i`, row `j`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightmapData {
    heights: Vec<f64>,
    nx: usize,
    ny: usize,
    width: f64,
    depth: f64,
    min_height: f64,
    max_height: f64,
}

impl HeightmapData {
    /// Create a height map from row-major samples.
    ///
    /// Fails if there are fewer than two samples per axis, if the sample count
    /// does not match `nx * ny`, if an extent is not positive, or if a height
    /// is not finite.
    pub fn new(heights: Vec<f64>, nx: usize, ny: usize, width: f64, depth: f64) -> Result<Self> {
        if nx < 2 || ny < 2 {
            return Err(SimError::invalid_config(format!(
                "heightmap needs at least 2x2 samples, got {nx}x{ny}"
            )));
        }
        if heights.len() != nx * ny {
            return Err(SimError::invalid_config(format!(
                "heightmap has {} samples, expected {nx}x{ny}",
                heights.len()
            )));
        }
        if !(width > 0.0 && depth > 0.0) {
            return Err(SimError::invalid_config(
                "heightmap extents must be positive",
            ));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(SimError::invalid_config("heightmap heights must be finite"));
        }

        let (min_height, max_height) = heights
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });

        Ok(Self {
            heights,
            nx,
            ny,
            width,
            depth,
            min_height,
            max_height,
        })
    }

    /// Flat terrain at a constant height.
    pub fn flat(nx: usize, ny: usize, width: f64, depth: f64, height: f64) -> Result<Self> {
        Self::new(vec![height; nx * ny], nx, ny, width, depth)
    }

    /// Sample a height function at the grid vertices.
    ///
    /// The function receives local `(x, y)` coordinates.
    pub fn from_fn<F>(nx: usize, ny: usize, width: f64, depth: f64, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        let dx = width / (nx.max(2) - 1) as f64;
        let dy = depth / (ny.max(2) - 1) as f64;
        let mut heights = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                heights.push(f(
                    i as f64 * dx - 0.5 * width,
                    j as f64 * dy - 0.5 * depth,
                ));
            }
        }
        Self::new(heights, nx, ny, width, depth)
    }

    /// Samples along X.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Samples along Y.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Extent along X.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Extent along Y.
    #[must_use]
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Lowest sample.
    #[must_use]
    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    /// Highest sample.
    #[must_use]
    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    fn dx(&self) -> f64 {
        self.width / (self.nx - 1) as f64
    }

    fn dy(&self) -> f64 {
        self.depth / (self.ny - 1) as f64
    }

    /// Height sample at grid indices, `None` outside the grid.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        (i < self.nx && j < self.ny).then(|| self.heights[j * self.nx + i])
    }

    /// Local position of a grid vertex.
    #[must_use]
    pub fn vertex(&self, i: usize, j: usize) -> Option<Point3<f64>> {
        let h = self.get(i, j)?;
        Some(Point3::new(
            i as f64 * self.dx() - 0.5 * self.width,
            j as f64 * self.dy() - 0.5 * self.depth,
            h,
        ))
    }

    /// Cell containing `(x, y)` after clamping, and the fractional position
    /// inside it.
    fn locate(&self, x: f64, y: f64) -> (usize, usize, f64, f64) {
        let gx = ((x + 0.5 * self.width) / self.dx()).clamp(0.0, (self.nx - 1) as f64);
        let gy = ((y + 0.5 * self.depth) / self.dy()).clamp(0.0, (self.ny - 1) as f64);
        let i = (gx.floor() as usize).min(self.nx - 2);
        let j = (gy.floor() as usize).min(self.ny - 2);
        (i, j, gx - i as f64, gy - j as f64)
    }

    fn corners(&self, i: usize, j: usize) -> [f64; 4] {
        let row = j * self.nx;
        let next = (j + 1) * self.nx;
        [
            self.heights[row + i],
            self.heights[row + i + 1],
            self.heights[next + i],
            self.heights[next + i + 1],
        ]
    }

    /// Bilinearly interpolated height at local `(x, y)`.
    #[must_use]
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        let (i, j, fx, fy) = self.locate(x, y);
        let [h00, h10, h01, h11] = self.corners(i, j);
        let h0 = h00 + fx * (h10 - h00);
        let h1 = h01 + fx * (h11 - h01);
        h0 + fy * (h1 - h0)
    }

    /// Slope `(∂h/∂x, ∂h/∂y)` of the bilinear patch under `(x, y)`.
    ///
    /// Zero outside the grid, where the skirt is flat.
    #[must_use]
    pub fn gradient(&self, x: f64, y: f64) -> (f64, f64) {
        let outside_x = x.abs() > 0.5 * self.width;
        let outside_y = y.abs() > 0.5 * self.depth;
        let (i, j, fx, fy) = self.locate(x, y);
        let [h00, h10, h01, h11] = self.corners(i, j);
        let gx = if outside_x {
            0.0
        } else {
            ((h10 - h00) * (1.0 - fy) + (h11 - h01) * fy) / self.dx()
        };
        let gy = if outside_y {
            0.0
        } else {
            ((h01 - h00) * (1.0 - fx) + (h11 - h10) * fx) / self.dy()
        };
        (gx, gy)
    }

    /// Upward unit surface normal at local `(x, y)`.
    #[must_use]
    pub fn normal(&self, x: f64, y: f64) -> Vector3<f64> {
        let (gx, gy) = self.gradient(x, y);
        Vector3::new(-gx, -gy, 1.0).normalize()
    }

    /// Height of a local point above the terrain, measured along Z.
    ///
    /// Negative below the surface.
    #[must_use]
    pub fn height_above(&self, p: &Point3<f64>) -> f64 {
        p.z - self.height_at(p.x, p.y)
    }

    /// Inclusive grid index range covering `[lo, hi]` along X, clamped to the
    /// grid. `None` when the interval misses the grid entirely.
    #[must_use]
    pub fn column_range(&self, lo: f64, hi: f64) -> Option<(usize, usize)> {
        Self::index_range(lo + 0.5 * self.width, hi + 0.5 * self.width, self.dx(), self.nx)
    }

    /// Inclusive grid index range covering `[lo, hi]` along Y.
    #[must_use]
    pub fn row_range(&self, lo: f64, hi: f64) -> Option<(usize, usize)> {
        Self::index_range(lo + 0.5 * self.depth, hi + 0.5 * self.depth, self.dy(), self.ny)
    }

    fn index_range(lo: f64, hi: f64, spacing: f64, n: usize) -> Option<(usize, usize)> {
        let last = (n - 1) as f64;
        let lo = lo / spacing;
        let hi = hi / spacing;
        if !(hi >= 0.0 && lo <= last) {
            return None;
        }
        Some((
            lo.floor().clamp(0.0, last) as usize,
            (hi.floor() + 1.0).clamp(0.0, last) as usize,
        ))
    }

    /// Grid vertices whose XY position falls in the (clamped) box
    /// `[lo, hi]`. Z bounds are ignored.
    pub fn vertices_in(
        &self,
        lo: &Point3<f64>,
        hi: &Point3<f64>,
    ) -> impl Iterator<Item = Point3<f64>> + '_ {
        let cols = self.column_range(lo.x, hi.x);
        let rows = self.row_range(lo.y, hi.y);
        let (ci, cj) = match (cols, rows) {
            (Some(c), Some(r)) => (c.0..=c.1, r.0..=r.1),
            // Empty ranges.
            _ => (1..=0, 1..=0),
        };
        cj.flat_map(move |j| ci.clone().filter_map(move |i| self.vertex(i, j)))
    }

    /// Every grid vertex.
    pub fn vertices(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        (0..self.ny).flat_map(move |j| (0..self.nx).filter_map(move |i| self.vertex(i, j)))
    }
}
