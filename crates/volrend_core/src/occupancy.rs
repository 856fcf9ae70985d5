//! Multi-resolution occupancy index.
//!
//! K concentric cascades, each a G×G×G bit grid in Morton order: bit = 1
//! means "may contain surface", bit = 0 means "provably empty, safe to
//! skip". Cascade `c` covers the cube `[-e, e]³` with
//! `e = min(2^c, bound)`, so successive cascades double in physical size
//! while keeping the same cell count.
//!
//! The grid is allocated once at scene setup and rewritten in place by the
//! external training loop: resample predicted density at cell centers,
//! max-reduce against a decayed running estimate, then threshold the
//! estimates into bits. Marchers never read the grid directly — they take an
//! [`OccupancySnapshot`], an immutable per-epoch copy of the bit arrays, so
//! a maintenance rewrite can never interleave with an in-flight marching
//! call (snapshot-per-epoch, no per-cell locking).

use std::sync::Arc;

use glam::Vec3;

use crate::config::MarchingConfig;
use crate::error::{Error, Result};
use crate::morton::{morton3d, morton3d_invert};

/// Mutable occupancy grid owned by the maintenance side.
#[derive(Clone, Debug)]
pub struct OccupancyGrid {
  k: u32,
  g: u32,
  bound: f32,
  /// Decayed running max of predicted density, one entry per cell,
  /// cascade-major then Morton order.
  density: Vec<f32>,
  /// Packed occupancy bits, same ordering, 8 cells per byte.
  bits: Vec<u8>,
}

impl OccupancyGrid {
  /// Allocate an all-empty grid for the given scene setup.
  pub fn new(config: &MarchingConfig) -> Result<Self> {
    config.validate()?;
    let cells = (config.k as usize) * (config.g as usize).pow(3);
    Ok(Self {
      k: config.k,
      g: config.g,
      bound: config.bound,
      density: vec![0.0; cells],
      bits: vec![0; cells.div_ceil(8)],
    })
  }

  #[inline]
  pub fn cascades(&self) -> u32 {
    self.k
  }

  #[inline]
  pub fn resolution(&self) -> u32 {
    self.g
  }

  /// Cells per cascade (G³).
  #[inline]
  pub fn cells_per_cascade(&self) -> usize {
    (self.g as usize).pow(3)
  }

  /// Half-extent of the cube covered by `cascade`.
  #[inline]
  pub fn cascade_extent(&self, cascade: u32) -> f32 {
    cascade_extent(cascade, self.bound)
  }

  #[inline]
  fn cell_index(&self, cascade: u32, coord: (u32, u32, u32)) -> usize {
    debug_assert!(cascade < self.k);
    debug_assert!(coord.0 < self.g && coord.1 < self.g && coord.2 < self.g);
    cascade as usize * self.cells_per_cascade()
      + morton3d(coord.0, coord.1, coord.2) as usize
  }

  /// Is the cell at `coord` of `cascade` marked occupied?
  #[inline]
  pub fn test(&self, cascade: u32, coord: (u32, u32, u32)) -> bool {
    let idx = self.cell_index(cascade, coord);
    self.bits[idx / 8] & (1 << (idx % 8)) != 0
  }

  /// Set or clear one occupancy bit directly.
  ///
  /// The external loop uses this to pre-clear cells it knows are untrained;
  /// normal maintenance goes through [`update_density`](Self::update_density)
  /// and [`threshold`](Self::threshold).
  pub fn set(&mut self, cascade: u32, coord: (u32, u32, u32), occupied: bool) {
    let idx = self.cell_index(cascade, coord);
    if occupied {
      self.bits[idx / 8] |= 1 << (idx % 8);
    } else {
      self.bits[idx / 8] &= !(1 << (idx % 8));
    }
  }

  /// Mark every cell of every cascade occupied (dense marching) or empty.
  pub fn fill(&mut self, occupied: bool) {
    self.bits.fill(if occupied { 0xff } else { 0 });
  }

  /// World-space center of the cell at Morton index `cell` of `cascade`.
  ///
  /// This is where the external loop evaluates the predictor when
  /// resampling the grid.
  pub fn cell_center(&self, cascade: u32, cell: u32) -> Vec3 {
    let (x, y, z) = morton3d_invert(cell);
    let e = self.cascade_extent(cascade);
    let cell_size = 2.0 * e / self.g as f32;
    Vec3::new(x as f32, y as f32, z as f32) * cell_size - e + 0.5 * cell_size
  }

  /// Fold freshly predicted densities into the running estimates.
  ///
  /// For each `(cell, density)` pair: `est = max(est * decay, density)`.
  /// The decayed max keeps cells alive briefly after the predictor stops
  /// reporting mass there, which tolerates partially stale queries between
  /// refreshes. `cells` are Morton indices within `cascade`.
  pub fn update_density(
    &mut self,
    cascade: u32,
    cells: &[u32],
    densities: &[f32],
    decay: f32,
  ) -> Result<()> {
    if densities.len() != cells.len() {
      return Err(Error::ShapeMismatch {
        what: "densities",
        got: densities.len(),
        expected: cells.len(),
      });
    }
    let base = cascade as usize * self.cells_per_cascade();
    for (&cell, &d) in cells.iter().zip(densities) {
      let est = &mut self.density[base + cell as usize];
      *est = (*est * decay).max(d.max(0.0));
    }
    Ok(())
  }

  /// Mean of the positive density estimates (0 when all cells are empty).
  pub fn mean_density(&self) -> f32 {
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for &d in &self.density {
      if d > 0.0 {
        sum += d as f64;
        n += 1;
      }
    }
    if n == 0 {
      0.0
    } else {
      (sum / n as f64) as f32
    }
  }

  /// Rewrite all occupancy bits from the density estimates.
  ///
  /// A cell is occupied iff its estimate exceeds
  /// `min(density_threshold, mean_density)` — the mean clamp keeps sparse
  /// scenes from going entirely empty early in training when every estimate
  /// is still below the nominal threshold.
  #[cfg_attr(
    feature = "tracing",
    tracing::instrument(skip_all, name = "occupancy::threshold")
  )]
  pub fn threshold(&mut self, density_threshold: f32) {
    let cutoff = density_threshold.min(self.mean_density());
    for (i, &d) in self.density.iter().enumerate() {
      if d > cutoff {
        self.bits[i / 8] |= 1 << (i % 8);
      } else {
        self.bits[i / 8] &= !(1 << (i % 8));
      }
    }
  }

  /// Publish an immutable snapshot of the current bits for marchers.
  ///
  /// Readers holding a snapshot always see one complete, self-consistent
  /// grid generation; the next `threshold` rewrite produces a new
  /// generation without touching snapshots already handed out.
  pub fn snapshot(&self) -> OccupancySnapshot {
    OccupancySnapshot {
      k: self.k,
      g: self.g,
      bound: self.bound,
      bits: Arc::from(self.bits.as_slice()),
    }
  }
}

/// Immutable per-epoch view of the occupancy bits, shared by marchers.
#[derive(Clone, Debug)]
pub struct OccupancySnapshot {
  k: u32,
  g: u32,
  bound: f32,
  bits: Arc<[u8]>,
}

impl OccupancySnapshot {
  #[inline]
  pub fn cascades(&self) -> u32 {
    self.k
  }

  #[inline]
  pub fn resolution(&self) -> u32 {
    self.g
  }

  #[inline]
  pub fn cascade_extent(&self, cascade: u32) -> f32 {
    cascade_extent(cascade, self.bound)
  }

  /// Cascade covering `pos`: the smallest shell whose cube contains it,
  /// clamped to `[0, K)`.
  #[inline]
  pub fn cascade_for(&self, pos: Vec3) -> u32 {
    if self.k == 1 {
      return 0;
    }
    let mx = pos.abs().max_element();
    // frexp exponent: mx = m * 2^e with m in [0.5, 1), so cascade e covers
    // max coordinates up to 2^e.
    let e = if mx > 0.0 {
      (mx.to_bits() >> 23) as i32 - 126
    } else {
      0
    };
    e.clamp(0, self.k as i32 - 1) as u32
  }

  /// Is the grid cell containing `pos` (within `cascade`) occupied?
  #[inline]
  pub fn occupied_at(&self, cascade: u32, pos: Vec3) -> bool {
    let e = self.cascade_extent(cascade);
    let g = self.g as f32;
    // Map [-e, e] to [0, G), clamped: boundary positions read the edge cell.
    let grid = ((pos / e) * 0.5 + 0.5) * g;
    let x = (grid.x as i64).clamp(0, self.g as i64 - 1) as u32;
    let y = (grid.y as i64).clamp(0, self.g as i64 - 1) as u32;
    let z = (grid.z as i64).clamp(0, self.g as i64 - 1) as u32;
    let idx = cascade as usize * (self.g as usize).pow(3) + morton3d(x, y, z) as usize;
    self.bits[idx / 8] & (1 << (idx % 8)) != 0
  }
}

/// Half-extent of cascade `c` for a scene with the given `bound`.
#[inline]
fn cascade_extent(cascade: u32, bound: f32) -> f32 {
  ((1u32 << cascade.min(30)) as f32).min(bound)
}

#[cfg(test)]
#[path = "occupancy_test.rs"]
mod occupancy_test;
