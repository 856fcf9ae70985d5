//! Static marching/compositing parameters.
//!
//! One `MarchingConfig` describes a scene setup and is shared by every
//! marching and compositing call for that scene. All fields are structural:
//! they are validated once at call entry and cannot be partially valid, so
//! validation failures are hard errors rather than per-sample guards.

use crate::error::{Error, Result};

/// √3 — the length of the diagonal of the unit cube.
pub const SQRT3: f32 = 1.732_050_8;

/// Transmittance below which a ray is considered saturated.
///
/// Used by the batched compositor to stop accumulating weightless samples
/// and by the streaming compositor as its termination test.
pub const TRANSMITTANCE_EPSILON: f32 = 1e-4;

/// Static parameters for ray marching and compositing.
///
/// Defaults follow the NGP paper: 1024 diagonal steps, 128³ grids, a single
/// cascade, and a 1/256 step-size portion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarchingConfig {
  /// Global sample budget per batched marching call.
  pub total_samples: usize,

  /// Number of steps it takes to cross the unit-cube diagonal at the
  /// minimal step size: `dt_min = √3 / diagonal_n_steps`.
  pub diagonal_n_steps: u32,

  /// Number of occupancy cascades (concentric shells), `K`.
  pub k: u32,

  /// Per-cascade grid resolution, `G` (must be a power of two).
  pub g: u32,

  /// Half-length of the longest axis of the scene bounding box.
  /// The `bound` of the box `[-1, 1]³` is 1.
  pub bound: f32,

  /// Step sizes grow as `t * stepsize_portion` once past `dt_min`.
  pub stepsize_portion: f32,

  /// Per-lane step cap for one streaming marching round.
  pub march_steps_cap: u32,
}

impl Default for MarchingConfig {
  fn default() -> Self {
    Self {
      total_samples: 1 << 20,
      diagonal_n_steps: 1024,
      k: 1,
      g: 128,
      bound: 1.0,
      stepsize_portion: 1.0 / 256.0,
      march_steps_cap: 8,
    }
  }
}

impl MarchingConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_total_samples(mut self, total_samples: usize) -> Self {
    self.total_samples = total_samples;
    self
  }

  pub fn with_diagonal_n_steps(mut self, diagonal_n_steps: u32) -> Self {
    self.diagonal_n_steps = diagonal_n_steps;
    self
  }

  pub fn with_cascades(mut self, k: u32) -> Self {
    self.k = k;
    self
  }

  pub fn with_grid_resolution(mut self, g: u32) -> Self {
    self.g = g;
    self
  }

  pub fn with_bound(mut self, bound: f32) -> Self {
    self.bound = bound;
    self
  }

  pub fn with_stepsize_portion(mut self, stepsize_portion: f32) -> Self {
    self.stepsize_portion = stepsize_portion;
    self
  }

  pub fn with_march_steps_cap(mut self, march_steps_cap: u32) -> Self {
    self.march_steps_cap = march_steps_cap;
    self
  }

  /// Validate all structural constraints.
  ///
  /// Called at the entry of every marching/compositing operation.
  pub fn validate(&self) -> Result<()> {
    if self.total_samples == 0 {
      return Err(Error::InvalidConfig {
        field: "total_samples",
        reason: "must be positive",
      });
    }
    if self.diagonal_n_steps == 0 {
      return Err(Error::InvalidConfig {
        field: "diagonal_n_steps",
        reason: "must be positive",
      });
    }
    if self.k == 0 {
      return Err(Error::InvalidConfig {
        field: "k",
        reason: "must be positive",
      });
    }
    if self.g == 0 || !self.g.is_power_of_two() {
      return Err(Error::InvalidConfig {
        field: "g",
        reason: "must be a positive power of two",
      });
    }
    if self.g > crate::morton::MAX_RESOLUTION {
      return Err(Error::InvalidConfig {
        field: "g",
        reason: "exceeds the Morton coordinate range",
      });
    }
    if !(self.bound > 0.0) {
      return Err(Error::InvalidConfig {
        field: "bound",
        reason: "must be positive",
      });
    }
    if !(self.stepsize_portion >= 0.0) {
      return Err(Error::InvalidConfig {
        field: "stepsize_portion",
        reason: "must be non-negative",
      });
    }
    if self.march_steps_cap == 0 {
      return Err(Error::InvalidConfig {
        field: "march_steps_cap",
        reason: "must be positive",
      });
    }
    Ok(())
  }

  /// Minimal marching step: `√3 / diagonal_n_steps`.
  #[inline]
  pub fn dt_min(&self) -> f32 {
    SQRT3 / self.diagonal_n_steps as f32
  }

  /// Maximal marching step: the minimal step scaled to the scene diameter.
  #[inline]
  pub fn dt_max(&self) -> f32 {
    2.0 * self.bound * self.dt_min()
  }

  /// Step size at distance `t` from the ray origin.
  ///
  /// `clamp(t * stepsize_portion, dt_min, dt_max)` — steps grow linearly
  /// with distance (intercept theorem, NGP appendix E.1). Scenes with
  /// `bound < 0.5` have `dt_max < dt_min`; the ceiling wins there and every
  /// step is `dt_max`.
  #[inline]
  pub fn step_size(&self, t: f32) -> f32 {
    (t * self.stepsize_portion)
      .max(self.dt_min())
      .min(self.dt_max())
  }

  /// Density above which a grid cell counts as occupied.
  ///
  /// The 0.01 opacity floor divided by the minimal step size: a cell whose
  /// density cannot contribute 1% alpha over one minimal step is empty.
  #[inline]
  pub fn density_threshold(&self) -> f32 {
    0.01 * self.diagonal_n_steps as f32 / (2.0 * self.bound.min(1.0) * SQRT3)
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
