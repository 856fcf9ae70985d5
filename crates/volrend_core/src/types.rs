//! Core data types: rays, predictor I/O, and the packed sample arena.

use glam::Vec3;

/// One camera ray, already intersected with the scene bounding box.
///
/// `t_start`/`t_end` are the entry/exit times along the box; a ray with
/// `t_start >= t_end` misses the scene and marches to zero samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
  /// Ray origin.
  pub origin: Vec3,
  /// Unit direction.
  pub dir: Vec3,
  /// Time of entering the scene bounding box.
  pub t_start: f32,
  /// Time of leaving the scene bounding box.
  pub t_end: f32,
  /// Opaque per-ray index into the image/view it belongs to.
  pub id: u32,
}

impl Ray {
  pub fn new(origin: Vec3, dir: Vec3, t_start: f32, t_end: f32) -> Self {
    Self {
      origin,
      dir,
      t_start,
      t_end,
      id: 0,
    }
  }

  pub fn with_id(mut self, id: u32) -> Self {
    self.id = id;
    self
  }

  /// Point at distance `t` from the origin.
  #[inline(always)]
  pub fn at(&self, t: f32) -> Vec3 {
    self.origin + self.dir * t
  }
}

/// Predictor output for one sample: density plus color.
///
/// Opaque to this engine — produced by the external density/color predictor
/// for each entry of a [`SampleBuffer`]. Density is clipped non-negative at
/// the point of use.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DensityRgb {
  /// Volume density (σ). May arrive negative from the predictor.
  pub density: f32,
  /// Emitted color.
  pub rgb: Vec3,
}

impl DensityRgb {
  pub fn new(density: f32, rgb: Vec3) -> Self {
    Self { density, rgb }
  }
}

/// Composited output for one ray: color plus estimated depth.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RgbD {
  pub rgb: Vec3,
  pub depth: f32,
}

/// Fixed-capacity arena of marched samples, packed in ray order.
///
/// Irregular per-ray sample counts are flattened into one set of parallel
/// arrays with a separate offsets table — never nested per-ray containers —
/// so memory layout stays predictable and per-ray processing can run on
/// independent parallel lanes.
///
/// Invariants:
/// - `start_idx` is the exclusive prefix sum of `n_samples`
/// - `sum(n_samples) == valid entries <= capacity`
/// - entries past each ray's valid prefix (and past the global capacity)
///   are zero-filled and excluded from compositing and gradients
#[derive(Clone, Debug)]
pub struct SampleBuffer {
  /// Sample positions, `capacity` entries.
  pub xyzs: Vec<Vec3>,
  /// Sample directions (copies of the owning ray's direction).
  pub dirs: Vec<Vec3>,
  /// Probability-mass width of each sample. Not generally the gap between
  /// consecutive `z` values: empty-space skips widen the gap but not `ds`.
  pub dss: Vec<f32>,
  /// Distance of each sample from its ray origin.
  pub z_vals: Vec<f32>,
  /// Number of samples actually written for each ray.
  pub n_samples: Vec<u32>,
  /// Offset of each ray's first sample (exclusive prefix sum).
  pub start_idx: Vec<u32>,
}

impl SampleBuffer {
  /// Allocate a zero-filled arena for `n_rays` rays and `capacity` samples.
  pub fn new(n_rays: usize, capacity: usize) -> Self {
    Self {
      xyzs: vec![Vec3::ZERO; capacity],
      dirs: vec![Vec3::ZERO; capacity],
      dss: vec![0.0; capacity],
      z_vals: vec![0.0; capacity],
      n_samples: vec![0; n_rays],
      start_idx: vec![0; n_rays],
    }
  }

  /// Total sample capacity of the arena.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.xyzs.len()
  }

  /// Number of rays described by the offsets table.
  #[inline]
  pub fn n_rays(&self) -> usize {
    self.n_samples.len()
  }

  /// Number of valid (written) samples across all rays.
  #[inline]
  pub fn total_valid(&self) -> usize {
    self.n_samples.iter().map(|&n| n as usize).sum()
  }

  /// Half-open arena range owned by ray `i`.
  #[inline]
  pub fn ray_range(&self, i: usize) -> std::ops::Range<usize> {
    let start = self.start_idx[i] as usize;
    start..start + self.n_samples[i] as usize
  }

  /// Zero all buffers, preserving capacity.
  pub fn clear(&mut self) {
    self.xyzs.fill(Vec3::ZERO);
    self.dirs.fill(Vec3::ZERO);
    self.dss.fill(0.0);
    self.z_vals.fill(0.0);
    self.n_samples.fill(0);
    self.start_idx.fill(0);
  }
}

/// Lane marker for "no ray assigned".
pub const INVALID_RAY: u32 = u32::MAX;

/// Per-ray state threaded through streaming (inference) rounds.
///
/// Outlives any single marching or compositing call: the marcher advances
/// the `t` cursors, the compositor folds new samples into `transmittance`
/// and `rgbd` and raises `terminated` flags, and the dispatch counter pulls
/// fresh rays into freed lanes. Exclusively owned by one in-flight round.
#[derive(Clone, Debug)]
pub struct StreamingState {
  /// Resumable marching cursor per global ray.
  pub t: Vec<f32>,
  /// Accumulated transmittance per global ray, starts at 1.
  pub transmittance: Vec<f32>,
  /// Accumulated color + depth per global ray.
  pub rgbd: Vec<RgbD>,
  /// Global termination mask.
  pub terminated: Vec<bool>,
  /// Next ray index to dispatch into a freed lane.
  pub counter: usize,
  /// Lane → global ray slot mapping ([`INVALID_RAY`] = idle lane).
  pub indices: Vec<u32>,
}

impl StreamingState {
  /// State for rendering `rays` with `n_lanes` parallel lanes per round.
  pub fn new(rays: &[Ray], n_lanes: usize) -> Self {
    Self {
      t: rays.iter().map(|r| r.t_start).collect(),
      transmittance: vec![1.0; rays.len()],
      rgbd: vec![RgbD::default(); rays.len()],
      terminated: vec![false; rays.len()],
      counter: 0,
      indices: vec![INVALID_RAY; n_lanes],
    }
  }

  #[inline]
  pub fn n_rays(&self) -> usize {
    self.t.len()
  }

  #[inline]
  pub fn n_lanes(&self) -> usize {
    self.indices.len()
  }

  /// True once every ray has been dispatched and terminated.
  pub fn all_terminated(&self) -> bool {
    self.counter >= self.n_rays()
      && self
        .indices
        .iter()
        .all(|&i| i == INVALID_RAY || self.terminated[i as usize])
  }
}

/// Scratch buffers for one streaming round, lane-major.
///
/// Peak memory is `n_lanes × march_steps_cap` samples regardless of the
/// total ray count. Reused across rounds; the marcher zero-fills each
/// lane's unused tail.
#[derive(Clone, Debug)]
pub struct RoundBuffers {
  pub xyzs: Vec<Vec3>,
  pub dirs: Vec<Vec3>,
  pub dss: Vec<f32>,
  pub z_vals: Vec<f32>,
  /// Samples written per lane this round.
  pub n_samples: Vec<u32>,
  cap: usize,
}

impl RoundBuffers {
  pub fn new(n_lanes: usize, march_steps_cap: usize) -> Self {
    let len = n_lanes * march_steps_cap;
    Self {
      xyzs: vec![Vec3::ZERO; len],
      dirs: vec![Vec3::ZERO; len],
      dss: vec![0.0; len],
      z_vals: vec![0.0; len],
      n_samples: vec![0; n_lanes],
      cap: march_steps_cap,
    }
  }

  /// Per-lane step cap these buffers were sized for.
  #[inline]
  pub fn march_steps_cap(&self) -> usize {
    self.cap
  }

  #[inline]
  pub fn n_lanes(&self) -> usize {
    self.n_samples.len()
  }

  /// Arena range owned by `lane` (full cap, valid prefix is
  /// `n_samples[lane]`).
  #[inline]
  pub fn lane_range(&self, lane: usize) -> std::ops::Range<usize> {
    lane * self.cap..(lane + 1) * self.cap
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
