//! Ray marchers: where along each ray to sample.
//!
//! Both marchers walk rays through the occupancy snapshot with the same
//! step rule: at distance `t` the step is `step_size(t) = clamp(t ·
//! stepsize_portion, dt_min, dt_max)`, applied whether the current cell is
//! occupied (emit a sample, then step) or empty (step without emitting —
//! empty-space skipping, with larger jumps far from the camera).
//!
//! The batched marcher ([`march_rays`]) packs every ray's samples into one
//! fixed-capacity arena under the global sample budget in three passes:
//!
//! 1. count each ray's natural samples (parallel, read-only)
//! 2. exclusive prefix sum over counts, clamped to the budget (sequential —
//!    this makes truncation deterministic in ray order)
//! 3. re-march each ray into its disjoint arena slice (parallel)
//!
//! The streaming marcher ([`march_rays_inference`]) instead advances a
//! bounded pool of lanes by at most `march_steps_cap` steps per call,
//! carrying resumable cursors in [`StreamingState`] so compositing can
//! retire rays between rounds.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::MarchingConfig;
use crate::error::{Error, Result};
use crate::occupancy::OccupancySnapshot;
use crate::types::{Ray, RoundBuffers, SampleBuffer, StreamingState, INVALID_RAY};

/// Directions shorter than this are treated as degenerate: the ray emits
/// zero samples rather than erroring out of the whole batch.
const DIR_EPSILON_SQ: f32 = 1e-12;

/// Output of one batched marching call.
#[derive(Clone, Debug)]
pub struct MarchOutput {
  /// Total samples all rays would naturally emit, before any truncation.
  /// May exceed the arena capacity; the batch-size controller uses it to
  /// resize the next request.
  pub measured_batch_size_before_compaction: usize,
  /// The packed samples plus per-ray offsets.
  pub buffer: SampleBuffer,
}

/// Walk one ray through the grid, calling `emit` for each occupied-cell
/// sample, up to `cap` samples. Returns the emitted count and the cursor
/// position after the walk.
#[inline]
fn walk_ray<F: FnMut(Vec3, f32, f32)>(
  ray: &Ray,
  t_from: f32,
  grid: &OccupancySnapshot,
  config: &MarchingConfig,
  cap: usize,
  mut emit: F,
) -> (usize, f32) {
  if ray.dir.length_squared() < DIR_EPSILON_SQ {
    return (0, ray.t_end);
  }
  let mut t = t_from;
  let mut n = 0usize;
  while t < ray.t_end && n < cap {
    let pos = ray.at(t);
    let ds = config.step_size(t);
    let cascade = grid.cascade_for(pos);
    if grid.occupied_at(cascade, pos) {
      emit(pos, ds, t);
      n += 1;
    }
    t += ds;
  }
  (n, t)
}

fn check_grid(grid: &OccupancySnapshot, config: &MarchingConfig) -> Result<()> {
  if grid.cascades() != config.k {
    return Err(Error::ShapeMismatch {
      what: "occupancy snapshot cascades",
      got: grid.cascades() as usize,
      expected: config.k as usize,
    });
  }
  if grid.resolution() != config.g {
    return Err(Error::ShapeMismatch {
      what: "occupancy snapshot resolution",
      got: grid.resolution() as usize,
      expected: config.g as usize,
    });
  }
  Ok(())
}

/// March a batch of rays into a packed sample arena (training path).
///
/// `jitters` decorrelate step boundaries across rays: ray `i` starts at
/// `t_start + jitters[i] * dt_min`.
///
/// Rays are processed in input order; once the `total_samples` budget is
/// exhausted, later rays are silently truncated (deterministic policy, not
/// an error — the true demand is reported in
/// `measured_batch_size_before_compaction`). Over many steps this favors
/// early-indexed rays, so callers should shuffle ray order per step.
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, name = "marching::march_rays")
)]
pub fn march_rays(
  rays: &[Ray],
  jitters: &[f32],
  grid: &OccupancySnapshot,
  config: &MarchingConfig,
) -> Result<MarchOutput> {
  config.validate()?;
  check_grid(grid, config)?;
  if jitters.len() != rays.len() {
    return Err(Error::ShapeMismatch {
      what: "jitters",
      got: jitters.len(),
      expected: rays.len(),
    });
  }

  let dt_min = config.dt_min();
  let start_of = |i: usize| rays[i].t_start + jitters[i] * dt_min;

  // Pass 1: natural per-ray demand.
  #[cfg(feature = "tracing")]
  let counts = {
    let _span = tracing::info_span!("count_pass").entered();
    count_pass(rays, grid, config, &start_of)
  };
  #[cfg(not(feature = "tracing"))]
  let counts = count_pass(rays, grid, config, &start_of);

  let measured_batch_size_before_compaction: usize = counts.iter().sum();

  // Pass 2: clamped exclusive prefix sum. Later rays lose samples first.
  let capacity = config.total_samples;
  let mut buffer = SampleBuffer::new(rays.len(), capacity);
  let mut offset = 0usize;
  for (i, &natural) in counts.iter().enumerate() {
    let start = offset.min(capacity);
    let allotted = natural.min(capacity - start);
    buffer.start_idx[i] = start as u32;
    buffer.n_samples[i] = allotted as u32;
    offset = start + allotted;
  }

  // Pass 3: re-march into disjoint slices of the arena.
  #[cfg(feature = "tracing")]
  let _span = tracing::info_span!("write_pass").entered();
  let mut lanes = Vec::with_capacity(rays.len());
  {
    let mut xyzs = buffer.xyzs.as_mut_slice();
    let mut dirs = buffer.dirs.as_mut_slice();
    let mut dss = buffer.dss.as_mut_slice();
    let mut z_vals = buffer.z_vals.as_mut_slice();
    for i in 0..rays.len() {
      let n = buffer.n_samples[i] as usize;
      let (x, xr) = xyzs.split_at_mut(n);
      let (d, dr) = dirs.split_at_mut(n);
      let (s, sr) = dss.split_at_mut(n);
      let (z, zr) = z_vals.split_at_mut(n);
      lanes.push((i, x, d, s, z));
      xyzs = xr;
      dirs = dr;
      dss = sr;
      z_vals = zr;
    }
  }
  lanes
    .into_par_iter()
    .for_each(|(i, xyzs, dirs, dss, z_vals)| {
      let ray = &rays[i];
      let cap = xyzs.len();
      if cap == 0 || ray.t_start >= ray.t_end {
        return;
      }
      let mut written = 0usize;
      walk_ray(ray, start_of(i), grid, config, cap, |pos, ds, z| {
        xyzs[written] = pos;
        dirs[written] = ray.dir;
        dss[written] = ds;
        z_vals[written] = z;
        written += 1;
      });
      debug_assert_eq!(written, cap);
    });

  Ok(MarchOutput {
    measured_batch_size_before_compaction,
    buffer,
  })
}

/// Same as [`march_rays`] but also returns wall time in microseconds,
/// ready to feed [`crate::metrics::RenderMetrics::record_march`].
pub fn march_rays_timed(
  rays: &[Ray],
  jitters: &[f32],
  grid: &OccupancySnapshot,
  config: &MarchingConfig,
) -> Result<(MarchOutput, u64)> {
  use web_time::Instant;

  let start = Instant::now();
  let output = march_rays(rays, jitters, grid, config)?;
  Ok((output, start.elapsed().as_micros() as u64))
}

fn count_pass<F: Fn(usize) -> f32 + Sync>(
  rays: &[Ray],
  grid: &OccupancySnapshot,
  config: &MarchingConfig,
  start_of: &F,
) -> Vec<usize> {
  rays
    .par_iter()
    .enumerate()
    .map(|(i, ray)| {
      if ray.t_start >= ray.t_end {
        return 0;
      }
      walk_ray(ray, start_of(i), grid, config, usize::MAX, |_, _, _| {}).0
    })
    .collect()
}

/// Advance the streaming ray pool by one round (inference path).
///
/// Idle lanes (fresh, or whose ray terminated last round) are refilled from
/// the dispatch counter in ray order. Each active lane then marches from its
/// ray's saved cursor, writing at most `march_steps_cap` samples into its
/// slot of `round`, and the cursor is saved back. A lane that writes fewer
/// than `march_steps_cap` samples has exhausted its ray's `t` range.
///
/// Returns the number of active lanes this round; 0 means every dispatched
/// ray has terminated and no rays remain.
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, name = "marching::march_rays_inference")
)]
pub fn march_rays_inference(
  rays: &[Ray],
  state: &mut StreamingState,
  grid: &OccupancySnapshot,
  config: &MarchingConfig,
  round: &mut RoundBuffers,
) -> Result<usize> {
  config.validate()?;
  check_grid(grid, config)?;
  if state.n_rays() != rays.len() {
    return Err(Error::ShapeMismatch {
      what: "streaming state",
      got: state.n_rays(),
      expected: rays.len(),
    });
  }
  let cap = config.march_steps_cap as usize;
  if round.march_steps_cap() != cap || round.n_lanes() != state.n_lanes() {
    return Err(Error::ShapeMismatch {
      what: "round buffers",
      got: round.n_lanes() * round.march_steps_cap(),
      expected: state.n_lanes() * cap,
    });
  }

  // Refill idle lanes from the dispatch counter, in ray order.
  for lane in 0..state.n_lanes() {
    let idx = state.indices[lane];
    if idx == INVALID_RAY || state.terminated[idx as usize] {
      if state.counter < rays.len() {
        state.indices[lane] = state.counter as u32;
        state.counter += 1;
      } else {
        state.indices[lane] = INVALID_RAY;
      }
    }
  }

  // March each active lane from its cursor into its slot of the round
  // buffers (lane-major chunks are disjoint).
  let indices = &state.indices;
  let t_cursor = &state.t;
  let cursors: Vec<(u32, f32)> = round
    .xyzs
    .par_chunks_mut(cap)
    .zip(round.dirs.par_chunks_mut(cap))
    .zip(round.dss.par_chunks_mut(cap))
    .zip(round.z_vals.par_chunks_mut(cap))
    .zip(indices.par_iter())
    .map(|((((xyzs, dirs), dss), z_vals), &idx)| {
      xyzs.fill(Vec3::ZERO);
      dirs.fill(Vec3::ZERO);
      dss.fill(0.0);
      z_vals.fill(0.0);
      if idx == INVALID_RAY {
        return (0, 0.0);
      }
      let ray = &rays[idx as usize];
      let t0 = t_cursor[idx as usize];
      if t0 >= ray.t_end {
        return (0, t0);
      }
      let mut written = 0usize;
      let (n, t_after) = walk_ray(ray, t0, grid, config, cap, |pos, ds, z| {
        xyzs[written] = pos;
        dirs[written] = ray.dir;
        dss[written] = ds;
        z_vals[written] = z;
        written += 1;
      });
      (n as u32, t_after)
    })
    .collect();

  // Scatter cursors and per-lane counts back.
  let mut active = 0usize;
  for (lane, &(n, t_after)) in cursors.iter().enumerate() {
    round.n_samples[lane] = n;
    let idx = state.indices[lane];
    if idx != INVALID_RAY {
      state.t[idx as usize] = t_after;
      active += 1;
    }
  }
  Ok(active)
}

#[cfg(test)]
#[path = "marching_test.rs"]
mod marching_test;
