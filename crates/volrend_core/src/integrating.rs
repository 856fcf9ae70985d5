//! Sample compositors: the discretized volume-rendering integral.
//!
//! Front-to-back alpha compositing along each ray:
//!
//! ```text
//! alpha_i = 1 - exp(-sigma_i * ds_i)        per-sample termination prob.
//! w_i     = T_i * alpha_i                   compositing weight
//! T_{i+1} = T_i * (1 - alpha_i)             transmittance recurrence
//! rgb     = sum w_i * c_i + T_N * bg        unbiased against background
//! depth   = sum w_i * z_i
//! ```
//!
//! The recurrence is order-dependent, so per-ray sample order (increasing
//! `z`) must be preserved end-to-end. Accumulation stops once `T` drops
//! below [`TRANSMITTANCE_EPSILON`]; samples past that point carry no weight
//! and no gradient.
//!
//! [`integrate_rays`] is the batched, differentiable training path; its
//! hand-written reverse pass ([`integrate_rays_backward`]) mirrors the same
//! recurrence exactly, reconstructing suffix sums from the forward totals
//! instead of storing a per-sample transmittance trace.
//! [`integrate_rays_inference`] continues *persistent* per-ray accumulators
//! across streaming rounds and reports which rays terminated.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::TRANSMITTANCE_EPSILON;
use crate::error::{Error, Result};
use crate::types::{DensityRgb, RgbD, RoundBuffers, SampleBuffer, StreamingState, INVALID_RAY};

/// Output of one batched compositing call.
#[derive(Clone, Debug)]
pub struct IntegrateOutput {
  /// Number of samples that actually got composited (received weight before
  /// their ray saturated). Feeds the batch-size controller.
  pub measured_batch_size: usize,
  /// Composited color + estimated depth per ray.
  pub final_rgbds: Vec<RgbD>,
  /// Transmittance left after each ray's last composited sample — the
  /// minimal forward state the backward pass needs.
  pub final_transmittance: Vec<f32>,
}

/// Gradients with respect to the predictor outputs, one entry per arena
/// slot. Slots past each ray's valid prefix stay zero.
#[derive(Clone, Debug)]
pub struct SampleGradients {
  pub d_density: Vec<f32>,
  pub d_rgb: Vec<Vec3>,
}

#[inline]
fn check_predictions(buffer: &SampleBuffer, bgs: &[Vec3], drgbs: &[DensityRgb]) -> Result<()> {
  if bgs.len() != buffer.n_rays() {
    return Err(Error::ShapeMismatch {
      what: "bgs",
      got: bgs.len(),
      expected: buffer.n_rays(),
    });
  }
  if drgbs.len() != buffer.capacity() {
    return Err(Error::ShapeMismatch {
      what: "drgbs",
      got: drgbs.len(),
      expected: buffer.capacity(),
    });
  }
  Ok(())
}

/// Composite predicted densities/colors into per-ray RGB-D (training path).
///
/// Differentiable end-to-end: pair with [`integrate_rays_backward`].
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, name = "integrating::integrate_rays")
)]
pub fn integrate_rays(
  buffer: &SampleBuffer,
  bgs: &[Vec3],
  drgbs: &[DensityRgb],
) -> Result<IntegrateOutput> {
  check_predictions(buffer, bgs, drgbs)?;

  let per_ray: Vec<(RgbD, f32, usize)> = (0..buffer.n_rays())
    .into_par_iter()
    .map(|i| {
      let range = buffer.ray_range(i);
      let mut rgb = Vec3::ZERO;
      let mut depth = 0.0f32;
      let mut trans = 1.0f32;
      let mut composited = 0usize;
      for s in range {
        if trans < TRANSMITTANCE_EPSILON {
          break;
        }
        let ds = buffer.dss[s].max(0.0);
        let sigma = drgbs[s].density.max(0.0);
        let alpha = 1.0 - (-sigma * ds).exp();
        let w = trans * alpha;
        rgb += w * drgbs[s].rgb;
        depth += w * buffer.z_vals[s];
        trans *= 1.0 - alpha;
        composited += 1;
      }
      rgb += trans * bgs[i];
      (RgbD { rgb, depth }, trans, composited)
    })
    .collect();

  let mut final_rgbds = Vec::with_capacity(per_ray.len());
  let mut final_transmittance = Vec::with_capacity(per_ray.len());
  let mut measured_batch_size = 0usize;
  for (rgbd, trans, composited) in per_ray {
    final_rgbds.push(rgbd);
    final_transmittance.push(trans);
    measured_batch_size += composited;
  }

  Ok(IntegrateOutput {
    measured_batch_size,
    final_rgbds,
    final_transmittance,
  })
}

/// Reverse-mode pass of [`integrate_rays`].
///
/// Given per-ray output gradients `d_rgbds`, propagates back through the
/// alpha/transmittance recurrence to per-sample density and color
/// gradients. For sample `i` (with suffix sums over later samples `j > i`):
///
/// ```text
/// dL/dc_i     = w_i * g_rgb
/// dL/dsigma_i = ds_i * ( T_{i+1} * (c_i·g_rgb + z_i·g_depth)
///                        - Σ_{j>i} w_j * (c_j·g_rgb + z_j·g_depth)
///                        - T_N * (bg·g_rgb) )
/// ```
///
/// Densities the predictor reported negative were clipped in the forward
/// pass and get zero gradient.
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, name = "integrating::integrate_rays_backward")
)]
pub fn integrate_rays_backward(
  buffer: &SampleBuffer,
  bgs: &[Vec3],
  drgbs: &[DensityRgb],
  output: &IntegrateOutput,
  d_rgbds: &[RgbD],
) -> Result<SampleGradients> {
  check_predictions(buffer, bgs, drgbs)?;
  if output.final_rgbds.len() != buffer.n_rays() {
    return Err(Error::ShapeMismatch {
      what: "output.final_rgbds",
      got: output.final_rgbds.len(),
      expected: buffer.n_rays(),
    });
  }
  if d_rgbds.len() != buffer.n_rays() {
    return Err(Error::ShapeMismatch {
      what: "d_rgbds",
      got: d_rgbds.len(),
      expected: buffer.n_rays(),
    });
  }

  let mut d_density = vec![0.0f32; buffer.capacity()];
  let mut d_rgb = vec![Vec3::ZERO; buffer.capacity()];

  // Carve the gradient arena into per-ray disjoint slices (same ray-order
  // layout as the sample arena).
  let mut lanes = Vec::with_capacity(buffer.n_rays());
  {
    let mut dd = d_density.as_mut_slice();
    let mut dc = d_rgb.as_mut_slice();
    for i in 0..buffer.n_rays() {
      let n = buffer.n_samples[i] as usize;
      let (a, ar) = dd.split_at_mut(n);
      let (b, br) = dc.split_at_mut(n);
      lanes.push((i, a, b));
      dd = ar;
      dc = br;
    }
  }

  lanes.into_par_iter().for_each(|(i, dd, dc)| {
    let range = buffer.ray_range(i);
    let g_rgb = d_rgbds[i].rgb;
    let g_depth = d_rgbds[i].depth;
    let t_final = output.final_transmittance[i];
    let bg_term = t_final * bgs[i].dot(g_rgb);

    // Total sample contribution under the output gradient (background
    // excluded): Σ w_j (c_j·g_rgb + z_j·g_depth).
    let total = (output.final_rgbds[i].rgb - t_final * bgs[i]).dot(g_rgb)
      + output.final_rgbds[i].depth * g_depth;

    let mut trans = 1.0f32;
    let mut prefix = 0.0f32;
    for (k, s) in range.enumerate() {
      if trans < TRANSMITTANCE_EPSILON {
        break;
      }
      let ds = buffer.dss[s].max(0.0);
      let sigma = drgbs[s].density.max(0.0);
      let alpha = 1.0 - (-sigma * ds).exp();
      let w = trans * alpha;
      let contrib = drgbs[s].rgb.dot(g_rgb) + buffer.z_vals[s] * g_depth;

      dc[k] = w * g_rgb;
      prefix += w * contrib;
      trans *= 1.0 - alpha; // now T_{i+1}

      // Clipped densities contribute nothing to the forward value.
      dd[k] = if drgbs[s].density < 0.0 {
        0.0
      } else {
        ds * (trans * contrib - (total - prefix) - bg_term)
      };
    }
  });

  Ok(SampleGradients { d_density, d_rgb })
}

/// Fold one streaming round's samples into the persistent ray state
/// (inference path).
///
/// Applies the same compositing recurrence as [`integrate_rays`], but
/// resuming each ray's saved transmittance and accumulators instead of
/// starting a fresh integral. A ray terminates when its transmittance falls
/// below [`TRANSMITTANCE_EPSILON`] (saturated) or its lane under-filled the
/// round (the marching cursor reached `t_end`); on termination the residual
/// transmittance is blended against the ray's background color and its
/// global flag is raised, freeing the lane for the next dispatch.
///
/// Returns the number of rays that terminated this round.
#[cfg_attr(
  feature = "tracing",
  tracing::instrument(skip_all, name = "integrating::integrate_rays_inference")
)]
pub fn integrate_rays_inference(
  bgs: &[Vec3],
  state: &mut StreamingState,
  round: &RoundBuffers,
  drgbs: &[DensityRgb],
) -> Result<u32> {
  if bgs.len() != state.n_rays() {
    return Err(Error::ShapeMismatch {
      what: "bgs",
      got: bgs.len(),
      expected: state.n_rays(),
    });
  }
  if round.n_lanes() != state.n_lanes() {
    return Err(Error::ShapeMismatch {
      what: "round buffers",
      got: round.n_lanes(),
      expected: state.n_lanes(),
    });
  }
  let cap = round.march_steps_cap();
  if drgbs.len() != round.n_lanes() * cap {
    return Err(Error::ShapeMismatch {
      what: "drgbs",
      got: drgbs.len(),
      expected: round.n_lanes() * cap,
    });
  }

  struct LaneUpdate {
    ray: u32,
    rgbd: RgbD,
    trans: f32,
    terminated: bool,
  }

  let updates: Vec<LaneUpdate> = (0..state.n_lanes())
    .into_par_iter()
    .filter_map(|lane| {
      let idx = state.indices[lane];
      if idx == INVALID_RAY || state.terminated[idx as usize] {
        return None;
      }
      let ray = idx as usize;
      let n = round.n_samples[lane] as usize;
      let base = lane * cap;

      let mut rgb = state.rgbd[ray].rgb;
      let mut depth = state.rgbd[ray].depth;
      let mut trans = state.transmittance[ray];
      for s in base..base + n {
        if trans < TRANSMITTANCE_EPSILON {
          break;
        }
        let ds = round.dss[s].max(0.0);
        let sigma = drgbs[s].density.max(0.0);
        let alpha = 1.0 - (-sigma * ds).exp();
        let w = trans * alpha;
        rgb += w * drgbs[s].rgb;
        depth += w * round.z_vals[s];
        trans *= 1.0 - alpha;
      }

      // Saturated, or the marcher ran out of t-range for this ray.
      let terminated = trans < TRANSMITTANCE_EPSILON || n < cap;
      if terminated {
        rgb += trans * bgs[ray];
      }
      Some(LaneUpdate {
        ray: idx,
        rgbd: RgbD { rgb, depth },
        trans,
        terminated,
      })
    })
    .collect();

  let mut terminate_cnt = 0u32;
  for u in updates {
    let ray = u.ray as usize;
    state.rgbd[ray] = u.rgbd;
    state.transmittance[ray] = u.trans;
    if u.terminated {
      state.terminated[ray] = true;
      terminate_cnt += 1;
    }
  }
  Ok(terminate_cnt)
}

#[cfg(test)]
#[path = "integrating_test.rs"]
mod integrating_test;
