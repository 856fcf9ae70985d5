//! Batch-size controller: how many rays to request next step.
//!
//! The number of samples a ray needs is scene-dependent and drifts over
//! training as the occupancy grid sharpens. A fixed ray count would either
//! under-fill the sample arena (budget wasted on empty space) or overflow
//! it (truncation losing gradient signal). The controller tracks
//! exponential moving averages of the marcher/compositor sample statistics
//! and recomputes the ray count so the marched total converges to the
//! sample budget — but only *commits* a resize once enough updates have
//! accumulated or the recommendation has drifted far from the current
//! count, damping thrash from noisy single-step estimates.

use smallvec::SmallVec;

/// Smallest ray count the controller will ever recommend.
pub const MIN_N_RAYS: usize = 16;

/// EMA control loop over per-step sample statistics.
#[derive(Clone, Debug)]
pub struct BatchSizeController {
  decay: f32,
  commit_every: u32,
  drift_threshold: f32,
  /// EMA of `measured_batch_size / n_rays` (samples that got composited).
  running_mean_effective_samples_per_ray: f32,
  /// EMA of `measured_batch_size_before_compaction / n_rays` (samples the
  /// marcher wanted to emit).
  running_mean_samples_per_ray: f32,
  /// Currently committed ray count.
  n_rays: usize,
  /// Recommendations observed since the last commit.
  pending: SmallVec<[f32; 16]>,
}

impl BatchSizeController {
  /// Controller starting at `n_rays`, with the paper-default 0.95 decay.
  pub fn new(n_rays: usize) -> Self {
    Self {
      decay: 0.95,
      commit_every: 16,
      drift_threshold: 0.2,
      running_mean_effective_samples_per_ray: 0.0,
      running_mean_samples_per_ray: 0.0,
      n_rays: n_rays.max(MIN_N_RAYS),
      pending: SmallVec::new(),
    }
  }

  pub fn with_decay(mut self, decay: f32) -> Self {
    self.decay = decay;
    self
  }

  pub fn with_commit_every(mut self, commit_every: u32) -> Self {
    self.commit_every = commit_every.max(1);
    self
  }

  pub fn with_drift_threshold(mut self, drift_threshold: f32) -> Self {
    self.drift_threshold = drift_threshold;
    self
  }

  /// Committed ray count for the next marching call.
  #[inline]
  pub fn n_rays(&self) -> usize {
    self.n_rays
  }

  #[inline]
  pub fn mean_effective_samples_per_ray(&self) -> f32 {
    self.running_mean_effective_samples_per_ray
  }

  #[inline]
  pub fn mean_samples_per_ray(&self) -> f32 {
    self.running_mean_samples_per_ray
  }

  /// Fold one training step's measurements into the running means.
  ///
  /// `measured_batch_size` comes from the compositor,
  /// `measured_batch_size_before_compaction` from the marcher; both are
  /// divided by the ray count actually used this step.
  pub fn update(
    &mut self,
    measured_batch_size: usize,
    measured_batch_size_before_compaction: usize,
    total_samples: usize,
  ) {
    let n = self.n_rays as f32;
    let effective = measured_batch_size as f32 / n;
    let marched = (measured_batch_size_before_compaction as f32 / n).max(1.0);

    if self.pending.is_empty() && self.running_mean_samples_per_ray == 0.0 {
      // First measurement seeds the means directly.
      self.running_mean_effective_samples_per_ray = effective;
      self.running_mean_samples_per_ray = marched;
    } else {
      let d = self.decay;
      self.running_mean_effective_samples_per_ray =
        d * self.running_mean_effective_samples_per_ray + (1.0 - d) * effective;
      self.running_mean_samples_per_ray =
        d * self.running_mean_samples_per_ray + (1.0 - d) * marched;
    }

    self
      .pending
      .push(self.recommended_n_rays(total_samples) as f32);
  }

  /// Ray count that would fill `total_samples` at the current mean demand.
  pub fn recommended_n_rays(&self, total_samples: usize) -> usize {
    if self.running_mean_samples_per_ray <= 0.0 {
      return self.n_rays;
    }
    let raw = total_samples as f32 / self.running_mean_samples_per_ray;
    (raw as usize).clamp(MIN_N_RAYS, total_samples.max(MIN_N_RAYS))
  }

  /// Should the pending recommendations be committed?
  ///
  /// True after `commit_every` updates, or earlier when the latest
  /// recommendation drifts more than `drift_threshold` (relative) from the
  /// committed count.
  pub fn should_commit(&self) -> bool {
    if self.pending.len() as u32 >= self.commit_every {
      return true;
    }
    match self.pending.last() {
      Some(&rec) => {
        let drift = (rec - self.n_rays as f32).abs() / self.n_rays as f32;
        drift > self.drift_threshold
      }
      None => false,
    }
  }

  /// Permanently resize the next request and clear the pending window.
  ///
  /// Returns the new ray count.
  pub fn commit(&mut self, total_samples: usize) -> usize {
    self.n_rays = self.recommended_n_rays(total_samples);
    self.pending.clear();
    self.n_rays
  }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
