//! Engine-agnostic metrics collection for render statistics.
//!
//! Feature-gated and runtime-toggled to ensure zero overhead when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use volrend_core::metrics::{RenderMetrics, COLLECT_METRICS};
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! // Record a training step:
//! metrics.record_march(march_us, n_rays, marched.measured_batch_size_before_compaction);
//! metrics.record_integrate(integrate_us, integrated.measured_batch_size);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

/// Runtime toggle for metrics collection.
/// Set to false to disable metrics gathering at runtime.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Rolling window for storing recent values (e.g., timing history).
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  buffer: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  /// Create a new rolling window with the given capacity.
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Push a new value, evicting the oldest if at capacity.
  pub fn push(&mut self, value: T) {
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  /// Get the number of values in the window.
  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  /// Check if the window is empty.
  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  /// Clear all values.
  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  /// Iterate over values (oldest to newest).
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.buffer.iter()
  }

  /// Get the most recent value.
  pub fn last(&self) -> Option<&T> {
    self.buffer.back()
  }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
  /// Compute the sum of all values.
  pub fn sum(&self) -> T {
    self
      .buffer
      .iter()
      .copied()
      .fold(T::default(), |acc, x| acc + x)
  }
}

impl RollingWindow<u64> {
  /// Compute the average of all values.
  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() as f64 / self.buffer.len() as f64
    }
  }

  /// Get min and max values.
  pub fn min_max(&self) -> Option<(u64, u64)> {
    if self.buffer.is_empty() {
      None
    } else {
      let min = *self.buffer.iter().min().unwrap();
      let max = *self.buffer.iter().max().unwrap();
      Some((min, max))
    }
  }
}

impl Default for RollingWindow<u64> {
  fn default() -> Self {
    Self::new(128)
  }
}

/// Per-step render statistics updated by the training/inference loop.
#[derive(Debug, Clone)]
pub struct RenderMetrics {
  /// Rolling window of marching times in microseconds.
  pub march_timings: RollingWindow<u64>,
  /// Rolling window of compositing times in microseconds.
  pub integrate_timings: RollingWindow<u64>,
  /// Rolling window of marched samples per ray (pre-compaction).
  pub samples_per_ray: RollingWindow<u64>,
  /// Rolling window of composited samples per step.
  pub effective_batch_sizes: RollingWindow<u64>,

  /// Last marching time in microseconds.
  pub last_march_us: u64,
  /// Last compositing time in microseconds.
  pub last_integrate_us: u64,
  /// Total samples marched this session.
  pub total_samples_marched: u64,
  /// Total steps recorded this session.
  pub total_steps: u64,
}

impl Default for RenderMetrics {
  fn default() -> Self {
    Self {
      march_timings: RollingWindow::new(128),
      integrate_timings: RollingWindow::new(128),
      samples_per_ray: RollingWindow::new(128),
      effective_batch_sizes: RollingWindow::new(128),
      last_march_us: 0,
      last_integrate_us: 0,
      total_samples_marched: 0,
      total_steps: 0,
    }
  }
}

impl RenderMetrics {
  /// Create new metrics with default values.
  pub fn new() -> Self {
    Self::default()
  }

  /// Reset all metrics to zero.
  pub fn reset(&mut self) {
    self.march_timings.clear();
    self.integrate_timings.clear();
    self.samples_per_ray.clear();
    self.effective_batch_sizes.clear();
    self.last_march_us = 0;
    self.last_integrate_us = 0;
    // Don't reset totals - they're cumulative
  }

  /// Record a marching call.
  pub fn record_march(&mut self, timing_us: u64, n_rays: usize, marched_samples: usize) {
    if !is_enabled() {
      return;
    }
    self.march_timings.push(timing_us);
    self.last_march_us = timing_us;
    if n_rays > 0 {
      self
        .samples_per_ray
        .push((marched_samples / n_rays) as u64);
    }
    self.total_samples_marched += marched_samples as u64;
    self.total_steps += 1;
  }

  /// Record a compositing call.
  pub fn record_integrate(&mut self, timing_us: u64, measured_batch_size: usize) {
    if !is_enabled() {
      return;
    }
    self.integrate_timings.push(timing_us);
    self.last_integrate_us = timing_us;
    self.effective_batch_sizes.push(measured_batch_size as u64);
  }

  /// Get average marching timing in microseconds.
  pub fn avg_march_timing_us(&self) -> f64 {
    self.march_timings.average()
  }

  /// Get average compositing timing in microseconds.
  pub fn avg_integrate_timing_us(&self) -> f64 {
    self.integrate_timings.average()
  }
}
