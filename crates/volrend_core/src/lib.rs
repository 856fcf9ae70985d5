//! volrend_core - Framework/engine independent volumetric ray marching and
//! compositing.
//!
//! This crate is the ray-marching-and-compositing core of a neural-radiance-
//! field style renderer. Given camera rays and a learned per-point
//! density/color predictor (external — consumed here as opaque arrays), it
//! decides where along each ray to sample, packs the irregular per-ray
//! sample counts into dense fixed-capacity buffers under a global sample
//! budget, and composites predictions into pixel colors and depths via the
//! volume-rendering integral — batched and differentiable for training,
//! streaming with early termination for inference.
//!
//! # Features
//!
//! - **Occupancy index**: multi-resolution Morton-ordered bit grids with
//!   empty-space skipping and snapshot-per-epoch reader isolation
//! - **Batched marcher**: deterministic budget-respecting sample packing
//!   (arena + offsets, no nested containers)
//! - **Streaming marcher/compositor**: bounded-memory multi-round rendering
//!   with persistent per-ray transmittance state
//! - **Hand-written backward pass**: exact reverse of the compositing
//!   recurrence for training gradients
//! - **Batch-size controller**: EMA feedback loop converging the marched
//!   sample count onto the budget
//!
//! # Example
//!
//! ```ignore
//! use volrend_core::{march_rays, integrate_rays, MarchingConfig, OccupancyGrid};
//!
//! let config = MarchingConfig::default().with_total_samples(1 << 16);
//! let mut grid = OccupancyGrid::new(&config)?;
//! grid.fill(true);
//!
//! let marched = march_rays(&rays, &jitters, &grid.snapshot(), &config)?;
//! // ... run the predictor over marched.buffer ...
//! let out = integrate_rays(&marched.buffer, &bgs, &predictions)?;
//! ```

pub mod config;
pub mod error;
pub mod morton;
pub mod types;

// Re-export commonly used items
pub use config::{MarchingConfig, SQRT3, TRANSMITTANCE_EPSILON};
pub use error::{Error, Result};
pub use morton::{morton3d, morton3d_invert};
pub use types::{
  DensityRgb, Ray, RgbD, RoundBuffers, SampleBuffer, StreamingState, INVALID_RAY,
};

// Occupancy index consumed by the marchers, maintained by the training loop
pub mod occupancy;
pub use occupancy::{OccupancyGrid, OccupancySnapshot};

// Ray marchers (batched + streaming)
pub mod marching;
pub use marching::{march_rays, march_rays_inference, march_rays_timed, MarchOutput};

// Compositors (batched forward/backward + streaming)
pub mod integrating;
pub use integrating::{
  integrate_rays, integrate_rays_backward, integrate_rays_inference, IntegrateOutput,
  SampleGradients,
};

// Batch-size feedback controller
pub mod batch;
pub use batch::{BatchSizeController, MIN_N_RAYS};

// Engine-agnostic metrics collection
pub mod metrics;
