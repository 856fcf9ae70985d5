//! Error taxonomy for the engine.
//!
//! Only structural problems are errors: bad static configuration, or input
//! arrays whose shapes disagree. Runtime numeric edge cases (degenerate ray
//! directions, vanishing transmittance) degrade to zero contribution instead
//! of failing, and capacity exhaustion is deterministic truncation, not an
//! error.

use thiserror::Error;

/// Errors surfaced at call entry, before any computation starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// A static configuration field is out of its valid range.
  #[error("invalid config: {field} {reason}")]
  InvalidConfig {
    /// Name of the offending field.
    field: &'static str,
    /// Human-readable constraint that was violated.
    reason: &'static str,
  },

  /// Two input arrays that must agree in length do not.
  #[error("shape mismatch: {what} has length {got}, expected {expected}")]
  ShapeMismatch {
    /// Which input disagreed.
    what: &'static str,
    /// Actual length received.
    got: usize,
    /// Length implied by the other inputs.
    expected: usize,
  },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
