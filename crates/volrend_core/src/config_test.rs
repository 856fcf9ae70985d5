use super::*;

#[test]
fn test_defaults_are_valid() {
  assert!(MarchingConfig::default().validate().is_ok());
}

#[test]
fn test_builder_chain() {
  let config = MarchingConfig::new()
    .with_total_samples(4096)
    .with_diagonal_n_steps(512)
    .with_cascades(3)
    .with_grid_resolution(64)
    .with_bound(4.0)
    .with_stepsize_portion(0.0)
    .with_march_steps_cap(16);

  assert_eq!(config.total_samples, 4096);
  assert_eq!(config.diagonal_n_steps, 512);
  assert_eq!(config.k, 3);
  assert_eq!(config.g, 64);
  assert_eq!(config.bound, 4.0);
  assert_eq!(config.stepsize_portion, 0.0);
  assert_eq!(config.march_steps_cap, 16);
  assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_zero_fields() {
  assert!(MarchingConfig::default()
    .with_total_samples(0)
    .validate()
    .is_err());
  assert!(MarchingConfig::default()
    .with_diagonal_n_steps(0)
    .validate()
    .is_err());
  assert!(MarchingConfig::default().with_cascades(0).validate().is_err());
  assert!(MarchingConfig::default()
    .with_grid_resolution(0)
    .validate()
    .is_err());
  assert!(MarchingConfig::default()
    .with_march_steps_cap(0)
    .validate()
    .is_err());
}

#[test]
fn test_validate_rejects_non_power_of_two_resolution() {
  assert!(MarchingConfig::default()
    .with_grid_resolution(100)
    .validate()
    .is_err());
  assert!(MarchingConfig::default()
    .with_grid_resolution(2048)
    .validate()
    .is_err());
}

#[test]
fn test_validate_rejects_bad_floats() {
  assert!(MarchingConfig::default().with_bound(0.0).validate().is_err());
  assert!(MarchingConfig::default()
    .with_bound(-1.0)
    .validate()
    .is_err());
  assert!(MarchingConfig::default()
    .with_bound(f32::NAN)
    .validate()
    .is_err());
  assert!(MarchingConfig::default()
    .with_stepsize_portion(-0.1)
    .validate()
    .is_err());
}

#[test]
fn test_dt_min() {
  let config = MarchingConfig::default().with_diagonal_n_steps(4);
  assert!((config.dt_min() - SQRT3 / 4.0).abs() < 1e-7);
  assert!((config.dt_max() - 2.0 * SQRT3 / 4.0).abs() < 1e-7);
}

#[test]
fn test_step_size_clamps() {
  let config = MarchingConfig::default()
    .with_diagonal_n_steps(1024)
    .with_bound(2.0)
    .with_stepsize_portion(1.0 / 256.0);

  // Near the camera the step floors at dt_min.
  assert_eq!(config.step_size(0.0), config.dt_min());
  // Far away it ceilings at dt_max.
  assert_eq!(config.step_size(1e6), config.dt_max());
  // In between it grows linearly with t.
  let t = 1.0f32;
  let expected = (t / 256.0).clamp(config.dt_min(), config.dt_max());
  assert_eq!(config.step_size(t), expected);
}

#[test]
fn test_step_size_small_bound() {
  // bound < 0.5 inverts the clamp range (dt_max < dt_min); the ceiling
  // wins and every step is dt_max, never a panic.
  let config = MarchingConfig::default().with_bound(0.25);
  assert!(config.validate().is_ok());
  assert!(config.dt_max() < config.dt_min());
  assert_eq!(config.step_size(0.0), config.dt_max());
  assert_eq!(config.step_size(1.0), config.dt_max());
  assert_eq!(config.step_size(1e6), config.dt_max());
}

#[test]
fn test_density_threshold_positive() {
  assert!(MarchingConfig::default().density_threshold() > 0.0);
}
