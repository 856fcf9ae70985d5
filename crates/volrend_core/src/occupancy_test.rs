use super::*;
use crate::config::MarchingConfig;

fn small_config() -> MarchingConfig {
  MarchingConfig::default()
    .with_cascades(2)
    .with_grid_resolution(8)
    .with_bound(2.0)
}

#[test]
fn test_new_grid_is_empty() {
  let grid = OccupancyGrid::new(&small_config()).unwrap();
  for x in 0..8 {
    for y in 0..8 {
      for z in 0..8 {
        assert!(!grid.test(0, (x, y, z)));
        assert!(!grid.test(1, (x, y, z)));
      }
    }
  }
}

#[test]
fn test_set_and_test_single_bits() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();

  grid.set(0, (3, 1, 4), true);
  assert!(grid.test(0, (3, 1, 4)));
  // Same coordinate in the other cascade stays clear.
  assert!(!grid.test(1, (3, 1, 4)));
  // Neighbors stay clear.
  assert!(!grid.test(0, (3, 1, 5)));
  assert!(!grid.test(0, (2, 1, 4)));

  grid.set(0, (3, 1, 4), false);
  assert!(!grid.test(0, (3, 1, 4)));
}

#[test]
fn test_fill() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();
  grid.fill(true);
  assert!(grid.test(0, (0, 0, 0)));
  assert!(grid.test(1, (7, 7, 7)));
  grid.fill(false);
  assert!(!grid.test(0, (0, 0, 0)));
  assert!(!grid.test(1, (7, 7, 7)));
}

#[test]
fn test_cell_center() {
  let grid = OccupancyGrid::new(&small_config()).unwrap();

  // Cascade 0 covers [-1, 1], 8 cells of size 0.25 per axis. Cell (0,0,0)
  // is centered at -1 + 0.125.
  let c = grid.cell_center(0, morton3d(0, 0, 0));
  assert!((c - Vec3::splat(-0.875)).length() < 1e-6);

  let c = grid.cell_center(0, morton3d(7, 7, 7));
  assert!((c - Vec3::splat(0.875)).length() < 1e-6);

  // Cascade 1 covers [-2, 2] (extent clamped to bound), cells twice as big.
  let c = grid.cell_center(1, morton3d(0, 0, 0));
  assert!((c - Vec3::splat(-1.75)).length() < 1e-6);
}

#[test]
fn test_update_density_is_decayed_max() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();
  let cell = morton3d(2, 2, 2);

  grid.update_density(0, &[cell], &[10.0], 0.95).unwrap();
  grid.threshold(5.0);
  assert!(grid.test(0, (2, 2, 2)));

  // A lower fresh prediction does not beat the decayed estimate.
  grid.update_density(0, &[cell], &[1.0], 0.95).unwrap();
  grid.threshold(5.0);
  assert!(grid.test(0, (2, 2, 2)));

  // Many decay rounds with no mass eventually drop below the cutoff.
  for _ in 0..200 {
    grid.update_density(0, &[cell], &[0.0], 0.95).unwrap();
  }
  grid.threshold(5.0);
  assert!(!grid.test(0, (2, 2, 2)));
}

#[test]
fn test_update_density_clamps_negative_predictions() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();
  let cell = morton3d(1, 1, 1);
  grid.update_density(0, &[cell], &[-3.0], 0.95).unwrap();
  assert_eq!(grid.mean_density(), 0.0);
}

#[test]
fn test_update_density_shape_mismatch() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();
  assert!(grid.update_density(0, &[0, 1], &[1.0], 0.95).is_err());
}

#[test]
fn test_threshold_clamps_to_mean() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();

  // All estimates sit well below the nominal threshold. The cutoff clamps
  // to the mean, so the denser half still survives.
  let cells: Vec<u32> = (0..8).collect();
  let densities = [0.001, 0.001, 0.001, 0.001, 0.003, 0.003, 0.003, 0.003];
  grid.update_density(0, &cells, &densities, 0.95).unwrap();
  grid.threshold(100.0);

  let occupied: usize = cells
    .iter()
    .filter(|&&c| {
      let (x, y, z) = crate::morton::morton3d_invert(c);
      grid.test(0, (x, y, z))
    })
    .count();
  assert_eq!(occupied, 4);
}

#[test]
fn test_snapshot_isolation() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();
  grid.set(0, (1, 2, 3), true);
  let snapshot = grid.snapshot();

  // Mutations after publishing never show through the snapshot.
  grid.fill(false);
  grid.set(0, (5, 5, 5), true);

  let e = snapshot.cascade_extent(0);
  let cell = 2.0 * e / 8.0;
  let center = Vec3::new(1.0, 2.0, 3.0) * cell - e + 0.5 * cell;
  assert!(snapshot.occupied_at(0, center));
  let other = Vec3::new(5.0, 5.0, 5.0) * cell - e + 0.5 * cell;
  assert!(!snapshot.occupied_at(0, other));
}

#[test]
fn test_cascade_for() {
  let config = MarchingConfig::default()
    .with_cascades(3)
    .with_grid_resolution(8)
    .with_bound(4.0);
  let grid = OccupancyGrid::new(&config).unwrap();
  let snapshot = grid.snapshot();

  // |coord| <= 1 stays in cascade 0.
  assert_eq!(snapshot.cascade_for(Vec3::ZERO), 0);
  assert_eq!(snapshot.cascade_for(Vec3::new(0.9, 0.0, 0.0)), 0);
  // (1, 2] selects cascade 1, (2, 4] cascade 2.
  assert_eq!(snapshot.cascade_for(Vec3::new(1.5, 0.0, 0.0)), 1);
  assert_eq!(snapshot.cascade_for(Vec3::new(0.0, 3.0, 0.0)), 2);
  // Beyond the outermost shell clamps to K-1.
  assert_eq!(snapshot.cascade_for(Vec3::new(100.0, 0.0, 0.0)), 2);
}

#[test]
fn test_single_cascade_skips_selection() {
  let grid = OccupancyGrid::new(&small_config().with_cascades(1)).unwrap();
  let snapshot = grid.snapshot();
  assert_eq!(snapshot.cascade_for(Vec3::new(50.0, 0.0, 0.0)), 0);
}

#[test]
fn test_occupied_at_clamps_to_edge_cells() {
  let mut grid = OccupancyGrid::new(&small_config()).unwrap();
  grid.set(0, (7, 7, 7), true);
  let snapshot = grid.snapshot();

  // Positions at and beyond the +corner all read the edge cell.
  assert!(snapshot.occupied_at(0, Vec3::splat(0.99)));
  assert!(snapshot.occupied_at(0, Vec3::splat(1.0)));
  assert!(snapshot.occupied_at(0, Vec3::splat(1.5)));
  // The opposite corner is a different cell.
  assert!(!snapshot.occupied_at(0, Vec3::splat(-1.0)));
}

#[test]
fn test_cascade_extent_clamps_to_bound() {
  assert_eq!(cascade_extent(0, 4.0), 1.0);
  assert_eq!(cascade_extent(1, 4.0), 2.0);
  assert_eq!(cascade_extent(2, 4.0), 4.0);
  assert_eq!(cascade_extent(3, 4.0), 4.0);
  assert_eq!(cascade_extent(2, 1.0), 1.0);
}
