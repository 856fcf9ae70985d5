//! Marching and compositing benchmarks on a synthetic sphere scene.
//!
//! The scene is a solid sphere of radius 0.5 in a [-1, 1]³ box, rendered by
//! rays shot from a ring of viewpoints through the origin — roughly the
//! sample-count distribution of a converged single-object capture.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::Vec3;
use rand::{rng, Rng};
use volrend_core::{
  integrate_rays, integrate_rays_inference, march_rays, march_rays_inference, DensityRgb,
  MarchingConfig, OccupancyGrid, Ray, RoundBuffers, StreamingState,
};

fn bench_config() -> MarchingConfig {
  MarchingConfig::default()
    .with_total_samples(1 << 16)
    .with_diagonal_n_steps(1024)
    .with_grid_resolution(64)
    .with_march_steps_cap(8)
}

fn sphere_grid(config: &MarchingConfig) -> OccupancyGrid {
  let mut grid = OccupancyGrid::new(config).unwrap();
  for cell in 0..grid.cells_per_cascade() as u32 {
    if grid.cell_center(0, cell).length() < 0.5 {
      let (x, y, z) = volrend_core::morton3d_invert(cell);
      grid.set(0, (x, y, z), true);
    }
  }
  grid
}

fn ring_rays(n: usize) -> Vec<Ray> {
  (0..n)
    .map(|i| {
      let theta = i as f32 / n as f32 * std::f32::consts::TAU;
      let origin = Vec3::new(theta.cos(), 0.1 * (7.0 * theta).sin(), theta.sin());
      let dir = (-origin).normalize();
      Ray::new(origin, dir, 0.0, 2.0).with_id(i as u32)
    })
    .collect()
}

/// Density falls off toward the sphere surface, color varies with position.
fn fake_predictions(xyzs: &[Vec3]) -> Vec<DensityRgb> {
  xyzs
    .iter()
    .map(|&p| {
      let density = (0.5 - p.length()).max(0.0) * 40.0;
      DensityRgb::new(density, Vec3::new(0.5 + p.x, 0.5 + p.y, 0.5 + p.z) * 0.5)
    })
    .collect()
}

fn bench_march(c: &mut Criterion) {
  let config = bench_config();
  let grid = sphere_grid(&config);
  let snapshot = grid.snapshot();
  let mut rng = rng();

  let mut group = c.benchmark_group("march_rays");
  for n_rays in [1024usize, 4096, 16384] {
    let rays = ring_rays(n_rays);
    let jitters: Vec<f32> = (0..n_rays).map(|_| rng.random::<f32>()).collect();
    group.throughput(Throughput::Elements(n_rays as u64));
    group.bench_with_input(BenchmarkId::from_parameter(n_rays), &rays, |b, rays| {
      b.iter(|| {
        let out = march_rays(rays, &jitters, &snapshot, &config).unwrap();
        black_box(out.buffer.total_valid())
      })
    });
  }
  group.finish();
}

fn bench_integrate(c: &mut Criterion) {
  let config = bench_config();
  let grid = sphere_grid(&config);
  let rays = ring_rays(4096);
  let jitters = vec![0.0f32; rays.len()];
  let marched = march_rays(&rays, &jitters, &grid.snapshot(), &config).unwrap();
  let drgbs = fake_predictions(&marched.buffer.xyzs);
  let bgs = vec![Vec3::splat(0.5); rays.len()];

  let mut group = c.benchmark_group("integrate_rays");
  group.throughput(Throughput::Elements(marched.buffer.total_valid() as u64));
  group.bench_function("4096_rays", |b| {
    b.iter(|| {
      let out = integrate_rays(&marched.buffer, &bgs, &drgbs).unwrap();
      black_box(out.measured_batch_size)
    })
  });
  group.finish();
}

fn bench_streaming_render(c: &mut Criterion) {
  let config = bench_config();
  let grid = sphere_grid(&config);
  let snapshot = grid.snapshot();
  let rays = ring_rays(1024);
  let bgs = vec![Vec3::splat(0.5); rays.len()];
  let n_lanes = 256;
  let cap = config.march_steps_cap as usize;

  let mut group = c.benchmark_group("streaming_render");
  group.throughput(Throughput::Elements(rays.len() as u64));
  group.bench_function("1024_rays_256_lanes", |b| {
    b.iter(|| {
      let mut state = StreamingState::new(&rays, n_lanes);
      let mut round = RoundBuffers::new(n_lanes, cap);
      loop {
        march_rays_inference(&rays, &mut state, &snapshot, &config, &mut round).unwrap();
        if state.all_terminated() {
          break;
        }
        let drgbs = fake_predictions(&round.xyzs);
        integrate_rays_inference(&bgs, &mut state, &round, &drgbs).unwrap();
      }
      black_box(state.rgbd[0].rgb)
    })
  });
  group.finish();
}

criterion_group!(benches, bench_march, bench_integrate, bench_streaming_render);
criterion_main!(benches);
