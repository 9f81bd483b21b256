use ndarray::Array2;
use rand::prelude::*;

/// Generate random dense features in row-major order.
///
/// Values are uniform in `[min, max]`.
pub fn random_dense_f32(rows: usize, cols: usize, seed: u64, min: f32, max: f32) -> Vec<f32> {
	assert!(max >= min);
	let mut rng = StdRng::seed_from_u64(seed);
	let width = max - min;
	(0..rows * cols)
		.map(|_| min + rng.r#gen::<f32>() * width)
		.collect()
}

/// Random feature matrix `[rows, cols]`, uniform in `[0, 1)`.
pub fn random_features(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
	let data = random_dense_f32(rows, cols, seed, 0.0, 1.0);
	Array2::from_shape_vec((rows, cols), data).expect("shape matches data length")
}

/// Random class labels drawn uniformly from `labels`.
pub fn random_labels(rows: usize, labels: &[i64], seed: u64) -> Vec<i64> {
	assert!(!labels.is_empty());
	let mut rng = StdRng::seed_from_u64(seed);
	(0..rows).map(|_| labels[rng.gen_range(0..labels.len())]).collect()
}

/// Random regression targets, uniform in `[min, max)`.
pub fn random_targets(rows: usize, seed: u64, min: f64, max: f64) -> Vec<f64> {
	assert!(max > min);
	let mut rng = StdRng::seed_from_u64(seed);
	(0..rows).map(|_| rng.gen_range(min..max)).collect()
}

/// Feature matrix whose values lie on a coarse grid, so rows frequently tie
/// with fitted thresholds.
pub fn grid_features(rows: usize, cols: usize, levels: u32, seed: u64) -> Array2<f32> {
	assert!(levels >= 2);
	let mut rng = StdRng::seed_from_u64(seed);
	Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0..levels) as f32 / (levels - 1) as f32)
}
