//! https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Parallel_algorithm

use num_traits::ToPrimitive;

/// The mean and population variance of a sequence of values, ignoring NaNs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeanVariance {
	pub n: u64,
	pub mean: f32,
	pub variance: f32,
}

impl MeanVariance {
	pub fn compute(values: &[f32]) -> MeanVariance {
		let mut n = 0u64;
		let mut mean = 0.0f64;
		let mut m2 = 0.0f64;
		for value in values.iter().filter(|value| !value.is_nan()) {
			let (merged_mean, merged_m2) = merge_mean_m2(n, mean, m2, 1, *value as f64, 0.0);
			n += 1;
			mean = merged_mean;
			m2 = merged_m2;
		}
		let variance = if n == 0 { 0.0 } else { m2 / n as f64 };
		MeanVariance {
			n,
			mean: mean as f32,
			variance: variance as f32,
		}
	}
}

/// Combine two separately computed means and sums of squared deviations into a single mean and sum of squared deviations.
pub fn merge_mean_m2(
	n_a: u64,
	mean_a: f64,
	m2_a: f64,
	n_b: u64,
	mean_b: f64,
	m2_b: f64,
) -> (f64, f64) {
	let n_a = n_a.to_f64().unwrap_or(0.0);
	let n_b = n_b.to_f64().unwrap_or(0.0);
	if n_a + n_b == 0.0 {
		return (0.0, 0.0);
	}
	(
		((n_a * mean_a) + (n_b * mean_b)) / (n_a + n_b),
		m2_a + m2_b + (mean_b - mean_a) * (mean_b - mean_a) * (n_a * n_b / (n_a + n_b)),
	)
}

#[test]
fn test_mean_variance() {
	let mean_variance = MeanVariance::compute(&[0.0, 5.2, f32::NAN, 1.3, 10.0]);
	assert_eq!(mean_variance.n, 4);
	assert!((mean_variance.mean - 4.125).abs() < 1e-5);
	assert!((mean_variance.variance - 15.166875).abs() < 1e-4);
}
