use super::{mean_variance::merge_mean_m2, StreamingMetric};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// `RegressionMetrics` computes common metrics used to evaluate regressors.
#[derive(Debug, Default)]
pub struct RegressionMetrics {
	n: u64,
	label_mean: f64,
	label_m2: f64,
	absolute_error: f64,
	squared_error: f64,
}

pub struct RegressionMetricsInput<'a> {
	pub predictions: ArrayView1<'a, f32>,
	pub labels: ArrayView1<'a, f32>,
}

/// The output from `RegressionMetrics`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegressionMetricsOutput {
	/// The mean squared error.
	pub mse: f32,
	/// The root mean squared error.
	pub rmse: f32,
	/// The mean absolute error.
	pub mae: f32,
	/// The coefficient of determination.
	pub r2: f32,
	/// The mean squared error of a model that always predicts the mean label.
	pub baseline_mse: f32,
	pub baseline_rmse: f32,
}

impl<'a> StreamingMetric<'a> for RegressionMetrics {
	type Input = RegressionMetricsInput<'a>;
	type Output = Option<RegressionMetricsOutput>;

	fn update(&mut self, input: RegressionMetricsInput) {
		for (prediction, label) in input.predictions.iter().zip(input.labels.iter()) {
			let (mean, m2) = merge_mean_m2(self.n, self.label_mean, self.label_m2, 1, *label as f64, 0.0);
			self.n += 1;
			self.label_mean = mean;
			self.label_m2 = m2;
			let error = (*prediction - *label) as f64;
			self.absolute_error += error.abs();
			self.squared_error += error * error;
		}
	}

	fn merge(&mut self, other: Self) {
		let (mean, m2) = merge_mean_m2(
			self.n,
			self.label_mean,
			self.label_m2,
			other.n,
			other.label_mean,
			other.label_m2,
		);
		self.n += other.n;
		self.label_mean = mean;
		self.label_m2 = m2;
		self.absolute_error += other.absolute_error;
		self.squared_error += other.squared_error;
	}

	fn finalize(self) -> Self::Output {
		if self.n == 0 {
			return None;
		}
		let n = self.n.to_f64()?;
		let variance = self.label_m2 / n;
		let mae = self.absolute_error / n;
		let mse = self.squared_error / n;
		let r2 = if self.label_m2 > 0.0 {
			1.0 - self.squared_error / self.label_m2
		} else if self.squared_error == 0.0 {
			1.0
		} else {
			0.0
		};
		Some(RegressionMetricsOutput {
			mse: mse as f32,
			rmse: mse.sqrt() as f32,
			mae: mae as f32,
			r2: r2 as f32,
			baseline_mse: variance as f32,
			baseline_rmse: variance.sqrt() as f32,
		})
	}
}

#[test]
fn test_regression_metrics() {
	let labels = arr1(&[3.0, -0.5, 2.0, 7.0]);
	let predictions = arr1(&[2.5, 0.0, 2.0, 8.0]);
	let mut metrics = RegressionMetrics::default();
	metrics.update(RegressionMetricsInput {
		predictions: predictions.view(),
		labels: labels.view(),
	});
	let output = metrics.finalize().unwrap();
	assert!((output.mse - 0.375).abs() < 1e-6);
	assert!((output.mae - 0.5).abs() < 1e-6);
	assert!((output.r2 - 0.948_608_1).abs() < 1e-5);
	assert!((output.rmse - 0.375f32.sqrt()).abs() < 1e-6);
}

#[test]
fn test_empty() {
	assert_eq!(RegressionMetrics::default().finalize(), None);
}
