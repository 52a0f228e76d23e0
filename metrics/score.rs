use super::{RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput, StreamingMetric};
use ndarray::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
	#[error("length mismatch: {labels} labels and {predictions} predictions")]
	LengthMismatch { labels: usize, predictions: usize },
	#[error("cannot score an empty set of predictions")]
	Empty,
	#[error("labels or predictions contain non-finite values")]
	NonFinite,
}

/// Compute the mean squared error of `predictions` against `labels`.
pub fn mean_squared_error(
	labels: ArrayView1<f32>,
	predictions: ArrayView1<f32>,
) -> Result<f32, MetricError> {
	let mse = compute(labels, predictions, "mean_squared_error")?.mse;
	tracing::info!(mse, "mean squared error");
	Ok(mse)
}

/// Compute the coefficient of determination of `predictions` against `labels`. A perfect predictor scores 1.0, and a predictor that always outputs the mean label scores 0.0.
pub fn r2_score(labels: ArrayView1<f32>, predictions: ArrayView1<f32>) -> Result<f32, MetricError> {
	let r2 = compute(labels, predictions, "r2_score")?.r2;
	tracing::info!(r2, "r2 score");
	Ok(r2)
}

pub fn root_mean_squared_error(
	labels: ArrayView1<f32>,
	predictions: ArrayView1<f32>,
) -> Result<f32, MetricError> {
	let rmse = compute(labels, predictions, "root_mean_squared_error")?.rmse;
	tracing::info!(rmse, "root mean squared error");
	Ok(rmse)
}

fn compute(
	labels: ArrayView1<f32>,
	predictions: ArrayView1<f32>,
	metric: &'static str,
) -> Result<RegressionMetricsOutput, MetricError> {
	let result = validate(labels, predictions).and_then(|_| {
		let mut metrics = RegressionMetrics::default();
		metrics.update(RegressionMetricsInput {
			predictions: predictions.view(),
			labels: labels.view(),
		});
		metrics.finalize().ok_or(MetricError::Empty)
	});
	if let Err(error) = &result {
		tracing::error!(metric, %error, "failed to compute metric");
	}
	result
}

fn validate(labels: ArrayView1<f32>, predictions: ArrayView1<f32>) -> Result<(), MetricError> {
	if labels.len() != predictions.len() {
		return Err(MetricError::LengthMismatch {
			labels: labels.len(),
			predictions: predictions.len(),
		});
	}
	if labels.is_empty() {
		return Err(MetricError::Empty);
	}
	if labels.iter().chain(predictions.iter()).any(|value| !value.is_finite()) {
		return Err(MetricError::NonFinite);
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_perfect_predictions() {
		let labels = arr1(&[0.0, 1.0, 1.0, 0.0, 0.5]);
		assert_eq!(mean_squared_error(labels.view(), labels.view()), Ok(0.0));
		assert_eq!(r2_score(labels.view(), labels.view()), Ok(1.0));
		assert_eq!(root_mean_squared_error(labels.view(), labels.view()), Ok(0.0));
	}

	#[test]
	fn test_rmse_is_sqrt_mse() {
		let labels = arr1(&[1.0, 2.0, 3.0, 4.0]);
		let predictions = arr1(&[1.5, 1.0, 3.0, 6.0]);
		let mse = mean_squared_error(labels.view(), predictions.view()).unwrap();
		let rmse = root_mean_squared_error(labels.view(), predictions.view()).unwrap();
		assert!((mse - 1.3125).abs() < 1e-6);
		assert!((rmse - mse.sqrt()).abs() < 1e-6);
	}

	#[test]
	fn test_mean_predictor_scores_zero() {
		let labels = arr1(&[1.0, 2.0, 3.0]);
		let predictions = arr1(&[2.0, 2.0, 2.0]);
		let r2 = r2_score(labels.view(), predictions.view()).unwrap();
		assert!(r2.abs() < 1e-6);
	}

	#[test]
	fn test_invalid_input() {
		let labels = arr1(&[1.0, 2.0]);
		let predictions = arr1(&[1.0]);
		assert_eq!(
			mean_squared_error(labels.view(), predictions.view()),
			Err(MetricError::LengthMismatch {
				labels: 2,
				predictions: 1
			})
		);
		let empty = Array1::<f32>::zeros(0);
		assert_eq!(r2_score(empty.view(), empty.view()), Err(MetricError::Empty));
		let predictions = arr1(&[1.0, f32::NAN]);
		assert_eq!(
			root_mean_squared_error(labels.view(), predictions.view()),
			Err(MetricError::NonFinite)
		);
	}
}
