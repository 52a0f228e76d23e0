use super::{EarlyStoppingMonitor, Holdout, TrainOptions};
use hazard_metrics::{MeanSquaredError, StreamingMetric};
use hazard_util::{err, error::Result, zip};
use ndarray::prelude::*;

/// This struct describes a linear regressor model. You can train one by calling `Regressor::train`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Regressor {
	pub bias: f32,
	pub weights: Array1<f32>,
	/// These are the early stopping loss values for each epoch. It is empty if early stopping was disabled.
	pub losses: Vec<f32>,
}

impl Regressor {
	/// Train a linear regressor.
	pub fn train(features: ArrayView2<f32>, labels: ArrayView1<f32>, options: &TrainOptions) -> Result<Self> {
		if features.nrows() != labels.len() {
			return Err(err!(
				"features have {} rows but there are {} labels",
				features.nrows(),
				labels.len()
			));
		}
		if labels.is_empty() {
			return Err(err!("cannot train on an empty dataset"));
		}
		if !(options.learning_rate > 0.0) || !options.learning_rate.is_finite() {
			return Err(err!("learning_rate must be positive, got {}", options.learning_rate));
		}
		if !(options.l2_regularization >= 0.0) {
			return Err(err!(
				"l2_regularization must not be negative, got {}",
				options.l2_regularization
			));
		}
		if options.n_examples_per_batch == 0 {
			return Err(err!("n_examples_per_batch must be at least 1"));
		}
		let n_features = features.ncols();
		let holdout_fraction = options
			.early_stopping_options
			.as_ref()
			.map(|options| options.holdout_fraction)
			.unwrap_or(0.0);
		let Holdout {
			features_train,
			labels_train,
			features_holdout,
			labels_holdout,
		} = Holdout::split(features.view(), labels.view(), holdout_fraction);
		if labels_train.is_empty() {
			return Err(err!("the early stopping fraction leaves no examples to train on"));
		}
		let mut model = Self {
			bias: 0.0,
			weights: Array1::<f32>::zeros(n_features),
			losses: vec![],
		};
		let mut early_stopping_monitor = options
			.early_stopping_options
			.as_ref()
			.filter(|_| !labels_holdout.is_empty())
			.map(EarlyStoppingMonitor::new);
		for epoch in 0..options.max_epochs {
			for (features, labels) in zip!(
				features_train.axis_chunks_iter(Axis(0), options.n_examples_per_batch),
				labels_train.axis_chunks_iter(Axis(0), options.n_examples_per_batch),
			) {
				model.train_batch(features, labels, options);
			}
			if !model.bias.is_finite() || model.weights.iter().any(|weight| !weight.is_finite()) {
				return Err(err!("training diverged at epoch {}", epoch));
			}
			if let Some(early_stopping_monitor) = early_stopping_monitor.as_mut() {
				let loss = model.compute_early_stopping_metric_value(features_holdout, labels_holdout);
				if !loss.is_finite() {
					return Err(err!("training diverged at epoch {}, the holdout loss is {}", epoch, loss));
				}
				model.losses.push(loss);
				if early_stopping_monitor.update(loss) {
					tracing::debug!(epoch, loss, "stopping early");
					break;
				}
			}
		}
		Ok(model)
	}

	fn train_batch(&mut self, features: ArrayView2<f32>, labels: ArrayView1<f32>, options: &TrainOptions) {
		let learning_rate = options.learning_rate;
		let predictions = features.dot(&self.weights) + self.bias;
		let py = (predictions - labels).insert_axis(Axis(1));
		let weight_gradients = match (&features * &py).mean_axis(Axis(0)) {
			Some(weight_gradients) => weight_gradients,
			None => return,
		};
		let bias_gradient = py.mean().unwrap_or(0.0);
		for (weight, weight_gradient) in zip!(self.weights.iter_mut(), weight_gradients.iter()) {
			*weight -= learning_rate * (weight_gradient + options.l2_regularization * *weight);
		}
		self.bias -= learning_rate * bias_gradient;
	}

	fn compute_early_stopping_metric_value(&self, features: ArrayView2<f32>, labels: ArrayView1<f32>) -> f32 {
		let predictions = self.predict(features);
		let mut metric = MeanSquaredError::default();
		for (prediction, label) in zip!(predictions.iter(), labels.iter()) {
			metric.update((*prediction, *label));
		}
		metric.finalize().unwrap_or(f32::INFINITY)
	}

	/// Write predictions into `predictions` for the input `features`.
	pub fn predict_into(&self, features: ArrayView2<f32>, mut predictions: ArrayViewMut1<f32>) {
		predictions.fill(self.bias);
		ndarray::linalg::general_mat_vec_mul(1.0, &features, &self.weights, 1.0, &mut predictions);
	}

	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<f32> {
		let mut predictions = Array1::zeros(features.nrows());
		self.predict_into(features, predictions.view_mut());
		predictions
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::EarlyStoppingOptions;

	fn line() -> (Array2<f32>, Array1<f32>) {
		let features = Array2::from_shape_fn((200, 1), |(i, _)| i as f32 / 100.0 - 1.0);
		let labels = features.column(0).mapv(|x| 2.0 * x + 1.0);
		(features, labels)
	}

	#[test]
	fn test_fits_line() {
		let (features, labels) = line();
		let options = TrainOptions {
			max_epochs: 1000,
			early_stopping_options: None,
			..Default::default()
		};
		let model = Regressor::train(features.view(), labels.view(), &options).unwrap();
		assert!((model.weights[0] - 2.0).abs() < 0.01, "weight was {}", model.weights[0]);
		assert!((model.bias - 1.0).abs() < 0.01, "bias was {}", model.bias);
		assert!(model.losses.is_empty());
	}

	#[test]
	fn test_l2_regularization_shrinks_weights() {
		let (features, labels) = line();
		let options = TrainOptions {
			max_epochs: 1000,
			l2_regularization: 1.0,
			early_stopping_options: None,
			..Default::default()
		};
		let model = Regressor::train(features.view(), labels.view(), &options).unwrap();
		assert!(model.weights[0] < 1.9);
		assert!(model.weights[0] > 0.0);
	}

	#[test]
	fn test_early_stopping_records_losses() {
		let (features, labels) = line();
		let options = TrainOptions {
			max_epochs: 1000,
			early_stopping_options: Some(EarlyStoppingOptions {
				holdout_fraction: 0.1,
				patience: 3,
				min_improvement: 1e-3,
			}),
			..Default::default()
		};
		let model = Regressor::train(features.view(), labels.view(), &options).unwrap();
		assert!(!model.losses.is_empty());
		assert!(model.losses.len() < 1000);
	}

	#[test]
	fn test_mismatched_lengths() {
		let features = Array2::<f32>::zeros((3, 1));
		let labels = arr1(&[1.0, 2.0]);
		assert!(Regressor::train(features.view(), labels.view(), &TrainOptions::default()).is_err());
	}

	#[test]
	fn test_overflowing_weights_fail_training() {
		let features = Array2::from_shape_fn((200, 1), |(i, _)| i as f32 - 100.0);
		let labels = features.column(0).mapv(|x| 2.0 * x + 1.0);
		let options = TrainOptions {
			learning_rate: 1e38,
			max_epochs: 1,
			n_examples_per_batch: 200,
			early_stopping_options: None,
			..Default::default()
		};
		let error = Regressor::train(features.view(), labels.view(), &options).unwrap_err();
		assert!(error.to_string().contains("diverged"), "{}", error);
	}
}
