/*!
This crate implements a linear regressor, [`Regressor`](struct.Regressor.html), trained with minibatch gradient descent on the squared error with an optional L2 penalty on the weights, which makes it a ridge regressor.

Training stops after `max_epochs` or earlier when the loss on a held back fraction of the training data stops improving.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;
use num_traits::ToPrimitive;

mod regressor;

pub use regressor::Regressor;

/// These are the options passed to `Regressor::train`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainOptions {
	/// If `Some`, the tail of the training data is held out and training stops once the loss on it stops improving.
	pub early_stopping_options: Option<EarlyStoppingOptions>,
	/// The ridge penalty. Each update subtracts `learning_rate * l2_regularization * w` from the weights, so the penalty on the mean loss is `l2_regularization * |w|^2 / 2`.
	pub l2_regularization: f32,
	pub learning_rate: f32,
	pub max_epochs: usize,
	pub n_examples_per_batch: usize,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			l2_regularization: 0.0,
			learning_rate: 0.1,
			max_epochs: 100,
			n_examples_per_batch: 128,
			early_stopping_options: Some(EarlyStoppingOptions {
				holdout_fraction: 0.1,
				patience: 3,
				min_improvement: 1e-3,
			}),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct EarlyStoppingOptions {
	/// The fraction of the training rows held out to compute the loss after each epoch.
	pub holdout_fraction: f32,
	/// Training stops after this many consecutive epochs without an improvement.
	pub patience: usize,
	/// An epoch improves on the best loss so far only if it lowers it by more than this.
	pub min_improvement: f32,
}

/// The rows of `features` and `labels` used for training, and the held out tail used for early stopping.
struct Holdout<'a> {
	features_train: ArrayView2<'a, f32>,
	labels_train: ArrayView1<'a, f32>,
	features_holdout: ArrayView2<'a, f32>,
	labels_holdout: ArrayView1<'a, f32>,
}

impl<'a> Holdout<'a> {
	fn split(features: ArrayView2<'a, f32>, labels: ArrayView1<'a, f32>, fraction: f32) -> Self {
		let n_rows = features.nrows();
		let n_train = ((1.0 - fraction) * n_rows.to_f32().unwrap_or(0.0))
			.to_usize()
			.unwrap_or(n_rows)
			.min(n_rows);
		let (features_train, features_holdout) = features.split_at(Axis(0), n_train);
		let (labels_train, labels_holdout) = labels.split_at(Axis(0), n_train);
		Holdout {
			features_train,
			labels_train,
			features_holdout,
			labels_holdout,
		}
	}
}

/// Tracks the best held out loss and how many epochs have passed since it last improved.
struct EarlyStoppingMonitor {
	min_improvement: f32,
	patience: usize,
	best_loss: Option<f32>,
	n_epochs_without_improvement: usize,
}

impl EarlyStoppingMonitor {
	fn new(options: &EarlyStoppingOptions) -> Self {
		EarlyStoppingMonitor {
			min_improvement: options.min_improvement,
			patience: options.patience,
			best_loss: None,
			n_epochs_without_improvement: 0,
		}
	}

	/// Record the loss of the epoch that just finished. Returns true if training should stop.
	fn update(&mut self, loss: f32) -> bool {
		match self.best_loss {
			Some(best_loss) if best_loss - loss <= self.min_improvement => {
				self.n_epochs_without_improvement += 1;
				self.n_epochs_without_improvement >= self.patience
			}
			_ => {
				self.best_loss = Some(loss);
				self.n_epochs_without_improvement = 0;
				false
			}
		}
	}
}

#[test]
fn test_early_stopping_monitor() {
	let mut monitor = EarlyStoppingMonitor::new(&EarlyStoppingOptions {
		holdout_fraction: 0.1,
		patience: 2,
		min_improvement: 0.01,
	});
	assert!(!monitor.update(1.0));
	assert!(!monitor.update(0.5));
	// Neither epoch improves on 0.5 by more than 0.01.
	assert!(!monitor.update(0.499));
	assert!(monitor.update(0.6));
}

#[test]
fn test_holdout_split() {
	let features = Array2::<f32>::zeros((10, 2));
	let labels = Array1::<f32>::zeros(10);
	let holdout = Holdout::split(features.view(), labels.view(), 0.2);
	assert_eq!(holdout.features_train.nrows(), 8);
	assert_eq!(holdout.labels_train.len(), 8);
	assert_eq!(holdout.features_holdout.nrows(), 2);
	assert_eq!(holdout.labels_holdout.len(), 2);
}
