use crate::{
	train::{train_tree, TrainTreeInput},
	MaxFeatures, Tree, TreeOptions,
};
use hazard_metrics::MeanVariance;
use hazard_util::{err, error::Result};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// A `Forest` averages the outputs of trees that were each trained on a bootstrap sample of the training data.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Forest {
	pub kind: ForestKind,
	pub n_features: usize,
	pub trees: Vec<Tree>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ForestKind {
	/// Each tree outputs a single value, the mean label of its leaf.
	Regressor,
	/// Each tree outputs the proportion of each class in its leaf.
	Classifier { n_classes: usize },
}

/// These are the options passed to `Forest::train_regressor` and `Forest::train_classifier`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForestOptions {
	pub n_trees: usize,
	/// If true, each tree is trained on a sample of the training data drawn with replacement. Otherwise each tree sees every example.
	pub bootstrap: bool,
	pub tree_options: TreeOptions,
	/// Tree `i` is trained with an rng seeded from `seed + i`, so training is reproducible regardless of thread scheduling.
	pub seed: u64,
}

impl Default for ForestOptions {
	fn default() -> Self {
		Self {
			n_trees: 100,
			bootstrap: true,
			tree_options: TreeOptions {
				max_features: MaxFeatures::Sqrt,
				..Default::default()
			},
			seed: 42,
		}
	}
}

impl Forest {
	/// Train a forest of regression trees.
	pub fn train_regressor(
		features: ArrayView2<f32>,
		labels: ArrayView1<f32>,
		options: &ForestOptions,
	) -> Result<Forest> {
		validate(features, labels.len(), options)?;
		if labels.iter().any(|label| !label.is_finite()) {
			return Err(err!("labels must be finite"));
		}
		let gradients = labels.mapv(|label| -label).insert_axis(Axis(1));
		let trees = train_trees(features, gradients.view(), options);
		Ok(Forest {
			kind: ForestKind::Regressor,
			n_features: features.ncols(),
			trees,
		})
	}

	/// Train a forest of classification trees. Labels are class indexes in `0..n_classes`.
	pub fn train_classifier(
		features: ArrayView2<f32>,
		labels: &[usize],
		n_classes: usize,
		options: &ForestOptions,
	) -> Result<Forest> {
		validate(features, labels.len(), options)?;
		if n_classes == 0 {
			return Err(err!("a classifier needs at least one class"));
		}
		if let Some(label) = labels.iter().find(|label| **label >= n_classes) {
			return Err(err!("label {} is out of range for {} classes", label, n_classes));
		}
		// Fitting trees to negative one-hot targets with unit hessians makes the split gain the decrease in Gini impurity.
		let mut gradients = Array2::<f32>::zeros((labels.len(), n_classes));
		for (mut row, label) in gradients.axis_iter_mut(Axis(0)).zip(labels.iter()) {
			row[*label] = -1.0;
		}
		let trees = train_trees(features, gradients.view(), options);
		Ok(Forest {
			kind: ForestKind::Classifier { n_classes },
			n_features: features.ncols(),
			trees,
		})
	}

	/// The mean of each tree's outputs for every example, with one column per output.
	pub fn predict_outputs(&self, features: ArrayView2<f32>) -> Array2<f32> {
		let n_outputs = match self.kind {
			ForestKind::Regressor => 1,
			ForestKind::Classifier { n_classes } => n_classes,
		};
		let mut outputs = Array2::<f32>::zeros((features.nrows(), n_outputs));
		let n_trees = self.trees.len().to_f32().unwrap_or(1.0).max(1.0);
		for (example, mut output) in features.axis_iter(Axis(0)).zip(outputs.axis_iter_mut(Axis(0))) {
			for tree in self.trees.iter() {
				for (output, value) in output.iter_mut().zip(tree.predict(example.view())) {
					*output += *value;
				}
			}
			output.mapv_inplace(|value| value / n_trees);
		}
		outputs
	}

	/// For a regressor, the mean prediction of the trees. For a classifier, the index of the most probable class.
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<f32> {
		let outputs = self.predict_outputs(features);
		match self.kind {
			ForestKind::Regressor => outputs.column(0).to_owned(),
			ForestKind::Classifier { .. } => outputs
				.axis_iter(Axis(0))
				.map(|probabilities| argmax(probabilities).to_f32().unwrap_or(0.0))
				.collect(),
		}
	}

	pub fn predict_classes(&self, features: ArrayView2<f32>) -> Vec<usize> {
		self.predict_outputs(features)
			.axis_iter(Axis(0))
			.map(argmax)
			.collect()
	}

	/// The standard deviation of the trees' first output for every example. For a regressor this measures how much the trees disagree about the prediction.
	pub fn predict_spread(&self, features: ArrayView2<f32>) -> Array1<f32> {
		features
			.axis_iter(Axis(0))
			.map(|example| {
				let values: Vec<f32> = self
					.trees
					.iter()
					.map(|tree| tree.predict(example.view()).first().copied().unwrap_or(0.0))
					.collect();
				MeanVariance::compute(&values).variance.sqrt()
			})
			.collect()
	}
}

fn argmax(values: ArrayView1<f32>) -> usize {
	let mut best = 0;
	for (index, value) in values.iter().enumerate() {
		if *value > values[best] {
			best = index;
		}
	}
	best
}

fn validate(features: ArrayView2<f32>, n_labels: usize, options: &ForestOptions) -> Result<()> {
	if features.nrows() != n_labels {
		return Err(err!(
			"features have {} rows but there are {} labels",
			features.nrows(),
			n_labels
		));
	}
	if n_labels == 0 {
		return Err(err!("cannot train on an empty dataset"));
	}
	if options.n_trees == 0 {
		return Err(err!("n_trees must be at least 1"));
	}
	Ok(())
}

fn train_trees(features: ArrayView2<f32>, gradients: ArrayView2<f32>, options: &ForestOptions) -> Vec<Tree> {
	let n_examples = features.nrows();
	let hessians = Array1::<f32>::ones(n_examples);
	let feature_indices: Vec<usize> = (0..features.ncols()).collect();
	let trees: Vec<Tree> = (0..options.n_trees)
		.into_par_iter()
		.map(|tree_index| {
			let mut rng = Xoshiro256Plus::seed_from_u64(options.seed.wrapping_add(tree_index as u64));
			let examples = if options.bootstrap {
				(0..n_examples).map(|_| rng.gen_range(0..n_examples)).collect()
			} else {
				(0..n_examples).collect()
			};
			train_tree(
				TrainTreeInput {
					features: features.view(),
					gradients: gradients.view(),
					hessians: hessians.view(),
					examples,
					feature_indices: &feature_indices,
				},
				&options.tree_options,
				&mut rng,
			)
		})
		.collect();
	tracing::debug!(n_trees = trees.len(), "trained forest");
	trees
}
