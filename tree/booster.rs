use crate::{
	train::{train_tree, TrainTreeInput},
	Node, Tree, TreeOptions,
};
use hazard_util::{err, error::Result};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// A `Booster` predicts `bias` plus the sum of its trees' outputs. Each tree is trained on the squared error gradients of the trees before it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Booster {
	/// The mean label of the training data, which is the prediction before any trees are added.
	pub bias: f32,
	pub n_features: usize,
	/// The learning rate is already applied to the leaf values of these trees.
	pub trees: Vec<Tree>,
}

/// These are the options passed to `Booster::train`.
#[derive(Clone, Debug, PartialEq)]
pub struct BoosterOptions {
	pub n_rounds: usize,
	/// The learning rate scales the leaf values to control the effect each tree has on the output.
	pub learning_rate: f32,
	/// The fraction of training examples sampled without replacement for each tree.
	pub subsample: f32,
	/// The fraction of features sampled for each tree.
	pub colsample_bytree: f32,
	pub tree_options: TreeOptions,
	pub seed: u64,
}

impl Default for BoosterOptions {
	fn default() -> Self {
		Self {
			n_rounds: 100,
			learning_rate: 0.1,
			subsample: 1.0,
			colsample_bytree: 1.0,
			tree_options: TreeOptions {
				max_depth: Some(6),
				l2_regularization: 1.0,
				..Default::default()
			},
			seed: 42,
		}
	}
}

impl Booster {
	pub fn train(features: ArrayView2<f32>, labels: ArrayView1<f32>, options: &BoosterOptions) -> Result<Booster> {
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
		if labels.iter().any(|label| !label.is_finite()) {
			return Err(err!("labels must be finite"));
		}
		if !(options.learning_rate > 0.0) || !options.learning_rate.is_finite() {
			return Err(err!("learning_rate must be positive, got {}", options.learning_rate));
		}
		if !(options.subsample > 0.0 && options.subsample <= 1.0) {
			return Err(err!("subsample must be in (0, 1], got {}", options.subsample));
		}
		if !(options.colsample_bytree > 0.0 && options.colsample_bytree <= 1.0) {
			return Err(err!(
				"colsample_bytree must be in (0, 1], got {}",
				options.colsample_bytree
			));
		}
		let n_examples = labels.len();
		let n_features = features.ncols();
		let bias = labels.mean().unwrap_or(0.0);
		let mut predictions = Array1::<f32>::from_elem(n_examples, bias);
		let hessians = Array1::<f32>::ones(n_examples);
		let n_examples_per_tree = fraction_of(n_examples, options.subsample);
		let n_features_per_tree = fraction_of(n_features, options.colsample_bytree);
		let all_examples: Vec<usize> = (0..n_examples).collect();
		let all_features: Vec<usize> = (0..n_features).collect();
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let mut trees = Vec::with_capacity(options.n_rounds);
		for _ in 0..options.n_rounds {
			let gradients = (&predictions - &labels).insert_axis(Axis(1));
			let examples: Vec<usize> = if n_examples_per_tree < n_examples {
				all_examples
					.choose_multiple(&mut rng, n_examples_per_tree)
					.copied()
					.collect()
			} else {
				all_examples.clone()
			};
			let mut feature_indices: Vec<usize> = if n_features_per_tree < n_features {
				all_features
					.choose_multiple(&mut rng, n_features_per_tree)
					.copied()
					.collect()
			} else {
				all_features.clone()
			};
			feature_indices.sort_unstable();
			let mut tree = train_tree(
				TrainTreeInput {
					features: features.view(),
					gradients: gradients.view(),
					hessians: hessians.view(),
					examples,
					feature_indices: &feature_indices,
				},
				&options.tree_options,
				&mut rng,
			);
			for node in tree.nodes.iter_mut() {
				if let Node::Leaf(leaf) = node {
					for value in leaf.value.iter_mut() {
						*value *= options.learning_rate;
					}
				}
			}
			for (prediction, example) in predictions.iter_mut().zip(features.axis_iter(Axis(0))) {
				*prediction += tree.predict(example)[0];
			}
			trees.push(tree);
		}
		tracing::debug!(n_trees = trees.len(), "trained booster");
		Ok(Booster {
			bias,
			n_features,
			trees,
		})
	}

	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<f32> {
		features
			.axis_iter(Axis(0))
			.map(|example| {
				self.bias
					+ self
						.trees
						.iter()
						.map(|tree| tree.predict(example.view())[0])
						.sum::<f32>()
			})
			.collect()
	}
}

fn fraction_of(n: usize, fraction: f32) -> usize {
	(n.to_f32().unwrap_or(0.0) * fraction)
		.ceil()
		.to_usize()
		.unwrap_or(n)
		.max(1)
		.min(n.max(1))
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::GrowthStrategy;

	fn dataset() -> (Array2<f32>, Array1<f32>) {
		let features = Array2::from_shape_fn((300, 3), |(i, j)| ((i * (j + 3)) % 17) as f32);
		let labels = features
			.axis_iter(Axis(0))
			.map(|row| 2.0 * row[0] - row[1] + if row[2] > 8.0 { 5.0 } else { 0.0 })
			.collect();
		(features, labels)
	}

	fn mse(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
		(a - b).mapv(|x| x * x).mean().unwrap()
	}

	#[test]
	fn test_depth_wise_booster_improves_on_bias() {
		let (features, labels) = dataset();
		let options = BoosterOptions {
			n_rounds: 50,
			learning_rate: 0.3,
			subsample: 0.9,
			colsample_bytree: 0.9,
			..Default::default()
		};
		let booster = Booster::train(features.view(), labels.view(), &options).unwrap();
		let baseline = Array1::from_elem(labels.len(), booster.bias);
		let predictions = booster.predict(features.view());
		assert!(mse(&predictions, &labels) < 0.1 * mse(&baseline, &labels));
	}

	#[test]
	fn test_leaf_wise_booster_limits_leaves() {
		let (features, labels) = dataset();
		let options = BoosterOptions {
			n_rounds: 10,
			tree_options: TreeOptions {
				growth_strategy: GrowthStrategy::LeafWise { max_leaf_nodes: 4 },
				max_depth: None,
				..Default::default()
			},
			..Default::default()
		};
		let booster = Booster::train(features.view(), labels.view(), &options).unwrap();
		assert!(booster.trees.iter().all(|tree| tree.n_leaves() <= 4));
	}

	#[test]
	fn test_invalid_learning_rate() {
		let (features, labels) = dataset();
		let options = BoosterOptions {
			learning_rate: 0.0,
			..Default::default()
		};
		assert!(Booster::train(features.view(), labels.view(), &options).is_err());
	}
}
