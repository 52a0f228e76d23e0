use crate::{BranchNode, GrowthStrategy, LeafNode, Node, TreeOptions, Tree};
use ndarray::prelude::*;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::{cmp::Ordering, collections::VecDeque};

/// The inputs to `train_tree`. `gradients` has one column per target and `hessians` one value per example. `examples` holds the indexes of the rows to fit and may contain repeats.
pub struct TrainTreeInput<'a> {
	pub features: ArrayView2<'a, f32>,
	pub gradients: ArrayView2<'a, f32>,
	pub hessians: ArrayView1<'a, f32>,
	pub examples: Vec<usize>,
	pub feature_indices: &'a [usize],
}

#[derive(Clone, Debug)]
struct NodeStats {
	n_examples: usize,
	sum_gradients: Vec<f64>,
	sum_hessians: f64,
}

struct Split {
	feature_index: usize,
	split_value: f32,
	gain: f64,
}

struct QueueItem {
	node_index: usize,
	depth: usize,
	examples: Vec<usize>,
	split: Split,
}

/// Grow a single tree. Leaf values are `-threshold(G) / (H + l2)` for each target, where `G` and `H` are the sums of gradients and hessians of the examples in the leaf and `threshold` applies the l1 penalty.
pub fn train_tree(input: TrainTreeInput, options: &TreeOptions, rng: &mut Xoshiro256Plus) -> Tree {
	let max_leaf_nodes = match options.growth_strategy {
		GrowthStrategy::DepthWise => usize::MAX,
		GrowthStrategy::LeafWise { max_leaf_nodes } => max_leaf_nodes.max(1),
	};
	let n_features_per_split = options.max_features.resolve(input.feature_indices.len());
	let root_stats = compute_stats(&input, &input.examples);
	let mut nodes = vec![leaf(&root_stats, options)];
	let mut n_leaves = 1;
	let mut queue = VecDeque::new();
	if let Some(split) = choose_split(&input, &input.examples, &root_stats, 0, options, n_features_per_split, rng) {
		queue.push_back(QueueItem {
			node_index: 0,
			depth: 0,
			examples: input.examples.clone(),
			split,
		});
	}
	while n_leaves < max_leaf_nodes {
		let item = match options.growth_strategy {
			GrowthStrategy::DepthWise => queue.pop_front(),
			GrowthStrategy::LeafWise { .. } => {
				let best = queue
					.iter()
					.enumerate()
					.max_by(|(_, a), (_, b)| a.split.gain.partial_cmp(&b.split.gain).unwrap_or(Ordering::Equal))
					.map(|(index, _)| index);
				best.and_then(|index| queue.remove(index))
			}
		};
		let item = match item {
			Some(item) => item,
			None => break,
		};
		let (left_examples, right_examples): (Vec<usize>, Vec<usize>) = item
			.examples
			.iter()
			.copied()
			.partition(|example| {
				!(input.features[[*example, item.split.feature_index]] > item.split.split_value)
			});
		let left_stats = compute_stats(&input, &left_examples);
		let right_stats = compute_stats(&input, &right_examples);
		let left_child_index = nodes.len();
		nodes.push(leaf(&left_stats, options));
		let right_child_index = nodes.len();
		nodes.push(leaf(&right_stats, options));
		nodes[item.node_index] = Node::Branch(BranchNode {
			left_child_index,
			right_child_index,
			feature_index: item.split.feature_index,
			split_value: item.split.split_value,
		});
		n_leaves += 1;
		let depth = item.depth + 1;
		for (node_index, examples, stats) in [
			(left_child_index, left_examples, left_stats),
			(right_child_index, right_examples, right_stats),
		] {
			if let Some(split) = choose_split(&input, &examples, &stats, depth, options, n_features_per_split, rng) {
				queue.push_back(QueueItem {
					node_index,
					depth,
					examples,
					split,
				});
			}
		}
	}
	Tree { nodes }
}

fn leaf(stats: &NodeStats, options: &TreeOptions) -> Node {
	let denominator = stats.sum_hessians + options.l2_regularization as f64;
	let value = stats
		.sum_gradients
		.iter()
		.map(|sum_gradients| {
			if denominator > 0.0 {
				(-threshold(*sum_gradients, options.l1_regularization as f64) / denominator) as f32
			} else {
				0.0
			}
		})
		.collect();
	Node::Leaf(LeafNode { value })
}

fn threshold(sum_gradients: f64, l1_regularization: f64) -> f64 {
	sum_gradients.signum() * (sum_gradients.abs() - l1_regularization).max(0.0)
}

fn score(stats: &NodeStats, options: &TreeOptions) -> f64 {
	let denominator = stats.sum_hessians + options.l2_regularization as f64;
	if denominator <= 0.0 {
		return 0.0;
	}
	stats
		.sum_gradients
		.iter()
		.map(|sum_gradients| threshold(*sum_gradients, options.l1_regularization as f64).powi(2))
		.sum::<f64>()
		/ denominator
}

fn compute_stats(input: &TrainTreeInput, examples: &[usize]) -> NodeStats {
	let mut stats = NodeStats {
		n_examples: examples.len(),
		sum_gradients: vec![0.0; input.gradients.ncols()],
		sum_hessians: 0.0,
	};
	for example in examples {
		for (sum, gradient) in stats.sum_gradients.iter_mut().zip(input.gradients.row(*example)) {
			*sum += *gradient as f64;
		}
		stats.sum_hessians += input.hessians[*example] as f64;
	}
	stats
}

fn can_split(n_examples: usize, depth: usize, options: &TreeOptions) -> bool {
	let depth_allowed = options.max_depth.map(|max_depth| depth < max_depth).unwrap_or(true);
	depth_allowed
		&& n_examples >= options.min_examples_split
		&& n_examples >= 2 * options.min_examples_leaf.max(1)
}

/// Invalid values sort first so they always end up in the left child.
fn compare_values(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Less,
		(false, true) => Ordering::Greater,
		(false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
	}
}

fn choose_split(
	input: &TrainTreeInput,
	examples: &[usize],
	stats: &NodeStats,
	depth: usize,
	options: &TreeOptions,
	n_features_per_split: usize,
	rng: &mut Xoshiro256Plus,
) -> Option<Split> {
	if !can_split(examples.len(), depth, options) {
		return None;
	}
	let mut candidate_features: Vec<usize> = if n_features_per_split < input.feature_indices.len() {
		input
			.feature_indices
			.choose_multiple(rng, n_features_per_split)
			.copied()
			.collect()
	} else {
		input.feature_indices.to_vec()
	};
	candidate_features.sort_unstable();
	let parent_score = score(stats, options);
	let min_gain = options.min_gain_to_split as f64 + 1e-12 * parent_score.abs().max(1.0);
	let splits: Vec<Split> = candidate_features
		.par_iter()
		.filter_map(|feature_index| {
			choose_split_for_feature(input, examples, stats, *feature_index, parent_score, options)
		})
		.collect();
	let mut best: Option<Split> = None;
	for split in splits {
		if split.gain > min_gain && best.as_ref().map(|best| split.gain > best.gain).unwrap_or(true) {
			best = Some(split);
		}
	}
	best
}

fn choose_split_for_feature(
	input: &TrainTreeInput,
	examples: &[usize],
	stats: &NodeStats,
	feature_index: usize,
	parent_score: f64,
	options: &TreeOptions,
) -> Option<Split> {
	let values = input.features.column(feature_index);
	let mut sorted = examples.to_vec();
	sorted.sort_by(|a, b| compare_values(values[*a], values[*b]));
	let min_examples_leaf = options.min_examples_leaf.max(1);
	let n = sorted.len();
	let mut left = NodeStats {
		n_examples: 0,
		sum_gradients: vec![0.0; stats.sum_gradients.len()],
		sum_hessians: 0.0,
	};
	let mut right = stats.clone();
	let mut best: Option<Split> = None;
	for i in 0..n.saturating_sub(1) {
		let example = sorted[i];
		for (l, (r, gradient)) in left
			.sum_gradients
			.iter_mut()
			.zip(right.sum_gradients.iter_mut().zip(input.gradients.row(example)))
		{
			*l += *gradient as f64;
			*r -= *gradient as f64;
		}
		let hessian = input.hessians[example] as f64;
		left.sum_hessians += hessian;
		right.sum_hessians -= hessian;
		left.n_examples += 1;
		right.n_examples -= 1;
		if left.n_examples < min_examples_leaf {
			continue;
		}
		if right.n_examples < min_examples_leaf {
			break;
		}
		let value = values[example];
		let next_value = values[sorted[i + 1]];
		if value.is_nan() || !(value < next_value) {
			continue;
		}
		let gain = score(&left, options) + score(&right, options) - parent_score;
		if best.as_ref().map(|best| gain > best.gain).unwrap_or(true) {
			let midpoint = value / 2.0 + next_value / 2.0;
			let split_value = if midpoint > value && midpoint < next_value {
				midpoint
			} else {
				value
			};
			best = Some(Split {
				feature_index,
				split_value,
				gain,
			});
		}
	}
	best
}

#[cfg(test)]
mod test {
	use super::*;
	use rand::SeedableRng;

	fn fit(features: &Array2<f32>, labels: &[f32], options: &TreeOptions) -> Tree {
		let gradients = Array2::from_shape_fn((labels.len(), 1), |(i, _)| -labels[i]);
		let hessians = Array1::<f32>::ones(labels.len());
		let feature_indices: Vec<usize> = (0..features.ncols()).collect();
		let mut rng = Xoshiro256Plus::seed_from_u64(0);
		train_tree(
			TrainTreeInput {
				features: features.view(),
				gradients: gradients.view(),
				hessians: hessians.view(),
				examples: (0..labels.len()).collect(),
				feature_indices: &feature_indices,
			},
			options,
			&mut rng,
		)
	}

	#[test]
	fn test_step_function() {
		let features = arr2(&[[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]]);
		let labels = [10.0, 10.0, 20.0, 20.0];
		let tree = fit(&features, &labels, &TreeOptions::default());
		assert_eq!(tree.n_leaves(), 2);
		match &tree.nodes[0] {
			Node::Branch(branch) => {
				assert_eq!(branch.feature_index, 0);
				assert_eq!(branch.split_value, 2.5);
			}
			Node::Leaf(_) => panic!("expected a branch"),
		}
		assert_eq!(tree.predict(arr1(&[1.5, 0.0]).view()), &[10.0]);
		assert_eq!(tree.predict(arr1(&[3.5, 0.0]).view()), &[20.0]);
		assert_eq!(tree.predict(arr1(&[f32::NAN, 0.0]).view()), &[10.0]);
	}

	#[test]
	fn test_max_depth_and_min_examples_leaf() {
		let features = Array2::from_shape_fn((8, 1), |(i, _)| i as f32);
		let labels = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
		let options = TreeOptions {
			max_depth: Some(1),
			..Default::default()
		};
		let tree = fit(&features, &labels, &options);
		assert_eq!(tree.depth(), 1);
		let options = TreeOptions {
			min_examples_leaf: 4,
			..Default::default()
		};
		let tree = fit(&features, &labels, &options);
		assert_eq!(tree.n_leaves(), 2);
	}

	#[test]
	fn test_leaf_wise_respects_max_leaf_nodes() {
		let features = Array2::from_shape_fn((16, 1), |(i, _)| i as f32);
		let labels: Vec<f32> = (0..16).map(|i| (i * i) as f32).collect();
		let options = TreeOptions {
			growth_strategy: GrowthStrategy::LeafWise { max_leaf_nodes: 3 },
			..Default::default()
		};
		let tree = fit(&features, &labels, &options);
		assert_eq!(tree.n_leaves(), 3);
	}

	#[test]
	fn test_constant_labels_do_not_split() {
		let features = Array2::from_shape_fn((6, 2), |(i, j)| (i + j) as f32);
		let labels = [3.0; 6];
		let tree = fit(&features, &labels, &TreeOptions::default());
		assert_eq!(tree.nodes.len(), 1);
		assert_eq!(tree.predict(arr1(&[0.0, 0.0]).view()), &[3.0]);
	}
}
