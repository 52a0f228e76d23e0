/*!
This crate implements ensembles of decision trees for regression and classification. A [`Forest`](struct.Forest.html) averages independently trained trees fit on bootstrap samples, like a random forest. A [`Booster`](struct.Booster.html) fits each tree to the residuals of the trees before it, in the manner of [XGBoost](https://github.com/dmlc/xgboost) when grown depth-wise and [LightGBM](https://github.com/microsoft/lightgbm) when grown leaf-wise.

Both are built on a single tree learner. Every tree is fit to per-example gradients and hessians, so the same learner grows variance-reducing regression trees, Gini-style classification trees over one-hot targets, and boosting trees.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;
use num_traits::ToPrimitive;

mod booster;
mod forest;
mod train;

pub use self::booster::{Booster, BoosterOptions};
pub use self::forest::{Forest, ForestKind, ForestOptions};

/// These are the options that control how a single tree is grown.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeOptions {
	pub growth_strategy: GrowthStrategy,
	/// The depth of a tree will never exceed this value. `None` means unlimited.
	pub max_depth: Option<usize>,
	/// A node will only be split if at least this many training examples reach it.
	pub min_examples_split: usize,
	/// A split will only be considered valid if each child receives at least this many training examples.
	pub min_examples_leaf: usize,
	/// The number of features considered when searching for the best split of each node.
	pub max_features: MaxFeatures,
	/// L1 regularization on the leaf values.
	pub l1_regularization: f32,
	/// L2 regularization on the leaf values.
	pub l2_regularization: f32,
	/// A node will only be split if the best split achieves more than this gain.
	pub min_gain_to_split: f32,
}

impl Default for TreeOptions {
	fn default() -> Self {
		Self {
			growth_strategy: GrowthStrategy::DepthWise,
			max_depth: None,
			min_examples_split: 2,
			min_examples_leaf: 1,
			max_features: MaxFeatures::All,
			l1_regularization: 0.0,
			l2_regularization: 0.0,
			min_gain_to_split: 0.0,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GrowthStrategy {
	/// Split every splittable node of one level before moving to the next.
	DepthWise,
	/// Always split the leaf with the largest gain next, until the tree has `max_leaf_nodes` leaves.
	LeafWise { max_leaf_nodes: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaxFeatures {
	All,
	Sqrt,
	Log2,
	Count(usize),
	Fraction(f32),
}

impl MaxFeatures {
	/// Resolve to a number of features in `1..=n_features`.
	pub fn resolve(&self, n_features: usize) -> usize {
		let n = n_features.to_f32().unwrap_or(0.0);
		let count = match self {
			MaxFeatures::All => n_features,
			MaxFeatures::Sqrt => n.sqrt().floor().to_usize().unwrap_or(1),
			MaxFeatures::Log2 => n.log2().floor().to_usize().unwrap_or(1),
			MaxFeatures::Count(count) => *count,
			MaxFeatures::Fraction(fraction) => (fraction * n).floor().to_usize().unwrap_or(1),
		};
		count.max(1).min(n_features.max(1))
	}
}

/// Trees are stored as a `Vec` of `Node`s. The root is the first node, and each branch holds the indexes of its two children.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

impl Tree {
	/// Make a prediction for a single example. The output has one value per target.
	pub fn predict(&self, example: ArrayView1<f32>) -> &[f32] {
		let mut node_index = 0;
		loop {
			match &self.nodes[node_index] {
				Node::Branch(branch) => {
					// Invalid values compare false and are sent left.
					node_index = if example[branch.feature_index] > branch.split_value {
						branch.right_child_index
					} else {
						branch.left_child_index
					};
				}
				Node::Leaf(leaf) => return &leaf.value,
			}
		}
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes.iter().filter(|node| matches!(node, Node::Leaf(_))).count()
	}

	pub fn depth(&self) -> usize {
		fn depth(nodes: &[Node], index: usize) -> usize {
			match &nodes[index] {
				Node::Leaf(_) => 0,
				Node::Branch(branch) => {
					1 + depth(nodes, branch.left_child_index).max(depth(nodes, branch.right_child_index))
				}
			}
		}
		if self.nodes.is_empty() {
			0
		} else {
			depth(&self.nodes, 0)
		}
	}
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// An example is sent to the left child if its value for `feature_index` is <= `split_value` or invalid, and to the right child otherwise.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BranchNode {
	pub left_child_index: usize,
	pub right_child_index: usize,
	pub feature_index: usize,
	pub split_value: f32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LeafNode {
	/// The value to output, one per target.
	pub value: Vec<f32>,
}

#[test]
fn test_max_features() {
	assert_eq!(MaxFeatures::Sqrt.resolve(26), 5);
	assert_eq!(MaxFeatures::Log2.resolve(26), 4);
	assert_eq!(MaxFeatures::All.resolve(26), 26);
	assert_eq!(MaxFeatures::Count(100).resolve(26), 26);
	assert_eq!(MaxFeatures::Fraction(0.01).resolve(26), 1);
	assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
}
