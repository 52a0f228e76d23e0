/*!
This crate implements the feature groups that turn dataframe columns into the `f32` feature matrix consumed by the models. A feature group is fit once on training data, persisted with the model, and applied unchanged at prediction time, so the feature columns and their order are always the same in training and serving.
*/

#![allow(clippy::tabs_in_doc_comments)]

use hazard_dataframe::{ColumnView, DataFrameView};
use hazard_util::{err, error::Result};
use ndarray::prelude::*;

mod identity;
mod normalized;
mod one_hot_encoded;

pub use self::identity::IdentityFeatureGroup;
pub use self::normalized::NormalizedFeatureGroup;
pub use self::one_hot_encoded::OneHotEncodedFeatureGroup;

/// This enum describes how to transform one column from the input dataframe to one or more columns in the output features.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FeatureGroup {
	Identity(IdentityFeatureGroup),
	Normalized(NormalizedFeatureGroup),
	OneHotEncoded(OneHotEncodedFeatureGroup),
}

impl FeatureGroup {
	pub fn source_column_name(&self) -> &str {
		match self {
			Self::Identity(s) => &s.source_column_name,
			Self::Normalized(s) => &s.source_column_name,
			Self::OneHotEncoded(s) => &s.source_column_name,
		}
	}

	pub fn n_features(&self) -> usize {
		match self {
			Self::Identity(_) => 1,
			Self::Normalized(_) => 1,
			Self::OneHotEncoded(s) => s.options.len(),
		}
	}

	/// Number and normalized features are named after their source column. One-hot features are named `{column}_{option}`.
	pub fn feature_names(&self) -> Vec<String> {
		match self {
			Self::Identity(s) => vec![s.source_column_name.clone()],
			Self::Normalized(s) => vec![s.source_column_name.clone()],
			Self::OneHotEncoded(s) => s
				.options
				.iter()
				.map(|option| format!("{}_{}", s.source_column_name, option))
				.collect(),
		}
	}

	/// Write this feature group's features for `column` into `features`, which must have `n_features()` columns.
	pub fn compute_array_f32(&self, features: ArrayViewMut2<f32>, column: &ColumnView) -> Result<()> {
		match self {
			Self::Identity(s) => s.compute_array_f32(features, column),
			Self::Normalized(s) => s.compute_array_f32(features, column),
			Self::OneHotEncoded(s) => s.compute_array_f32(features, column),
		}
	}
}

pub fn compute_feature_names(feature_groups: &[FeatureGroup]) -> Vec<String> {
	feature_groups
		.iter()
		.flat_map(|feature_group| feature_group.feature_names())
		.collect()
}

/**
Compute the feature matrix for `dataframe`. The columns of the output are the features of each group in order.

A feature group whose source column is not present in `dataframe` produces all zero features.
*/
pub fn compute_features_array_f32(
	dataframe: &DataFrameView,
	feature_groups: &[FeatureGroup],
) -> Result<Array2<f32>> {
	let n_features = feature_groups.iter().map(|group| group.n_features()).sum();
	let mut features = Array2::<f32>::zeros((dataframe.nrows(), n_features));
	let mut offset = 0;
	for feature_group in feature_groups.iter() {
		let n = feature_group.n_features();
		let slice = features.slice_mut(s![.., offset..offset + n]);
		match dataframe.column(feature_group.source_column_name()) {
			Some(column) => feature_group.compute_array_f32(slice, column)?,
			None => tracing::debug!(
				column = feature_group.source_column_name(),
				"column is missing, its features are filled with zeros",
			),
		}
		offset += n;
	}
	Ok(features)
}

fn unsupported_column(kind: &str, column: &ColumnView) -> hazard_util::error::Error {
	let column_type = match column {
		ColumnView::Unknown(_) => "unknown",
		ColumnView::Number(_) => "number",
		ColumnView::Enum(_) => "enum",
		ColumnView::Text(_) => "text",
	};
	err!(
		"{} feature group cannot be computed from {} column \"{}\"",
		kind,
		column_type,
		column.name()
	)
}

#[cfg(test)]
mod test {
	use super::*;
	use hazard_dataframe::{Column, DataFrame, NumberColumn, TextColumn};

	fn feature_groups() -> Vec<FeatureGroup> {
		vec![
			FeatureGroup::Normalized(NormalizedFeatureGroup {
				source_column_name: "slope".to_owned(),
				mean: 30.0,
				variance: 100.0,
			}),
			FeatureGroup::OneHotEncoded(OneHotEncodedFeatureGroup {
				source_column_name: "land_use".to_owned(),
				options: vec!["forest".to_owned(), "urban".to_owned()],
			}),
			FeatureGroup::Identity(IdentityFeatureGroup {
				source_column_name: "depth".to_owned(),
			}),
		]
	}

	#[test]
	fn test_feature_names() {
		insta::assert_debug_snapshot!(compute_feature_names(&feature_groups()), @r###"
  [
      "slope",
      "land_use_forest",
      "land_use_urban",
      "depth",
  ]
  "###);
	}

	#[test]
	fn test_compute_features_with_missing_column_and_unknown_option() {
		let dataframe = DataFrame {
			columns: vec![
				Column::Text(TextColumn {
					name: "land_use".to_owned(),
					data: vec!["urban".to_owned(), "swamp".to_owned()],
				}),
				Column::Number(NumberColumn {
					name: "slope".to_owned(),
					data: vec![40.0, f32::NAN],
				}),
			],
		};
		let features = compute_features_array_f32(&dataframe.view(), &feature_groups()).unwrap();
		assert_eq!(
			features,
			arr2(&[[1.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 0.0]])
		);
	}

	#[test]
	fn test_type_mismatch() {
		let dataframe = DataFrame {
			columns: vec![Column::Text(TextColumn {
				name: "slope".to_owned(),
				data: vec!["steep".to_owned()],
			})],
		};
		let error = compute_features_array_f32(&dataframe.view(), &feature_groups()).unwrap_err();
		assert_eq!(
			error.to_string(),
			"normalized feature group cannot be computed from text column \"slope\""
		);
	}
}
