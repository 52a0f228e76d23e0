/*!
This module turns a raw dataframe into train and test feature matrices. Number columns are standardized, enum columns are one-hot encoded, and the rows are shuffled with a fixed seed and split into train and test partitions.
*/

use hazard_dataframe::{Column, ColumnView, DataFrame};
use hazard_features::{
	compute_feature_names, compute_features_array_f32, FeatureGroup, NormalizedFeatureGroup,
	OneHotEncodedFeatureGroup,
};
use hazard_util::{err, error::Result};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

pub const DEFAULT_DROP_COLUMNS: &[&str] = &["date", "latitude", "longitude"];

#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessOptions {
	pub target_column_name: String,
	/// These columns are removed if they are present.
	pub drop_columns: Vec<String>,
	/// Preprocessing fails if any of these columns is absent.
	pub required_columns: Vec<String>,
	pub test_fraction: f32,
	pub seed: u64,
}

impl Default for PreprocessOptions {
	fn default() -> Self {
		Self {
			target_column_name: "landslide_occurred".to_owned(),
			drop_columns: DEFAULT_DROP_COLUMNS.iter().map(|name| (*name).to_owned()).collect(),
			required_columns: Vec::new(),
			test_fraction: 0.2,
			seed: 42,
		}
	}
}

#[derive(Clone, Debug)]
pub struct Dataset {
	pub features_train: Array2<f32>,
	pub labels_train: Array1<f32>,
	pub features_test: Array2<f32>,
	pub labels_test: Array1<f32>,
	/// The fitted feature groups. Applying them to a dataframe reproduces the feature columns of `features_train`.
	pub feature_groups: Vec<FeatureGroup>,
	pub feature_names: Vec<String>,
	pub target_column_name: String,
}

pub fn preprocess(mut dataframe: DataFrame, options: &PreprocessOptions) -> Result<Dataset> {
	tracing::info!(columns = ?dataframe.column_names(), "available columns");
	if !(options.test_fraction > 0.0 && options.test_fraction < 1.0) {
		return Err(err!(
			"test_fraction must be between 0 and 1, got {}",
			options.test_fraction
		));
	}
	let missing: Vec<&str> = std::iter::once(options.target_column_name.as_str())
		.chain(options.required_columns.iter().map(|name| name.as_str()))
		.filter(|name| dataframe.column_index(name).is_none())
		.collect();
	if !missing.is_empty() {
		let error = err!("missing required columns: {}", missing.join(", "));
		tracing::error!(%error, "error in data preprocessing");
		return Err(error);
	}
	let drop_columns: Vec<&str> = options
		.drop_columns
		.iter()
		.map(|name| name.as_str())
		.filter(|name| *name != options.target_column_name)
		.collect();
	let dropped = dataframe.drop_columns(&drop_columns);
	if !dropped.is_empty() {
		tracing::info!(?dropped, "dropped columns");
	}
	dataframe.shuffle_rows(options.seed);
	let target_column = match dataframe.take_column(&options.target_column_name) {
		Some(Column::Number(column)) => column,
		Some(_) => {
			return Err(err!(
				"target column \"{}\" must be a number column",
				options.target_column_name
			))
		}
		None => return Err(err!("missing required columns: {}", options.target_column_name)),
	};

	// Scaling statistics are fit on every row, before the split.
	let mut numeric_feature_groups = Vec::new();
	let mut categorical_feature_groups = Vec::new();
	for column in dataframe.view().columns.iter() {
		match column {
			ColumnView::Number(column) => numeric_feature_groups.push(FeatureGroup::Normalized(
				NormalizedFeatureGroup::fit(column.clone()),
			)),
			ColumnView::Enum(column) => categorical_feature_groups.push(FeatureGroup::OneHotEncoded(
				OneHotEncodedFeatureGroup::fit(column.clone()),
			)),
			ColumnView::Text(column) => {
				tracing::warn!(column = column.name, "skipping text column")
			}
			ColumnView::Unknown(column) => {
				tracing::warn!(column = column.name, "skipping column with no valid values")
			}
		}
	}
	tracing::info!(
		numeric = ?numeric_feature_groups.iter().map(|g| g.source_column_name()).collect::<Vec<_>>(),
		categorical = ?categorical_feature_groups.iter().map(|g| g.source_column_name()).collect::<Vec<_>>(),
		"column kinds",
	);
	let mut feature_groups = numeric_feature_groups;
	feature_groups.extend(categorical_feature_groups);
	let feature_names = compute_feature_names(&feature_groups);
	let features = compute_features_array_f32(&dataframe.view(), &feature_groups)?;

	// Rows without a valid target cannot be used for training or evaluation.
	let keep: Vec<usize> = target_column
		.data
		.iter()
		.enumerate()
		.filter(|(_, label)| label.is_finite())
		.map(|(index, _)| index)
		.collect();
	if keep.len() < target_column.data.len() {
		tracing::warn!(
			n_rows = target_column.data.len() - keep.len(),
			"dropping rows with an invalid target"
		);
	}
	let features = features.select(Axis(0), &keep);
	let labels: Array1<f32> = keep.iter().map(|index| target_column.data[*index]).collect();
	let n_rows = labels.len();
	let n_test = (options.test_fraction * n_rows.to_f32().unwrap_or(0.0))
		.ceil()
		.to_usize()
		.unwrap_or(0)
		.min(n_rows);
	let n_train = n_rows - n_test;
	if n_train == 0 || n_test == 0 {
		return Err(err!(
			"{} rows are not enough to split into train and test partitions",
			n_rows
		));
	}
	let (features_train, features_test) = features.view().split_at(Axis(0), n_train);
	let (labels_train, labels_test) = labels.view().split_at(Axis(0), n_train);
	let dataset = Dataset {
		features_train: features_train.to_owned(),
		labels_train: labels_train.to_owned(),
		features_test: features_test.to_owned(),
		labels_test: labels_test.to_owned(),
		feature_groups,
		feature_names,
		target_column_name: options.target_column_name.clone(),
	};
	tracing::info!(
		train = ?dataset.features_train.dim(),
		test = ?dataset.features_test.dim(),
		"preprocessed data",
	);
	Ok(dataset)
}

/// Log the shapes of `features` and `labels`, and warn if either contains values that are not finite.
pub fn check_data(features: ArrayView2<f32>, labels: ArrayView1<f32>, name: &str) -> bool {
	tracing::info!(dataset = name, features = ?features.dim(), labels = labels.len(), "checking dataset");
	let mut ok = true;
	if features.iter().any(|value| !value.is_finite()) {
		tracing::warn!(dataset = name, "non-finite values found in features");
		ok = false;
	}
	if labels.iter().any(|value| !value.is_finite()) {
		tracing::warn!(dataset = name, "non-finite values found in target");
		ok = false;
	}
	ok
}
