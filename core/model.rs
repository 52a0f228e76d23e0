/*!
This module is the model factory. A [`ModelName`](enum.ModelName.html) names one of the four supported model families, and [`Model::new`](enum.Model.html#method.new) turns a [`ModelConfig`](struct.ModelConfig.html) into a wrapper that can train a [`FittedModel`](enum.FittedModel.html) or score a hyperparameter trial.
*/

use crate::{
	hyperparameters::{out_of_range, wrong_type, HyperparameterValue, Hyperparameters},
	tune::{Trial, TrialOutcome},
};
use hazard_linear as linear;
use hazard_metrics::r2_score;
use hazard_tree::{Booster, BoosterOptions, Forest, ForestOptions, GrowthStrategy, MaxFeatures, TreeOptions};
use hazard_util::error::Result;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelName {
	#[serde(rename = "randomforest")]
	RandomForest,
	#[serde(rename = "xgboost")]
	XGBoost,
	#[serde(rename = "lightgbm")]
	LightGBM,
	#[serde(rename = "linear_regression")]
	LinearRegression,
}

impl ModelName {
	pub const ALL: [ModelName; 4] = [
		ModelName::RandomForest,
		ModelName::XGBoost,
		ModelName::LightGBM,
		ModelName::LinearRegression,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			ModelName::RandomForest => "randomforest",
			ModelName::XGBoost => "xgboost",
			ModelName::LightGBM => "lightgbm",
			ModelName::LinearRegression => "linear_regression",
		}
	}

	/// The hyperparameters every model of this family starts from.
	pub fn default_hyperparameters(&self) -> Hyperparameters {
		let mut hyperparameters = Hyperparameters::new();
		match self {
			ModelName::RandomForest => {
				hyperparameters.insert("n_estimators", 300);
				hyperparameters.insert("max_depth", 10);
				hyperparameters.insert("min_samples_split", 2);
				hyperparameters.insert("min_samples_leaf", 1);
				hyperparameters.insert("max_features", "sqrt");
				hyperparameters.insert("bootstrap", true);
			}
			ModelName::XGBoost | ModelName::LightGBM => {
				hyperparameters.insert("n_estimators", 500);
				hyperparameters.insert("learning_rate", 0.01);
				if let ModelName::XGBoost = self {
					hyperparameters.insert("max_depth", 7);
				} else {
					hyperparameters.insert("max_depth", -1);
					hyperparameters.insert("num_leaves", 64);
				}
				hyperparameters.insert("subsample", 0.9);
				hyperparameters.insert("colsample_bytree", 0.9);
				hyperparameters.insert("reg_alpha", 0.05);
				hyperparameters.insert("reg_lambda", 0.7);
			}
			ModelName::LinearRegression => {
				hyperparameters.insert("model_type", "ridge");
				hyperparameters.insert("alpha", 0.5);
			}
		}
		hyperparameters
	}
}

impl std::fmt::Display for ModelName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown model: {0}")]
pub struct ParseModelNameError(pub String);

impl std::str::FromStr for ModelName {
	type Err = ParseModelNameError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ModelName::ALL
			.iter()
			.find(|name| name.as_str() == s)
			.copied()
			.ok_or_else(|| ParseModelNameError(s.to_owned()))
	}
}

/// The configuration of a single training run of one model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
	pub name: ModelName,
	pub fine_tuning: bool,
	/// These are merged over the model's default hyperparameters.
	pub hyperparameters: Hyperparameters,
}

impl ModelConfig {
	pub fn new(name: ModelName) -> ModelConfig {
		ModelConfig {
			name,
			fine_tuning: false,
			hyperparameters: Hyperparameters::new(),
		}
	}
}

/// A trainable model wrapper. Each variant holds the defaults merged with the run's configured hyperparameters, and the seed its training is derived from.
#[derive(Clone, Debug)]
pub enum Model {
	RandomForest(ModelSettings),
	XGBoost(ModelSettings),
	LightGBM(ModelSettings),
	LinearRegression(ModelSettings),
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
	pub hyperparameters: Hyperparameters,
	pub seed: u64,
}

impl Model {
	pub fn new(config: &ModelConfig, seed: u64) -> Model {
		let settings = ModelSettings {
			hyperparameters: config
				.name
				.default_hyperparameters()
				.merged(&config.hyperparameters),
			seed,
		};
		match config.name {
			ModelName::RandomForest => Model::RandomForest(settings),
			ModelName::XGBoost => Model::XGBoost(settings),
			ModelName::LightGBM => Model::LightGBM(settings),
			ModelName::LinearRegression => Model::LinearRegression(settings),
		}
	}

	/// Create a model from its name. Unknown names are an error.
	pub fn from_name(name: &str, hyperparameters: &Hyperparameters, seed: u64) -> Result<Model> {
		let name: ModelName = name.parse()?;
		let config = ModelConfig {
			name,
			fine_tuning: false,
			hyperparameters: hyperparameters.clone(),
		};
		Ok(Model::new(&config, seed))
	}

	pub fn name(&self) -> ModelName {
		match self {
			Model::RandomForest(_) => ModelName::RandomForest,
			Model::XGBoost(_) => ModelName::XGBoost,
			Model::LightGBM(_) => ModelName::LightGBM,
			Model::LinearRegression(_) => ModelName::LinearRegression,
		}
	}

	pub fn settings(&self) -> &ModelSettings {
		match self {
			Model::RandomForest(settings) => settings,
			Model::XGBoost(settings) => settings,
			Model::LightGBM(settings) => settings,
			Model::LinearRegression(settings) => settings,
		}
	}

	/// The hyperparameters `train` would use with these overrides.
	pub fn resolve_hyperparameters(&self, overrides: &Hyperparameters) -> Hyperparameters {
		self.settings().hyperparameters.merged(overrides)
	}

	/// Train the model. `overrides` are merged over the configured hyperparameters.
	pub fn train(
		&self,
		features: ArrayView2<f32>,
		labels: ArrayView1<f32>,
		overrides: &Hyperparameters,
	) -> Result<FittedModel> {
		let hyperparameters = self.resolve_hyperparameters(overrides);
		let seed = self.settings().seed;
		tracing::info!(model = %self.name(), %hyperparameters, "training model");
		let model = match self {
			Model::RandomForest(_) => {
				let options = forest_options(&hyperparameters, seed)?;
				FittedModel::RandomForest(Forest::train_regressor(features, labels, &options)?)
			}
			Model::XGBoost(_) => {
				let options = booster_options(&hyperparameters, BoosterGrowth::DepthWise, seed)?;
				FittedModel::GradientBoosted(Booster::train(features, labels, &options)?)
			}
			Model::LightGBM(_) => {
				let options = booster_options(&hyperparameters, BoosterGrowth::LeafWise, seed)?;
				FittedModel::GradientBoosted(Booster::train(features, labels, &options)?)
			}
			Model::LinearRegression(_) => {
				let options = linear_options(&hyperparameters, labels.len())?;
				FittedModel::Linear(linear::Regressor::train(features, labels, &options)?)
			}
		};
		Ok(model)
	}

	/// Suggest values for this model's searchable hyperparameters, train with them, and score the result on the test data with R².
	pub fn optimize(
		&self,
		trial: &mut Trial,
		features_train: ArrayView2<f32>,
		labels_train: ArrayView1<f32>,
		features_test: ArrayView2<f32>,
		labels_test: ArrayView1<f32>,
	) -> TrialOutcome {
		match self {
			Model::RandomForest(_) => {
				trial.suggest_int("n_estimators", 1, 200);
				trial.suggest_int("max_depth", 1, 30);
				trial.suggest_int("min_samples_split", 2, 20);
				trial.suggest_int("min_samples_leaf", 1, 20);
			}
			Model::XGBoost(_) => {
				trial.suggest_int("n_estimators", 1, 200);
				trial.suggest_int("max_depth", 1, 30);
				trial.suggest_float("learning_rate", 1e-7, 1.0, true);
			}
			Model::LightGBM(_) => {
				trial.suggest_int("n_estimators", 1, 200);
				trial.suggest_int("max_depth", 1, 20);
				trial.suggest_float("learning_rate", 1e-7, 1.0, true);
			}
			// There is nothing to search, so every trial scores the configured model.
			Model::LinearRegression(_) => {}
		}
		let model = match self.train(features_train, labels_train, trial.params()) {
			Ok(model) => model,
			Err(error) => {
				tracing::error!(model = %self.name(), %error, "error during optimization");
				return TrialOutcome::Rejected(error.to_string());
			}
		};
		let predictions = model.predict(features_test);
		match r2_score(labels_test, predictions.view()) {
			Ok(score) if score.is_finite() => TrialOutcome::Scored(score),
			Ok(score) => TrialOutcome::Rejected(format!("score {} is not finite", score)),
			Err(error) => TrialOutcome::Rejected(error.to_string()),
		}
	}
}

/// A model produced by training. It is immutable and is persisted as part of a model artifact.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FittedModel {
	RandomForest(Forest),
	GradientBoosted(Booster),
	Linear(linear::Regressor),
}

impl FittedModel {
	pub fn predict(&self, features: ArrayView2<f32>) -> Array1<f32> {
		match self {
			FittedModel::RandomForest(model) => model.predict(features),
			FittedModel::GradientBoosted(model) => model.predict(features),
			FittedModel::Linear(model) => model.predict(features),
		}
	}

	/// The standard deviation of the individual trees' predictions, for models that are an average of trees.
	pub fn predict_spread(&self, features: ArrayView2<f32>) -> Option<Array1<f32>> {
		match self {
			FittedModel::RandomForest(model) => Some(model.predict_spread(features)),
			FittedModel::GradientBoosted(_) | FittedModel::Linear(_) => None,
		}
	}
}

enum BoosterGrowth {
	DepthWise,
	LeafWise,
}

fn optional_max_depth(hyperparameters: &Hyperparameters) -> Result<Option<usize>> {
	if !hyperparameters.contains("max_depth") {
		return Ok(None);
	}
	let max_depth = hyperparameters.int("max_depth")?;
	match max_depth {
		-1 => Ok(None),
		max_depth if max_depth >= 1 => Ok(max_depth.to_usize()),
		max_depth => Err(out_of_range(
			"max_depth",
			HyperparameterValue::Int(max_depth),
			"must be at least 1, or -1 for no limit",
		)
		.into()),
	}
}

fn max_features(hyperparameters: &Hyperparameters) -> Result<MaxFeatures> {
	let max_features = match hyperparameters.get("max_features") {
		None => return Ok(MaxFeatures::All),
		Some(max_features) => max_features,
	};
	let max_features = match max_features {
		HyperparameterValue::String(value) => match value.as_str() {
			"sqrt" => MaxFeatures::Sqrt,
			"log2" => MaxFeatures::Log2,
			"all" | "auto" => MaxFeatures::All,
			_ => {
				return Err(out_of_range(
					"max_features",
					max_features.clone(),
					"must be one of sqrt, log2, all, an integer or a fraction",
				)
				.into())
			}
		},
		HyperparameterValue::Int(_) => MaxFeatures::Count(hyperparameters.count("max_features", 1)?),
		HyperparameterValue::Float(_) => MaxFeatures::Fraction(hyperparameters.fraction("max_features")?),
		HyperparameterValue::Bool(_) => {
			return Err(wrong_type("max_features", "a string or a number", max_features).into())
		}
	};
	Ok(max_features)
}

fn forest_options(hyperparameters: &Hyperparameters, seed: u64) -> Result<ForestOptions> {
	let seed = if hyperparameters.contains("random_state") {
		hyperparameters.count("random_state", 0)?.to_u64().unwrap_or(seed)
	} else {
		seed
	};
	Ok(ForestOptions {
		n_trees: hyperparameters.count("n_estimators", 1)?,
		bootstrap: if hyperparameters.contains("bootstrap") {
			hyperparameters.bool("bootstrap")?
		} else {
			true
		},
		tree_options: TreeOptions {
			max_depth: optional_max_depth(hyperparameters)?,
			min_examples_split: if hyperparameters.contains("min_samples_split") {
				hyperparameters.count("min_samples_split", 2)?
			} else {
				2
			},
			min_examples_leaf: if hyperparameters.contains("min_samples_leaf") {
				hyperparameters.count("min_samples_leaf", 1)?
			} else {
				1
			},
			max_features: max_features(hyperparameters)?,
			..Default::default()
		},
		seed,
	})
}

fn booster_options(hyperparameters: &Hyperparameters, growth: BoosterGrowth, seed: u64) -> Result<BoosterOptions> {
	let optional_fraction = |name: &str| -> Result<f32> {
		if hyperparameters.contains(name) {
			Ok(hyperparameters.fraction(name)?)
		} else {
			Ok(1.0)
		}
	};
	let optional_non_negative = |name: &str| -> Result<f32> {
		if hyperparameters.contains(name) {
			Ok(hyperparameters.non_negative(name)?)
		} else {
			Ok(0.0)
		}
	};
	let max_depth = optional_max_depth(hyperparameters)?;
	let growth_strategy = match growth {
		BoosterGrowth::DepthWise => GrowthStrategy::DepthWise,
		BoosterGrowth::LeafWise => GrowthStrategy::LeafWise {
			max_leaf_nodes: if hyperparameters.contains("num_leaves") {
				hyperparameters.count("num_leaves", 2)?
			} else {
				31
			},
		},
	};
	let max_depth = match growth {
		BoosterGrowth::DepthWise => Some(max_depth.unwrap_or(6)),
		BoosterGrowth::LeafWise => max_depth,
	};
	Ok(BoosterOptions {
		n_rounds: hyperparameters.count("n_estimators", 1)?,
		learning_rate: hyperparameters.positive("learning_rate")?,
		subsample: optional_fraction("subsample")?,
		colsample_bytree: optional_fraction("colsample_bytree")?,
		tree_options: TreeOptions {
			growth_strategy,
			max_depth,
			l1_regularization: optional_non_negative("reg_alpha")?,
			l2_regularization: if hyperparameters.contains("reg_lambda") {
				hyperparameters.non_negative("reg_lambda")?
			} else {
				1.0
			},
			..Default::default()
		},
		seed,
	})
}

fn linear_options(hyperparameters: &Hyperparameters, n_examples: usize) -> Result<linear::TrainOptions> {
	let model_type = hyperparameters.string("model_type")?;
	let alpha = match model_type {
		"ridge" => hyperparameters.non_negative("alpha")?,
		"linear" => 0.0,
		_ => {
			return Err(out_of_range(
				"model_type",
				HyperparameterValue::String(model_type.to_owned()),
				"must be ridge or linear",
			)
			.into())
		}
	};
	let mut options = linear::TrainOptions {
		max_epochs: 1000,
		early_stopping_options: Some(linear::EarlyStoppingOptions {
			holdout_fraction: 0.1,
			patience: 5,
			min_improvement: 1e-6,
		}),
		..Default::default()
	};
	// The ridge penalty applies to the summed squared error, and the regressor's penalty to the mean.
	options.l2_regularization = alpha / n_examples.to_f32().unwrap_or(1.0).max(1.0);
	if hyperparameters.contains("learning_rate") {
		options.learning_rate = hyperparameters.positive("learning_rate")?;
	}
	if hyperparameters.contains("max_epochs") {
		options.max_epochs = hyperparameters.count("max_epochs", 1)?;
	}
	Ok(options)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::tune::Study;

	fn dataset() -> (Array2<f32>, Array1<f32>) {
		let features = Array2::from_shape_fn((240, 2), |(i, j)| {
			if j == 0 {
				(i % 24) as f32 / 12.0 - 1.0
			} else {
				((i * 7) % 13) as f32 / 6.5 - 1.0
			}
		});
		let labels = features
			.axis_iter(Axis(0))
			.map(|row| 0.5 + 0.3 * row[0] - 0.1 * row[1])
			.collect();
		(features, labels)
	}

	#[test]
	fn test_parse_model_name() {
		for name in ModelName::ALL.iter() {
			assert_eq!(name.as_str().parse::<ModelName>(), Ok(*name));
		}
		let error = "catboost".parse::<ModelName>().unwrap_err();
		assert_eq!(error.to_string(), "unknown model: catboost");
		assert!(Model::from_name("catboost", &Hyperparameters::new(), 42).is_err());
	}

	#[test]
	fn test_default_hyperparameters() {
		insta::assert_snapshot!(ModelName::RandomForest.default_hyperparameters().to_string(), @r###"bootstrap=true, max_depth=10, max_features="sqrt", min_samples_leaf=1, min_samples_split=2, n_estimators=300"###);
		insta::assert_snapshot!(ModelName::LightGBM.default_hyperparameters().to_string(), @r###"colsample_bytree=0.9, learning_rate=0.01, max_depth=-1, n_estimators=500, num_leaves=64, reg_alpha=0.05, reg_lambda=0.7, subsample=0.9"###);
	}

	#[test]
	fn test_every_model_fits_signal() {
		let (features, labels) = dataset();
		for name in ModelName::ALL.iter() {
			let mut config = ModelConfig::new(*name);
			match name {
				ModelName::RandomForest => config.hyperparameters.insert("n_estimators", 20),
				ModelName::XGBoost | ModelName::LightGBM => {
					config.hyperparameters.insert("n_estimators", 100);
					config.hyperparameters.insert("learning_rate", 0.3);
				}
				ModelName::LinearRegression => config.hyperparameters.insert("max_epochs", 500),
			}
			let model = Model::new(&config, 42);
			let fitted = model
				.train(features.view(), labels.view(), &Hyperparameters::new())
				.unwrap();
			let predictions = fitted.predict(features.view());
			let r2 = r2_score(labels.view(), predictions.view()).unwrap();
			assert!(r2 > 0.8, "{} scored {}", name, r2);
		}
	}

	#[test]
	fn test_invalid_hyperparameters() {
		let (features, labels) = dataset();
		let mut config = ModelConfig::new(ModelName::XGBoost);
		config.hyperparameters.insert("subsample", 0.0);
		let error = Model::new(&config, 42)
			.train(features.view(), labels.view(), &Hyperparameters::new())
			.unwrap_err();
		assert_eq!(
			error.to_string(),
			"hyperparameter subsample is 0, but it must be greater than 0 and at most 1"
		);
		let mut config = ModelConfig::new(ModelName::RandomForest);
		config.hyperparameters.insert("max_features", true);
		assert!(Model::new(&config, 42)
			.train(features.view(), labels.view(), &Hyperparameters::new())
			.is_err());
	}

	#[test]
	fn test_optimize_rejects_failed_trials() {
		let (features, labels) = dataset();
		let mut config = ModelConfig::new(ModelName::RandomForest);
		config.hyperparameters.insert("bootstrap", "sometimes");
		let model = Model::new(&config, 42);
		let mut study = Study::new(42);
		let result = study.optimize(3, |trial| {
			model.optimize(
				trial,
				features.view(),
				labels.view(),
				features.view(),
				labels.view(),
			)
		});
		assert!(result.is_err());
		assert!(study
			.trials()
			.iter()
			.all(|trial| matches!(trial.outcome, TrialOutcome::Rejected(_))));
	}

	#[test]
	fn test_optimize_scores_trials() {
		let (features, labels) = dataset();
		let (features_train, features_test) = features.view().split_at(Axis(0), 192);
		let (labels_train, labels_test) = labels.view().split_at(Axis(0), 192);
		let model = Model::new(&ModelConfig::new(ModelName::LightGBM), 42);
		let mut study = Study::new(42);
		let best = study
			.optimize(4, |trial| {
				model.optimize(trial, features_train, labels_train, features_test, labels_test)
			})
			.unwrap();
		assert!(best.contains("n_estimators"));
		assert!(best.contains("learning_rate"));
		assert!(best.contains("max_depth"));
	}
}
