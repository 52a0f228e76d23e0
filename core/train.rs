use crate::{
	config::Config,
	hyperparameters::Hyperparameters,
	model::{Model, ModelConfig, ModelName, ParseModelNameError},
	persist::{save_model, timestamp_now, write_metrics, EvaluationMetrics, ModelArtifact},
	preprocess::{check_data, preprocess, Dataset, PreprocessOptions},
	tune::Study,
};
use hazard_dataframe::{DataFrame, FromCsvOptions};
use hazard_metrics::{mean_squared_error, r2_score, root_mean_squared_error};
use hazard_util::{
	err,
	error::{Context, Result},
	progress_counter::ProgressCounter,
};
use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

pub const DEFAULT_MODELS_DIR: &str = "ml-models";
pub const DEFAULT_N_TRIALS: usize = 100;
pub const DEFAULT_SEED: u64 = 42;

/// These are the options passed to `train_model`.
#[derive(Clone, Debug)]
pub struct TrainOptions {
	pub models_dir: PathBuf,
	/// The number of hyperparameter trials to run when fine tuning.
	pub n_trials: usize,
	pub seed: u64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
			n_trials: DEFAULT_N_TRIALS,
			seed: DEFAULT_SEED,
		}
	}
}

#[derive(Clone, Debug)]
pub struct TrainOutput {
	pub path: PathBuf,
	pub metrics: EvaluationMetrics,
}

/// Train one model on `dataset`, evaluate it on the test partition and save the artifact. If `config.fine_tuning` is set, a hyperparameter search runs first and the final model is trained with the best parameters it found.
pub fn train_model(dataset: &Dataset, config: &ModelConfig, options: &TrainOptions) -> Result<TrainOutput> {
	let model = Model::new(config, options.seed);
	check_data(dataset.features_train.view(), dataset.labels_train.view(), "train");
	check_data(dataset.features_test.view(), dataset.labels_test.view(), "test");
	let mut best_params = Hyperparameters::new();
	if config.fine_tuning {
		let mut study = Study::new(options.seed);
		let result = study.optimize(options.n_trials, |trial| {
			model.optimize(
				trial,
				dataset.features_train.view(),
				dataset.labels_train.view(),
				dataset.features_test.view(),
				dataset.labels_test.view(),
			)
		});
		match result {
			Ok(params) => {
				tracing::info!(model = %config.name, %params, "best parameters");
				best_params = params;
			}
			Err(error) => {
				tracing::warn!(model = %config.name, %error, "hyperparameter search failed, training with the configured hyperparameters")
			}
		}
	}
	let fitted = model
		.train(
			dataset.features_train.view(),
			dataset.labels_train.view(),
			&best_params,
		)
		.with_context(|| format!("failed to train {}", config.name))?;
	let predictions = fitted.predict(dataset.features_test.view());
	let labels = dataset.labels_test.view();
	let metrics = EvaluationMetrics {
		mse: mean_squared_error(labels, predictions.view())?,
		r2: r2_score(labels, predictions.view())?,
		rmse: root_mean_squared_error(labels, predictions.view())?,
	};
	let artifact = ModelArtifact {
		model_name: config.name,
		timestamp: timestamp_now(),
		feature_groups: dataset.feature_groups.clone(),
		feature_names: dataset.feature_names.clone(),
		target_column_name: dataset.target_column_name.clone(),
		model: fitted,
		hyperparameters: model.resolve_hyperparameters(&best_params),
		test_metrics: metrics,
	};
	let path = save_model(&artifact, &options.models_dir)?;
	Ok(TrainOutput { path, metrics })
}

/// Which models a run trains.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelSelection {
	One(ModelName),
	All,
}

impl ModelSelection {
	pub fn names(&self) -> Vec<ModelName> {
		match self {
			ModelSelection::One(name) => vec![*name],
			ModelSelection::All => ModelName::ALL.to_vec(),
		}
	}
}

impl std::str::FromStr for ModelSelection {
	type Err = ParseModelNameError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"all" => Ok(ModelSelection::All),
			s => Ok(ModelSelection::One(s.parse()?)),
		}
	}
}

/// These are the options passed to `run`. Each option that is `Some` overrides the configuration file.
#[derive(Clone, Debug)]
pub struct RunOptions {
	pub file: Option<PathBuf>,
	pub models: ModelSelection,
	pub fine_tuning: bool,
	/// The metrics of every trained model are merged into the json file at this path.
	pub output: Option<PathBuf>,
	pub config: Option<PathBuf>,
	pub models_dir: Option<PathBuf>,
	pub n_trials: Option<usize>,
	pub target: Option<String>,
}

impl Default for RunOptions {
	fn default() -> Self {
		Self {
			file: None,
			models: ModelSelection::One(ModelName::RandomForest),
			fine_tuning: false,
			output: None,
			config: None,
			models_dir: None,
			n_trials: None,
			target: None,
		}
	}
}

/**
Load a dataset, preprocess it once, and train the selected models.

When every model is selected, a model that fails to train is logged and skipped, and the run only fails if no model trained. When a single model is selected, its error is returned.
*/
pub fn run(options: &RunOptions) -> Result<BTreeMap<ModelName, EvaluationMetrics>> {
	let config = match &options.config {
		Some(path) => Config::from_path(path)?,
		None => Config::default(),
	};
	let file = options
		.file
		.as_ref()
		.or_else(|| config.dataset.as_ref())
		.ok_or_else(|| err!("no dataset was given"))?;
	let dataframe = load_dataframe(file, &config)?;
	let defaults = PreprocessOptions::default();
	let preprocess_options = PreprocessOptions {
		target_column_name: options
			.target
			.clone()
			.or_else(|| config.target_column.clone())
			.unwrap_or(defaults.target_column_name),
		drop_columns: config.drop_columns.clone().unwrap_or(defaults.drop_columns),
		required_columns: config
			.required_columns
			.clone()
			.unwrap_or(defaults.required_columns),
		test_fraction: config.test_fraction.unwrap_or(defaults.test_fraction),
		seed: config.seed.unwrap_or(defaults.seed),
	};
	let dataset = preprocess(dataframe, &preprocess_options)?;
	let train_options = TrainOptions {
		models_dir: options
			.models_dir
			.clone()
			.or_else(|| config.models_dir.clone())
			.unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR)),
		n_trials: options.n_trials.or(config.n_trials).unwrap_or(DEFAULT_N_TRIALS),
		seed: config.seed.unwrap_or(DEFAULT_SEED),
	};
	let mut metrics = BTreeMap::new();
	for name in options.models.names() {
		let model_config = ModelConfig {
			name,
			fine_tuning: options.fine_tuning,
			hyperparameters: config.hyperparameters(name),
		};
		match train_model(&dataset, &model_config, &train_options) {
			Ok(output) => {
				tracing::info!(
					model = %name,
					mse = output.metrics.mse,
					r2 = output.metrics.r2,
					rmse = output.metrics.rmse,
					"model evaluated",
				);
				metrics.insert(name, output.metrics);
			}
			Err(error) if options.models == ModelSelection::All => {
				tracing::error!(model = %name, error = %format!("{:#}", error), "error in train_model");
			}
			Err(error) => return Err(error),
		}
	}
	if metrics.is_empty() {
		return Err(err!("no model was trained successfully"));
	}
	if let Some(output) = &options.output {
		write_metrics(output, &metrics)?;
	}
	Ok(metrics)
}

fn load_dataframe(path: &Path, config: &Config) -> Result<DataFrame> {
	let len = std::fs::metadata(path)
		.with_context(|| format!("failed to read dataset {}", path.display()))?
		.len();
	let progress_counter = ProgressCounter::new(len);
	let dataframe = DataFrame::from_path(
		path,
		FromCsvOptions {
			column_types: config.column_types.clone(),
			..Default::default()
		},
		|byte| progress_counter.set(byte),
	)?;
	tracing::info!(
		path = %path.display(),
		bytes = progress_counter.total(),
		rows = dataframe.nrows(),
		columns = dataframe.ncols(),
		"loaded dataset",
	);
	Ok(dataframe)
}
