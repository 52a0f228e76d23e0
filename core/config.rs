/*!
This module defines the `Config` struct, which is read from a yaml file to configure a training run with [`run`](../train/fn.run.html). Every field is optional. Command line flags override the file, and the file overrides the defaults.
*/

use crate::{hyperparameters::Hyperparameters, model::ModelName};
use hazard_dataframe::ColumnType;
use hazard_util::error::{Context, Result};
use std::{collections::BTreeMap, path::Path, path::PathBuf};

#[derive(Debug, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub dataset: Option<PathBuf>,
	pub target_column: Option<String>,
	pub drop_columns: Option<Vec<String>>,
	pub required_columns: Option<Vec<String>>,
	pub test_fraction: Option<f32>,
	pub seed: Option<u64>,
	pub n_trials: Option<usize>,
	pub models_dir: Option<PathBuf>,
	pub column_types: Option<BTreeMap<String, ColumnType>>,
	/// Hyperparameters for each model, merged over its defaults.
	pub models: Option<BTreeMap<ModelName, Hyperparameters>>,
}

impl Config {
	pub fn from_path(path: &Path) -> Result<Config> {
		let config = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config file {}", path.display()))?;
		Config::from_str(&config).with_context(|| format!("failed to parse config file {}", path.display()))
	}

	#[allow(clippy::should_implement_trait)]
	pub fn from_str(config: &str) -> Result<Config> {
		Ok(serde_yaml::from_str(config)?)
	}

	pub fn hyperparameters(&self, name: ModelName) -> Hyperparameters {
		self.models
			.as_ref()
			.and_then(|models| models.get(&name))
			.cloned()
			.unwrap_or_default()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::hyperparameters::HyperparameterValue;

	#[test]
	fn test_parse() {
		let config = Config::from_str(
			r#"
dataset: datasets/main_dataset_2.csv
target_column: landslide_occurred
drop_columns: [date, latitude, longitude]
test_fraction: 0.25
seed: 7
column_types:
  lithology: { type: enum, options: [basalt, granite] }
  slope: { type: number }
models:
  xgboost: { max_depth: 5, learning_rate: 0.05 }
"#,
		)
		.unwrap();
		assert_eq!(config.target_column.as_deref(), Some("landslide_occurred"));
		assert_eq!(config.test_fraction, Some(0.25));
		assert_eq!(config.seed, Some(7));
		assert_eq!(config.n_trials, None);
		let column_types = config.column_types.as_ref().unwrap();
		assert_eq!(
			column_types.get("lithology"),
			Some(&ColumnType::Enum {
				options: vec!["basalt".to_owned(), "granite".to_owned()]
			})
		);
		assert_eq!(column_types.get("slope"), Some(&ColumnType::Number));
		let xgboost = config.hyperparameters(ModelName::XGBoost);
		assert_eq!(xgboost.get("max_depth"), Some(&HyperparameterValue::Int(5)));
		assert!(config.hyperparameters(ModelName::RandomForest).is_empty());
	}

	#[test]
	fn test_empty_and_invalid() {
		assert_eq!(Config::from_str("{}").unwrap(), Config::default());
		assert!(Config::from_str("models:\n  catboost: {}\n").is_err());
		assert!(Config::from_str("target: y\n").is_err());
	}
}
