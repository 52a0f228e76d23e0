/*!
This module saves and loads model artifacts. An artifact file is a single version byte followed by the artifact serialized as MessagePack.
*/

use crate::{
	hyperparameters::Hyperparameters,
	model::{FittedModel, ModelName},
};
use hazard_dataframe::DataFrameView;
use hazard_features::{compute_features_array_f32, FeatureGroup};
use hazard_util::{
	err,
	error::{Context, Result},
};
use ndarray::prelude::*;
use std::{
	collections::BTreeMap,
	io::{Read, Write},
	path::{Path, PathBuf},
};

/// The version byte written at the start of every artifact file.
pub const FORMAT_VERSION: u8 = 0;

pub const MODEL_FILE_EXTENSION: &str = "pkl";

/// The metrics of a model evaluated on the test partition.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationMetrics {
	pub mse: f32,
	pub r2: f32,
	pub rmse: f32,
}

/// Everything needed to make predictions with a trained model: the fitted model and the feature groups that produce its input.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelArtifact {
	pub model_name: ModelName,
	/// The creation time, formatted as `%Y%m%d_%H%M%S`.
	pub timestamp: String,
	pub feature_groups: Vec<FeatureGroup>,
	pub feature_names: Vec<String>,
	pub target_column_name: String,
	pub model: FittedModel,
	pub hyperparameters: Hyperparameters,
	pub test_metrics: EvaluationMetrics,
}

impl ModelArtifact {
	/// Deserialize a `ModelArtifact` from a slice.
	pub fn from_slice(slice: &[u8]) -> Result<Self> {
		let (version, slice) = slice
			.split_first()
			.ok_or_else(|| err!("model artifact is empty"))?;
		check_version(*version)?;
		let artifact = rmp_serde::from_slice(slice)?;
		Ok(artifact)
	}

	/// Deserialize a `ModelArtifact` by reading the file at `path`.
	pub fn from_path(path: &Path) -> Result<Self> {
		read_versioned(path)
	}

	/// Write this artifact to the file at `path`.
	pub fn to_file(&self, path: &Path) -> Result<()> {
		write_versioned(path, self)
	}

	/// Compute the feature matrix for `dataframe` with this artifact's feature groups. Columns missing from `dataframe` produce zeros.
	pub fn compute_features(&self, dataframe: &DataFrameView) -> Result<Array2<f32>> {
		compute_features_array_f32(dataframe, &self.feature_groups)
	}

	pub fn predict(&self, dataframe: &DataFrameView) -> Result<Array1<f32>> {
		let features = self.compute_features(dataframe)?;
		Ok(self.model.predict(features.view()))
	}
}

fn check_version(version: u8) -> Result<()> {
	if version != FORMAT_VERSION {
		return Err(err!("unknown model format version {}", version));
	}
	Ok(())
}

pub(crate) fn read_versioned<T>(path: &Path) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	let file = std::fs::File::open(path)
		.with_context(|| format!("failed to open model file {}", path.display()))?;
	let mut reader = std::io::BufReader::new(file);
	let mut version = [0u8; 1];
	reader
		.read_exact(&mut version)
		.with_context(|| format!("failed to read model file {}", path.display()))?;
	check_version(version[0])?;
	let value = rmp_serde::from_read(&mut reader)
		.with_context(|| format!("failed to decode model file {}", path.display()))?;
	Ok(value)
}

pub(crate) fn write_versioned<T>(path: &Path, value: &T) -> Result<()>
where
	T: serde::Serialize,
{
	let file = std::fs::File::create(path)
		.with_context(|| format!("failed to create model file {}", path.display()))?;
	let mut writer = std::io::BufWriter::new(file);
	writer.write_all(&[FORMAT_VERSION])?;
	rmp_serde::encode::write_named(&mut writer, value)?;
	writer.flush()?;
	Ok(())
}

pub fn timestamp_now() -> String {
	chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Save `artifact` to `{dir}/{model_name}_{timestamp}.pkl`, creating `dir` if needed, and return the path.
pub fn save_model(artifact: &ModelArtifact, dir: &Path) -> Result<PathBuf> {
	std::fs::create_dir_all(dir)
		.with_context(|| format!("failed to create models directory {}", dir.display()))?;
	let path = dir.join(format!(
		"{}_{}.{}",
		artifact.model_name, artifact.timestamp, MODEL_FILE_EXTENSION
	));
	artifact.to_file(&path)?;
	tracing::info!(path = %path.display(), "model saved");
	Ok(path)
}

/// Merge `metrics` into the json object in the file at `path`, creating the file if it does not exist. Entries for other models are kept.
pub fn write_metrics(path: &Path, metrics: &BTreeMap<ModelName, EvaluationMetrics>) -> Result<()> {
	let mut merged: serde_json::Map<String, serde_json::Value> = match std::fs::read_to_string(path) {
		Ok(existing) => serde_json::from_str(&existing)
			.with_context(|| format!("failed to parse metrics file {}", path.display()))?,
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
		Err(error) => {
			return Err(error).with_context(|| format!("failed to read metrics file {}", path.display()))
		}
	};
	for (model_name, metrics) in metrics.iter() {
		merged.insert(model_name.to_string(), serde_json::to_value(metrics)?);
	}
	if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)?;
	}
	let json = serde_json::to_string_pretty(&merged)?;
	std::fs::write(path, json).with_context(|| format!("failed to write metrics file {}", path.display()))?;
	tracing::info!(path = %path.display(), "metrics written");
	Ok(())
}

/// The file stems of every artifact in `dir`, sorted. A directory that does not exist has no artifacts.
pub fn list_models(dir: &Path) -> Result<Vec<String>> {
	let entries = match std::fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(error) => {
			return Err(error).with_context(|| format!("failed to read models directory {}", dir.display()))
		}
	};
	let mut names = Vec::new();
	for entry in entries {
		let path = entry?.path();
		if path.extension().and_then(|extension| extension.to_str()) != Some(MODEL_FILE_EXTENSION) {
			continue;
		}
		if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
			names.push(stem.to_owned());
		}
	}
	names.sort();
	Ok(names)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::model::{Model, ModelConfig};
	use hazard_features::NormalizedFeatureGroup;

	fn artifact() -> ModelArtifact {
		let features = Array2::from_shape_fn((50, 1), |(i, _)| i as f32);
		let labels = features.column(0).mapv(|x| x * 0.5);
		let mut config = ModelConfig::new(ModelName::RandomForest);
		config.hyperparameters.insert("n_estimators", 5);
		let model = Model::new(&config, 42)
			.train(features.view(), labels.view(), &Hyperparameters::new())
			.unwrap();
		ModelArtifact {
			model_name: ModelName::RandomForest,
			timestamp: "20240101_120000".to_owned(),
			feature_groups: vec![FeatureGroup::Normalized(NormalizedFeatureGroup {
				source_column_name: "slope".to_owned(),
				mean: 0.0,
				variance: 1.0,
			})],
			feature_names: vec!["slope".to_owned()],
			target_column_name: "landslide_occurred".to_owned(),
			model,
			hyperparameters: config.hyperparameters,
			test_metrics: EvaluationMetrics {
				mse: 0.1,
				r2: 0.9,
				rmse: 0.1f32.sqrt(),
			},
		}
	}

	#[test]
	fn test_save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let artifact = artifact();
		let path = save_model(&artifact, &dir.path().join("ml-models")).unwrap();
		assert_eq!(
			path.file_name().unwrap().to_str().unwrap(),
			"randomforest_20240101_120000.pkl"
		);
		let loaded = ModelArtifact::from_path(&path).unwrap();
		assert_eq!(loaded, artifact);
		let features = Array2::from_shape_fn((10, 1), |(i, _)| i as f32 * 3.0);
		assert_eq!(
			loaded.model.predict(features.view()),
			artifact.model.predict(features.view())
		);
		let bytes = std::fs::read(&path).unwrap();
		assert_eq!(ModelArtifact::from_slice(&bytes).unwrap(), artifact);
		assert_eq!(
			list_models(&dir.path().join("ml-models")).unwrap(),
			vec!["randomforest_20240101_120000".to_owned()]
		);
	}

	#[test]
	fn test_unknown_version() {
		let mut bytes = vec![7u8];
		bytes.extend(rmp_serde::to_vec_named(&artifact()).unwrap());
		assert_eq!(
			ModelArtifact::from_slice(&bytes).unwrap_err().to_string(),
			"unknown model format version 7"
		);
		assert!(ModelArtifact::from_slice(&[]).is_err());
	}

	#[test]
	fn test_write_metrics_merges() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("metrics.json");
		std::fs::write(&path, r#"{"xgboost": {"mse": 1.0, "r2": 0.5, "rmse": 1.0}, "notes": "kept"}"#).unwrap();
		let mut metrics = BTreeMap::new();
		metrics.insert(
			ModelName::RandomForest,
			EvaluationMetrics {
				mse: 0.25,
				r2: 0.75,
				rmse: 0.5,
			},
		);
		write_metrics(&path, &metrics).unwrap();
		let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
		insta::assert_snapshot!(serde_json::to_string(&written).unwrap(), @r###"{"notes":"kept","randomforest":{"mse":0.25,"r2":0.75,"rmse":0.5},"xgboost":{"mse":1.0,"r2":0.5,"rmse":1.0}}"###);
	}

	#[test]
	fn test_list_models_missing_dir() {
		let dir = tempfile::tempdir().unwrap();
		assert!(list_models(&dir.path().join("missing")).unwrap().is_empty());
	}

	#[test]
	fn test_list_models_only_lists_pickles() {
		let dir = tempfile::tempdir().unwrap();
		for name in ["xgboost_20240101_120000.pkl", "randomforest_20240102_080000.pkl", "notes.txt", "old.model"] {
			std::fs::write(dir.path().join(name), "").unwrap();
		}
		assert_eq!(
			list_models(dir.path()).unwrap(),
			vec!["randomforest_20240102_080000", "xgboost_20240101_120000"]
		);
	}
}
