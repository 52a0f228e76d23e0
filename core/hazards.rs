/*!
This module trains the three models served by the hazard prediction server. Each is a random forest with 100 trees and a fixed seed, trained on 80% of its dataset:

- earthquake: predicts the magnitude from `latitude`, `longitude` and `depth`.
- flood: predicts the flood risk score from `latitude`, `longitude`, `rainfall_mm`, `elevation_m` and `river_discharge_m3_s`.
- forestfire: classifies each state as Low, Medium or High risk by its average number of fire occurrences per season.

Column names are trimmed and lowercased when the dataset is loaded, so headers like `Rainfall_mm` and ` State/UT` match.
*/

use crate::persist::{read_versioned, write_versioned};
use hazard_dataframe::{Column, ColumnView, DataFrame, DataFrameView, EnumColumn, FromCsvOptions};
use hazard_features::{
	compute_feature_names, compute_features_array_f32, FeatureGroup, IdentityFeatureGroup,
	OneHotEncodedFeatureGroup,
};
use hazard_metrics::{mean_squared_error, Accuracy, StreamingMetric};
use hazard_tree::{Forest, ForestOptions, MaxFeatures, TreeOptions};
use hazard_util::{
	err,
	error::{Context, Result},
	zip,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::{
	collections::BTreeMap,
	num::NonZeroUsize,
	path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_HAZARD_MODELS_DIR: &str = "hazard-models";

const SEED: u64 = 42;
const N_TREES: usize = 100;
const TEST_FRACTION: f32 = 0.2;

pub const FOREST_FIRE_SEASON_COLUMNS: &[&str] = &[
	"january 2018 to june 2018",
	"november 2018 to june 2019",
	"november 2019 to june 2020",
	"november 2020 to june 2021",
	"november 2021 to june 2022",
	"november 2022 to june 2023",
];
const FOREST_FIRE_STATE_COLUMNS: &[&str] = &["state/ut", "state"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Hazard {
	#[serde(rename = "earthquake")]
	Earthquake,
	#[serde(rename = "flood")]
	Flood,
	#[serde(rename = "forestfire")]
	ForestFire,
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid model_type \"{0}\", it must be \"earthquake\", \"flood\" or \"forestfire\"")]
pub struct ParseHazardError(pub String);

impl Hazard {
	pub const ALL: [Hazard; 3] = [Hazard::Earthquake, Hazard::Flood, Hazard::ForestFire];

	pub fn as_str(&self) -> &'static str {
		match self {
			Hazard::Earthquake => "earthquake",
			Hazard::Flood => "flood",
			Hazard::ForestFire => "forestfire",
		}
	}

	/// The fields a prediction request for this hazard must contain. They are also the names of the model's input columns.
	pub fn required_fields(&self) -> &'static [&'static str] {
		match self {
			Hazard::Earthquake => &["latitude", "longitude", "depth"],
			Hazard::Flood => &[
				"latitude",
				"longitude",
				"rainfall_mm",
				"elevation_m",
				"river_discharge_m3_s",
			],
			Hazard::ForestFire => &["state"],
		}
	}

	pub fn target_column(&self) -> &'static str {
		match self {
			Hazard::Earthquake => "magnitude",
			Hazard::Flood => "flood_occurred",
			Hazard::ForestFire => "risk_level",
		}
	}

	/// The name of this hazard's model file in the hazard models directory.
	pub fn file_name(&self) -> String {
		format!("{}_model.{}", self.as_str(), crate::persist::MODEL_FILE_EXTENSION)
	}
}

impl std::fmt::Display for Hazard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl std::str::FromStr for Hazard {
	type Err = ParseHazardError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Hazard::ALL
			.iter()
			.find(|hazard| hazard.as_str() == s)
			.copied()
			.ok_or_else(|| ParseHazardError(s.to_owned()))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RiskLevel {
	Low,
	Medium,
	High,
}

impl RiskLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			RiskLevel::Low => "Low",
			RiskLevel::Medium => "Medium",
			RiskLevel::High => "High",
		}
	}
}

impl std::fmt::Display for RiskLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

pub fn earthquake_risk(magnitude: f32) -> RiskLevel {
	if magnitude < 3.8 {
		RiskLevel::Low
	} else if magnitude < 4.3 {
		RiskLevel::Medium
	} else {
		RiskLevel::High
	}
}

pub fn flood_risk(score: f32) -> RiskLevel {
	if score < 0.5 {
		RiskLevel::Low
	} else if score < 0.65 {
		RiskLevel::Medium
	} else {
		RiskLevel::High
	}
}

/// The forest fire risk class of a state with this many average occurrences: 0 is Low, 1 is Medium and 2 is High.
pub fn forest_fire_class(total_occurrences: f32) -> usize {
	if total_occurrences <= 5000.0 {
		0
	} else if total_occurrences <= 12000.0 {
		1
	} else {
		2
	}
}

/// A trained hazard model and the feature groups that produce its input.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HazardArtifact {
	pub hazard: Hazard,
	pub feature_groups: Vec<FeatureGroup>,
	pub feature_names: Vec<String>,
	pub model: Forest,
	/// The label of each class, for classifiers.
	pub class_labels: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HazardPrediction {
	Magnitude { value: f32, risk_level: RiskLevel },
	FloodRisk { value: f32, risk_level: RiskLevel },
	RiskLevel(String),
}

impl HazardArtifact {
	pub fn from_path(path: &Path) -> Result<Self> {
		read_versioned(path)
	}

	pub fn to_file(&self, path: &Path) -> Result<()> {
		write_versioned(path, self)
	}

	/// Predict the first row of `dataframe`.
	pub fn predict(&self, dataframe: &DataFrameView) -> Result<HazardPrediction> {
		if dataframe.nrows() == 0 {
			return Err(err!("cannot predict an empty dataframe"));
		}
		let features = compute_features_array_f32(dataframe, &self.feature_groups)?;
		let features = features.slice(s![0..1, ..]);
		let prediction = match self.hazard {
			Hazard::Earthquake => {
				let value = self.model.predict(features)[0];
				HazardPrediction::Magnitude {
					value,
					risk_level: earthquake_risk(value),
				}
			}
			Hazard::Flood => {
				let value = self.model.predict(features)[0];
				HazardPrediction::FloodRisk {
					value,
					risk_level: flood_risk(value),
				}
			}
			Hazard::ForestFire => {
				let class = self.model.predict_classes(features)[0];
				let label = self
					.class_labels
					.as_ref()
					.and_then(|labels| labels.get(class))
					.cloned()
					.ok_or_else(|| err!("the forest fire model has no label for class {}", class))?;
				HazardPrediction::RiskLevel(label)
			}
		};
		Ok(prediction)
	}
}

#[derive(Clone, Debug)]
pub struct HazardTrainOutput {
	pub path: PathBuf,
	/// The mean squared error on the test partition, for regressors.
	pub test_mse: Option<f32>,
	/// The accuracy on the test partition, for classifiers.
	pub test_accuracy: Option<f32>,
}

/// Train the model for `hazard` on the csv file at `file` and save it to `{models_dir}/{hazard}_model.pkl`.
pub fn train_hazard(hazard: Hazard, file: &Path, models_dir: &Path) -> Result<HazardTrainOutput> {
	let mut dataframe = DataFrame::from_path(file, FromCsvOptions::default(), |_| {})?;
	dataframe.normalize_column_names();
	tracing::info!(%hazard, rows = dataframe.nrows(), "loaded hazard dataset");
	let (artifact, test_mse, test_accuracy) = match hazard {
		Hazard::Earthquake | Hazard::Flood => {
			let (artifact, mse) = train_regressor(hazard, dataframe)?;
			(artifact, Some(mse), None)
		}
		Hazard::ForestFire => {
			let (artifact, accuracy) = train_forest_fire(dataframe)?;
			(artifact, None, Some(accuracy))
		}
	};
	std::fs::create_dir_all(models_dir)
		.with_context(|| format!("failed to create models directory {}", models_dir.display()))?;
	let path = models_dir.join(hazard.file_name());
	artifact.to_file(&path)?;
	tracing::info!(%hazard, path = %path.display(), "hazard model saved");
	Ok(HazardTrainOutput {
		path,
		test_mse,
		test_accuracy,
	})
}

fn forest_options(max_features: MaxFeatures) -> ForestOptions {
	ForestOptions {
		n_trees: N_TREES,
		bootstrap: true,
		tree_options: TreeOptions {
			max_features,
			..Default::default()
		},
		seed: SEED,
	}
}

fn n_train(n_rows: usize) -> Result<usize> {
	let n_test = (TEST_FRACTION * n_rows.to_f32().unwrap_or(0.0))
		.ceil()
		.to_usize()
		.unwrap_or(0);
	if n_test == 0 || n_test >= n_rows {
		return Err(err!(
			"{} rows are not enough to split into train and test partitions",
			n_rows
		));
	}
	Ok(n_rows - n_test)
}

fn train_regressor(hazard: Hazard, mut dataframe: DataFrame) -> Result<(HazardArtifact, f32)> {
	let target_column_name = hazard.target_column();
	let missing: Vec<&str> = hazard
		.required_fields()
		.iter()
		.chain(std::iter::once(&target_column_name))
		.copied()
		.filter(|name| dataframe.column_index(name).is_none())
		.collect();
	if !missing.is_empty() {
		return Err(err!(
			"the {} dataset is missing columns: {}",
			hazard,
			missing.join(", ")
		));
	}
	dataframe.shuffle_rows(SEED);
	let view = dataframe.view();
	for name in hazard.required_fields().iter().chain(std::iter::once(&target_column_name)) {
		if view.column(name).and_then(|column| column.as_number()).is_none() {
			return Err(err!("column \"{}\" must be a number column", name));
		}
	}
	let feature_groups: Vec<FeatureGroup> = hazard
		.required_fields()
		.iter()
		.map(|name| {
			FeatureGroup::Identity(IdentityFeatureGroup {
				source_column_name: (*name).to_owned(),
			})
		})
		.collect();
	let features = compute_features_array_f32(&view, &feature_groups)?;
	let labels = view
		.column(target_column_name)
		.and_then(|column| column.as_number())
		.ok_or_else(|| err!("column \"{}\" must be a number column", target_column_name))?
		.data;
	let keep: Vec<usize> = (0..labels.len()).filter(|index| labels[*index].is_finite()).collect();
	let features = features.select(Axis(0), &keep);
	let labels: Array1<f32> = keep.iter().map(|index| labels[*index]).collect();
	let n_train = n_train(labels.len())?;
	let (features_train, features_test) = features.view().split_at(Axis(0), n_train);
	let (labels_train, labels_test) = labels.view().split_at(Axis(0), n_train);
	let model = Forest::train_regressor(features_train, labels_train, &forest_options(MaxFeatures::All))?;
	let predictions = model.predict(features_test);
	let mse = mean_squared_error(labels_test, predictions.view())?;
	tracing::info!(%hazard, mse, "hazard model evaluated");
	let artifact = HazardArtifact {
		hazard,
		feature_names: compute_feature_names(&feature_groups),
		feature_groups,
		model,
		class_labels: None,
	};
	Ok((artifact, mse))
}

/// The average total occurrences over every season for each state, in order of state name.
pub fn state_totals(dataframe: &DataFrameView) -> Result<Vec<(String, f32)>> {
	let state_column = FOREST_FIRE_STATE_COLUMNS
		.iter()
		.find_map(|name| dataframe.column(name))
		.ok_or_else(|| err!("the forestfire dataset is missing the column: state/ut"))?;
	let seasons = FOREST_FIRE_SEASON_COLUMNS
		.iter()
		.map(|name| {
			dataframe
				.column(name)
				.ok_or_else(|| err!("the forestfire dataset is missing the column: {}", name))?
				.as_number()
				.ok_or_else(|| err!("column \"{}\" must be a number column", name))
		})
		.collect::<Result<Vec<_>>>()?;
	let mut totals: BTreeMap<String, (f32, usize)> = BTreeMap::new();
	for row in 0..dataframe.nrows() {
		let state = match state_column {
			ColumnView::Enum(column) => column.option_at(row),
			ColumnView::Text(column) => Some(column.data[row].as_str()),
			_ => None,
		};
		let state = match state {
			Some(state) => state,
			None => continue,
		};
		// Missing values count as zero occurrences.
		let total: f32 = seasons
			.iter()
			.map(|season| season.data[row])
			.filter(|value| value.is_finite())
			.sum();
		let entry = totals.entry(state.to_owned()).or_insert((0.0, 0));
		entry.0 += total;
		entry.1 += 1;
	}
	Ok(totals
		.into_iter()
		.map(|(state, (sum, count))| (state, sum / count.to_f32().unwrap_or(1.0)))
		.collect())
}

fn train_forest_fire(dataframe: DataFrame) -> Result<(HazardArtifact, f32)> {
	let mut totals = state_totals(&dataframe.view())?;
	if totals.is_empty() {
		return Err(err!("the forestfire dataset has no states"));
	}
	let states: Vec<String> = totals.iter().map(|(state, _)| state.clone()).collect();
	let mut rng = Xoshiro256Plus::seed_from_u64(SEED);
	totals.shuffle(&mut rng);
	let state_column = EnumColumn {
		name: "state".to_owned(),
		options: states.clone(),
		data: totals
			.iter()
			.map(|(state, _)| {
				states
					.iter()
					.position(|option| option == state)
					.and_then(|index| NonZeroUsize::new(index + 1))
			})
			.collect(),
	};
	let states_dataframe = DataFrame {
		columns: vec![Column::Enum(state_column)],
	};
	let labels: Vec<usize> = totals.iter().map(|(_, total)| forest_fire_class(*total)).collect();
	let feature_groups = vec![FeatureGroup::OneHotEncoded(OneHotEncodedFeatureGroup {
		source_column_name: "state".to_owned(),
		options: states,
	})];
	let features = compute_features_array_f32(&states_dataframe.view(), &feature_groups)?;
	let n_train = n_train(labels.len())?;
	let (features_train, features_test) = features.view().split_at(Axis(0), n_train);
	let (labels_train, labels_test) = labels.split_at(n_train);
	let model = Forest::train_classifier(features_train, labels_train, 3, &forest_options(MaxFeatures::Sqrt))?;
	let mut accuracy = Accuracy::default();
	for (prediction, label) in zip!(model.predict_classes(features_test), labels_test.iter()) {
		accuracy.update((prediction, *label));
	}
	let accuracy = accuracy.finalize().unwrap_or(0.0);
	tracing::info!(hazard = %Hazard::ForestFire, accuracy, "hazard model evaluated");
	let artifact = HazardArtifact {
		hazard: Hazard::ForestFire,
		feature_names: compute_feature_names(&feature_groups),
		feature_groups,
		model,
		class_labels: Some(
			[RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
				.iter()
				.map(|level| level.to_string())
				.collect(),
		),
	};
	Ok((artifact, accuracy))
}

#[cfg(test)]
mod test {
	use super::*;
	use hazard_dataframe::{NumberColumn, TextColumn};
	use std::fmt::Write;

	#[test]
	fn test_risk_levels() {
		assert_eq!(earthquake_risk(3.79), RiskLevel::Low);
		assert_eq!(earthquake_risk(3.8), RiskLevel::Medium);
		assert_eq!(earthquake_risk(4.29), RiskLevel::Medium);
		assert_eq!(earthquake_risk(4.3), RiskLevel::High);
		assert_eq!(flood_risk(0.49), RiskLevel::Low);
		assert_eq!(flood_risk(0.5), RiskLevel::Medium);
		assert_eq!(flood_risk(0.65), RiskLevel::High);
		assert_eq!(forest_fire_class(5000.0), 0);
		assert_eq!(forest_fire_class(5000.5), 1);
		assert_eq!(forest_fire_class(12000.0), 1);
		assert_eq!(forest_fire_class(12001.0), 2);
	}

	#[test]
	fn test_parse_hazard() {
		assert_eq!("forestfire".parse::<Hazard>(), Ok(Hazard::ForestFire));
		assert_eq!(
			"tsunami".parse::<Hazard>().unwrap_err().to_string(),
			"invalid model_type \"tsunami\", it must be \"earthquake\", \"flood\" or \"forestfire\""
		);
		assert_eq!(Hazard::Flood.file_name(), "flood_model.pkl");
	}

	#[test]
	fn test_train_earthquake() {
		let dir = tempfile::tempdir().unwrap();
		let mut csv = String::from("Latitude,Longitude,Depth,Magnitude\n");
		for i in 0..50 {
			let depth = (i * 3 % 40) as f32;
			writeln!(csv, "{},{},{},{}", 20.0 + i as f32 * 0.1, 78.0, depth, 3.0 + depth / 20.0).unwrap();
		}
		let file = dir.path().join("earthquake.csv");
		std::fs::write(&file, csv).unwrap();
		let output = train_hazard(Hazard::Earthquake, &file, &dir.path().join("hazard-models")).unwrap();
		assert_eq!(output.path.file_name().unwrap(), "earthquake_model.pkl");
		assert!(output.test_mse.unwrap() < 0.1);
		let artifact = HazardArtifact::from_path(&output.path).unwrap();
		assert_eq!(artifact.feature_names, vec!["latitude", "longitude", "depth"]);
		let dataframe = DataFrame {
			columns: ["latitude", "longitude", "depth"]
				.iter()
				.zip([22.0, 78.0, 39.0].iter())
				.map(|(name, value)| {
					Column::Number(NumberColumn {
						name: (*name).to_owned(),
						data: vec![*value],
					})
				})
				.collect(),
		};
		match artifact.predict(&dataframe.view()).unwrap() {
			HazardPrediction::Magnitude { value, risk_level } => {
				assert!(value > 4.3, "magnitude was {}", value);
				assert_eq!(risk_level, RiskLevel::High);
			}
			prediction => panic!("unexpected prediction {:?}", prediction),
		}
	}

	#[test]
	fn test_train_regressor_missing_columns() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("flood.csv");
		std::fs::write(&file, "Latitude,Longitude,Flood_Occurred\n1,2,0\n").unwrap();
		let error = train_hazard(Hazard::Flood, &file, dir.path()).unwrap_err();
		assert_eq!(
			error.to_string(),
			"the flood dataset is missing columns: rainfall_mm, elevation_m, river_discharge_m3_s"
		);
	}

	#[test]
	fn test_state_totals() {
		let mut csv = String::from(" State/UT ");
		for season in FOREST_FIRE_SEASON_COLUMNS {
			write!(csv, ",{}", season).unwrap();
		}
		csv.push('\n');
		csv.push_str("Kerala,100,200,300,400,500,600\n");
		csv.push_str("Kerala,100,200,300,400,500,\n");
		csv.push_str("Assam,3000,3000,3000,3000,3000,3000\n");
		let mut dataframe = DataFrame::from_csv(
			&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
			FromCsvOptions::default(),
			|_| {},
		)
		.unwrap();
		dataframe.normalize_column_names();
		let totals = state_totals(&dataframe.view()).unwrap();
		assert_eq!(
			totals,
			vec![("Assam".to_owned(), 18000.0), ("Kerala".to_owned(), 1800.0)]
		);
		assert_eq!(forest_fire_class(totals[0].1), 2);
	}

	#[test]
	fn test_train_forest_fire() {
		let dir = tempfile::tempdir().unwrap();
		let mut csv = String::from("State/UT");
		for season in FOREST_FIRE_SEASON_COLUMNS {
			write!(csv, ",{}", season).unwrap();
		}
		csv.push('\n');
		for i in 0..20 {
			let occurrences = i * 200;
			write!(csv, "State {}", i).unwrap();
			for _ in FOREST_FIRE_SEASON_COLUMNS {
				write!(csv, ",{}", occurrences).unwrap();
			}
			csv.push('\n');
		}
		let file = dir.path().join("forestfire.csv");
		std::fs::write(&file, csv).unwrap();
		let output = train_hazard(Hazard::ForestFire, &file, dir.path()).unwrap();
		assert!(output.test_accuracy.is_some());
		let artifact = HazardArtifact::from_path(&output.path).unwrap();
		assert_eq!(artifact.feature_names.len(), 20);
		let dataframe = DataFrame {
			columns: vec![Column::Text(TextColumn {
				name: "state".to_owned(),
				data: vec!["State 3".to_owned()],
			})],
		};
		match artifact.predict(&dataframe.view()).unwrap() {
			HazardPrediction::RiskLevel(level) => assert!(["Low", "Medium", "High"].contains(&level.as_str())),
			prediction => panic!("unexpected prediction {:?}", prediction),
		}
	}
}
