/*!
The landslide prediction server. It serves the artifacts written by `hazard train` from a models directory:

| route                  | response                                        |
|------------------------|-------------------------------------------------|
| `GET /api/v1/models`   | the names of every model in the directory       |
| `POST /api/v1/predict` | `{prediction, prediction_variability}`          |
| `GET /health`          | `{status: "healthy"}`                           |
| `GET /model-health`    | `{loaded_models, available_models}`             |

Errors are returned as `{detail}`, where `detail` is a message or, for a body that fails validation, a list of `{loc, msg}`.
*/

use crate::{
	cache::{CacheError, ModelCache},
	error::{RequestError, ValidationIssue},
	json_response, preflight, with_cors,
};
use hazard_core::persist::{list_models, ModelArtifact};
use hazard_dataframe::{Column, DataFrame, NumberColumn, TextColumn};
use hazard_features::FeatureGroup;
use hazard_util::{
	err,
	error::{Error, Result},
};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};

pub const LITHOLOGY: &[&str] = &["basalt", "granite", "limestone", "sandstone", "shale"];
pub const LAND_USE: &[&str] = &["agriculture", "barren", "forest", "grassland", "urban"];
pub const HUMAN_ACTIVITY: &[&str] = &["high", "low", "medium"];

const CATEGORY_FIELDS: &[(&str, &[&str])] = &[
	("lithology", LITHOLOGY),
	("land_use", LAND_USE),
	("human_activity", HUMAN_ACTIVITY),
];

struct NumberField {
	name: &'static str,
	min: Option<f64>,
	max: Option<f64>,
	integer: bool,
}

const fn number(name: &'static str, min: Option<f64>, max: Option<f64>) -> NumberField {
	NumberField {
		name,
		min,
		max,
		integer: false,
	}
}

const NUMBER_FIELDS: &[NumberField] = &[
	number("elevation", Some(0.0), Some(10000.0)),
	number("slope", Some(0.0), Some(90.0)),
	number("aspect", Some(0.0), Some(360.0)),
	number("rainfall_daily", Some(0.0), None),
	number("rainfall_monthly", Some(0.0), None),
	number("distance_to_faults", Some(0.0), None),
	number("soil_depth", Some(0.0), None),
	number("vegetation_density", Some(0.0), Some(1.0)),
	number("earthquake_magnitude", Some(0.0), None),
	number("soil_moisture", Some(0.0), Some(100.0)),
	NumberField {
		name: "previous_landslides",
		min: Some(0.0),
		max: None,
		integer: true,
	},
	number("snow_melt", Some(0.0), None),
	number("landslide_probability", Some(0.0), Some(1.0)),
];

pub struct Context {
	pub cache: ModelCache<ModelArtifact>,
}

impl Context {
	pub fn new(models_dir: PathBuf) -> Self {
		Self {
			cache: ModelCache::new(models_dir, ModelArtifact::from_path),
		}
	}
}

pub async fn handle(context: Arc<Context>, request: Request<Body>) -> Response<Body> {
	let method = request.method().clone();
	let path = request.uri().path().to_owned();
	let path_components: Vec<&str> = path.split('/').skip(1).collect();
	let result = match (&method, path_components.as_slice()) {
		(&Method::OPTIONS, _) => Ok(preflight()),
		(&Method::GET, &["health"]) => Ok(json_response(StatusCode::OK, json!({ "status": "healthy" }))),
		(&Method::GET, &["model-health"]) => model_health(&context),
		(&Method::GET, &["api", "v1", "models"]) => models(&context),
		(&Method::POST, &["api", "v1", "predict"]) => predict(&context, request).await,
		_ => Err(RequestError::NotFound("Not Found".to_owned()).into()),
	};
	with_cors(result.unwrap_or_else(error_response))
}

fn error_response(error: Error) -> Response<Body> {
	if let Some(error) = error.downcast_ref::<RequestError>() {
		return match error {
			RequestError::BadRequest(message) => {
				json_response(StatusCode::BAD_REQUEST, json!({ "detail": message }))
			}
			RequestError::Validation(issues) => {
				json_response(StatusCode::UNPROCESSABLE_ENTITY, json!({ "detail": issues }))
			}
			RequestError::NotFound(message) => {
				json_response(StatusCode::NOT_FOUND, json!({ "detail": message }))
			}
		};
	}
	if let Some(CacheError::NotFound { name }) = error.downcast_ref::<CacheError>() {
		return json_response(
			StatusCode::NOT_FOUND,
			json!({ "detail": format!("model {} not found", name) }),
		);
	}
	tracing::error!(error = %format!("{:#}", error), "prediction failed");
	json_response(
		StatusCode::INTERNAL_SERVER_ERROR,
		json!({ "detail": "Internal server error" }),
	)
}

fn models(context: &Context) -> Result<Response<Body>> {
	let models = list_models(context.cache.dir())?;
	Ok(json_response(StatusCode::OK, json!(models)))
}

fn model_health(context: &Context) -> Result<Response<Body>> {
	let available_models = list_models(context.cache.dir())?;
	Ok(json_response(
		StatusCode::OK,
		json!({
			"loaded_models": context.cache.loaded(),
			"available_models": available_models,
		}),
	))
}

async fn predict(context: &Context, request: Request<Body>) -> Result<Response<Body>> {
	let bytes = hyper::body::to_bytes(request.into_body())
		.await
		.map_err(|_| RequestError::BadRequest("failed to read the request body".to_owned()))?;
	let input = PredictionInput::parse(&bytes)?;
	let artifact = context.cache.get(&input.model_name).await?;
	input.check_categories()?;
	let (prediction, prediction_variability) =
		tokio::task::spawn_blocking(move || predict_one(&artifact, &input)).await??;
	Ok(json_response(
		StatusCode::OK,
		json!({
			"prediction": prediction,
			"prediction_variability": prediction_variability,
		}),
	))
}

/// The prediction clipped to [0, 1], and its variability clamped to [0, 0.5]. The variability is the spread of the trees' predictions for a random forest, and the held out rmse for every other model.
fn predict_one(artifact: &ModelArtifact, input: &PredictionInput) -> Result<(f32, f32)> {
	for (name, value) in input.categories.iter() {
		if !category_options(artifact, name).iter().any(|option| option == value) {
			tracing::warn!(field = *name, value = value.as_str(), "unknown category, encoding as zeros");
		}
	}
	let dataframe = input.dataframe();
	let features = artifact.compute_features(&dataframe.view())?;
	tracing::debug!(features = ?artifact.feature_names, "computed features");
	let prediction = artifact
		.model
		.predict(features.view())
		.get(0)
		.copied()
		.ok_or_else(|| err!("the model returned no prediction"))?;
	let variability = artifact
		.model
		.predict_spread(features.view())
		.and_then(|spread| spread.get(0).copied())
		.unwrap_or(artifact.test_metrics.rmse);
	Ok((prediction.clamp(0.0, 1.0), variability.clamp(0.0, 0.5)))
}

/// The categories of `field` that the model was trained with. An artifact that does not encode `field` falls back to the default list.
fn category_options(artifact: &ModelArtifact, field: &str) -> Vec<String> {
	let trained = artifact.feature_groups.iter().find_map(|group| match group {
		FeatureGroup::OneHotEncoded(group) if group.source_column_name == field => Some(group.options.clone()),
		_ => None,
	});
	trained.unwrap_or_else(|| {
		CATEGORY_FIELDS
			.iter()
			.find(|(name, _)| *name == field)
			.map(|(_, options)| options.iter().map(|option| (*option).to_owned()).collect())
			.unwrap_or_default()
	})
}

#[derive(Debug, PartialEq)]
struct PredictionInput {
	model_name: String,
	numbers: Vec<(&'static str, f32)>,
	categories: Vec<(&'static str, String)>,
}

impl PredictionInput {
	/// Parse a request body, collecting a `ValidationIssue` for every missing, mistyped or out of range field.
	fn parse(bytes: &[u8]) -> Result<Self, RequestError> {
		let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|error| {
			RequestError::Validation(vec![ValidationIssue {
				loc: vec!["body".to_owned()],
				msg: error.to_string(),
			}])
		})?;
		let object = value.as_object().ok_or_else(|| {
			RequestError::Validation(vec![ValidationIssue {
				loc: vec!["body".to_owned()],
				msg: "value is not a valid dict".to_owned(),
			}])
		})?;
		let mut issues = Vec::new();
		let model_name = string_field(object, "model_name", &mut issues);
		let mut numbers = Vec::new();
		for field in NUMBER_FIELDS {
			if let Some(value) = field.validate(object.get(field.name), &mut issues) {
				numbers.push((field.name, value));
			}
		}
		let mut categories = Vec::new();
		for (name, _) in CATEGORY_FIELDS {
			if let Some(value) = string_field(object, name, &mut issues) {
				categories.push((*name, value));
			}
		}
		match model_name {
			Some(model_name) if issues.is_empty() => Ok(PredictionInput {
				model_name,
				numbers,
				categories,
			}),
			_ => Err(RequestError::Validation(issues)),
		}
	}

	fn check_categories(&self) -> Result<(), RequestError> {
		match self.categories.iter().find(|(_, value)| value.is_empty()) {
			Some((name, _)) => Err(RequestError::BadRequest(format!(
				"Missing required field: {}",
				name
			))),
			None => Ok(()),
		}
	}

	/// A single row dataframe. Categorical fields become text columns, which the artifact's one hot encoded feature groups match against their options.
	fn dataframe(&self) -> DataFrame {
		let numbers = self.numbers.iter().map(|(name, value)| {
			Column::Number(NumberColumn {
				name: (*name).to_owned(),
				data: vec![*value],
			})
		});
		let categories = self.categories.iter().map(|(name, value)| {
			Column::Text(TextColumn {
				name: (*name).to_owned(),
				data: vec![value.clone()],
			})
		});
		DataFrame {
			columns: numbers.chain(categories).collect(),
		}
	}
}

fn string_field(
	object: &serde_json::Map<String, serde_json::Value>,
	name: &str,
	issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
	match object.get(name) {
		None | Some(serde_json::Value::Null) => {
			issues.push(ValidationIssue::new(name, "field required"));
			None
		}
		Some(serde_json::Value::String(value)) => Some(value.clone()),
		Some(_) => {
			issues.push(ValidationIssue::new(name, "str type expected"));
			None
		}
	}
}

impl NumberField {
	fn validate(&self, value: Option<&serde_json::Value>, issues: &mut Vec<ValidationIssue>) -> Option<f32> {
		let value = match value {
			None | Some(serde_json::Value::Null) => {
				issues.push(ValidationIssue::new(self.name, "field required"));
				return None;
			}
			Some(value) => value,
		};
		let value = match value.as_f64() {
			Some(value) if self.integer && value.fract() != 0.0 => {
				issues.push(ValidationIssue::new(self.name, "value is not a valid integer"));
				return None;
			}
			Some(value) => value,
			None if self.integer => {
				issues.push(ValidationIssue::new(self.name, "value is not a valid integer"));
				return None;
			}
			None => {
				issues.push(ValidationIssue::new(self.name, "value is not a valid float"));
				return None;
			}
		};
		if let Some(min) = self.min.filter(|min| value < *min) {
			issues.push(ValidationIssue::new(
				self.name,
				format!("ensure this value is greater than or equal to {}", min),
			));
			return None;
		}
		if let Some(max) = self.max.filter(|max| value > *max) {
			issues.push(ValidationIssue::new(
				self.name,
				format!("ensure this value is less than or equal to {}", max),
			));
			return None;
		}
		Some(value as f32)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use hazard_core::{
		hyperparameters::Hyperparameters,
		model::{Model, ModelConfig, ModelName},
		persist::EvaluationMetrics,
	};
	use hazard_features::{NormalizedFeatureGroup, OneHotEncodedFeatureGroup};
	use ndarray::prelude::*;

	fn body() -> serde_json::Value {
		json!({
			"model_name": "randomforest_test",
			"elevation": 1200.0,
			"slope": 60.0,
			"aspect": 180.0,
			"rainfall_daily": 40.0,
			"rainfall_monthly": 300.0,
			"distance_to_faults": 2.5,
			"soil_depth": 1.2,
			"vegetation_density": 0.4,
			"earthquake_magnitude": 3.1,
			"soil_moisture": 60.0,
			"previous_landslides": 2,
			"snow_melt": 0.0,
			"landslide_probability": 0.3,
			"lithology": "shale",
			"land_use": "forest",
			"human_activity": "low",
		})
	}

	/// Write a random forest that predicts 1.0 for steep slopes on shale and 0.0 otherwise.
	fn write_model(dir: &std::path::Path, model_name: ModelName, file_stem: &str) {
		let features = Array2::from_shape_fn((60, 2), |(i, j)| match j {
			0 => (i % 10) as f32 / 10.0,
			_ => (i % 2) as f32,
		});
		let labels = features
			.axis_iter(Axis(0))
			.map(|row| if row[0] > 0.45 && row[1] == 1.0 { 1.0 } else { 0.0 })
			.collect::<Array1<f32>>();
		let mut config = ModelConfig::new(model_name);
		config.hyperparameters.insert("n_estimators", 20);
		let model = Model::new(&config, 42)
			.train(features.view(), labels.view(), &Hyperparameters::new())
			.unwrap();
		let artifact = ModelArtifact {
			model_name,
			timestamp: "20240101_000000".to_owned(),
			feature_groups: vec![
				FeatureGroup::Normalized(NormalizedFeatureGroup {
					source_column_name: "slope".to_owned(),
					mean: 0.0,
					variance: 90.0 * 90.0,
				}),
				FeatureGroup::OneHotEncoded(OneHotEncodedFeatureGroup {
					source_column_name: "lithology".to_owned(),
					options: vec!["shale".to_owned()],
				}),
			],
			feature_names: vec!["slope".to_owned(), "lithology_shale".to_owned()],
			target_column_name: "landslide_occurred".to_owned(),
			model,
			hyperparameters: config.hyperparameters,
			test_metrics: EvaluationMetrics {
				mse: 0.64,
				r2: 0.5,
				rmse: 0.8,
			},
		};
		artifact.to_file(&dir.join(format!("{}.pkl", file_stem))).unwrap();
	}

	async fn send(context: &Arc<Context>, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
		let body = body.map(|body| Body::from(body.to_string())).unwrap_or_else(Body::empty);
		let request = Request::builder().method(method).uri(uri).body(body).unwrap();
		let response = handle(context.clone(), request).await;
		assert_eq!(
			response.headers().get("access-control-allow-origin").unwrap(),
			"*"
		);
		let status = response.status();
		let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
		let json = if bytes.is_empty() {
			serde_json::Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, json)
	}

	#[tokio::test]
	async fn test_predict() {
		let dir = tempfile::tempdir().unwrap();
		write_model(dir.path(), ModelName::RandomForest, "randomforest_test");
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let (status, json) = send(&context, Method::POST, "/api/v1/predict", Some(body())).await;
		assert_eq!(status, StatusCode::OK);
		let prediction = json["prediction"].as_f64().unwrap();
		assert!(prediction > 0.5, "prediction was {}", prediction);
		let variability = json["prediction_variability"].as_f64().unwrap();
		assert!((0.0..=0.5).contains(&variability));
		let mut flat = body();
		flat["slope"] = json!(5.0);
		let (_, json) = send(&context, Method::POST, "/api/v1/predict", Some(flat)).await;
		assert!(json["prediction"].as_f64().unwrap() < 0.5);
		assert_eq!(context.cache.load_count(), 1);
		let (status, json) = send(&context, Method::GET, "/model-health", None).await;
		assert_eq!(status, StatusCode::OK);
		insta::assert_snapshot!(json.to_string(), @r###"{"available_models":["randomforest_test"],"loaded_models":["randomforest_test"]}"###);
	}

	#[tokio::test]
	async fn test_variability_falls_back_to_rmse() {
		let dir = tempfile::tempdir().unwrap();
		write_model(dir.path(), ModelName::LinearRegression, "linear_test");
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let mut body = body();
		body["model_name"] = json!("linear_test");
		let (status, json) = send(&context, Method::POST, "/api/v1/predict", Some(body)).await;
		assert_eq!(status, StatusCode::OK);
		let prediction = json["prediction"].as_f64().unwrap();
		assert!((0.0..=1.0).contains(&prediction));
		assert_eq!(json["prediction_variability"].as_f64().unwrap(), 0.5);
	}

	#[tokio::test]
	async fn test_validation() {
		let dir = tempfile::tempdir().unwrap();
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let mut invalid = body();
		invalid["slope"] = json!(95.0);
		invalid["previous_landslides"] = json!(1.5);
		invalid["lithology"] = json!(3);
		invalid.as_object_mut().unwrap().remove("aspect");
		let (status, json) = send(&context, Method::POST, "/api/v1/predict", Some(invalid)).await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		assert_eq!(
			json,
			json!({
				"detail": [
					{ "loc": ["body", "slope"], "msg": "ensure this value is less than or equal to 90" },
					{ "loc": ["body", "aspect"], "msg": "field required" },
					{ "loc": ["body", "previous_landslides"], "msg": "value is not a valid integer" },
					{ "loc": ["body", "lithology"], "msg": "str type expected" },
				]
			})
		);
		let request = Request::builder()
			.method(Method::POST)
			.uri("/api/v1/predict")
			.body(Body::from("{"))
			.unwrap();
		assert_eq!(
			handle(context.clone(), request).await.status(),
			StatusCode::UNPROCESSABLE_ENTITY
		);
	}

	#[tokio::test]
	async fn test_errors() {
		let dir = tempfile::tempdir().unwrap();
		write_model(dir.path(), ModelName::RandomForest, "randomforest_test");
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let mut unknown = body();
		unknown["model_name"] = json!("svm");
		let (status, json) = send(&context, Method::POST, "/api/v1/predict", Some(unknown)).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(json, json!({ "detail": "model svm not found" }));
		let mut empty = body();
		empty["land_use"] = json!("");
		let (status, json) = send(&context, Method::POST, "/api/v1/predict", Some(empty)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json, json!({ "detail": "Missing required field: land_use" }));
		let (status, _) = send(&context, Method::GET, "/api/v1/unknown", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, _) = send(&context, Method::OPTIONS, "/api/v1/predict", None).await;
		assert_eq!(status, StatusCode::NO_CONTENT);
	}

	#[tokio::test]
	async fn test_models_and_health() {
		let dir = tempfile::tempdir().unwrap();
		write_model(dir.path(), ModelName::RandomForest, "randomforest_b");
		write_model(dir.path(), ModelName::RandomForest, "randomforest_a");
		std::fs::write(dir.path().join("notes.txt"), "").unwrap();
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let (status, json) = send(&context, Method::GET, "/api/v1/models", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json, json!(["randomforest_a", "randomforest_b"]));
		let (status, json) = send(&context, Method::GET, "/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json, json!({ "status": "healthy" }));
	}

	#[tokio::test]
	async fn test_predict_with_trained_models() {
		use std::fmt::Write;
		let dir = tempfile::tempdir().unwrap();
		let mut csv = String::from("date,latitude,longitude,slope,rainfall_daily,lithology,landslide_occurred\n");
		for i in 0..60 {
			let slope = (i * 7 % 60) as f32;
			let rainfall = (i * 13 % 50) as f32;
			let lithology = ["basalt", "granite", "shale"][i % 3];
			let occurred = if slope > 30.0 && rainfall > 20.0 { 1 } else { 0 };
			writeln!(csv, "2020-01-01,45.0,7.0,{},{},{},{}", slope, rainfall, lithology, occurred).unwrap();
		}
		let file = dir.path().join("landslides.csv");
		std::fs::write(&file, csv).unwrap();
		let models_dir = dir.path().join("ml-models");
		for model in ["randomforest", "linear_regression"] {
			hazard_core::run(&hazard_core::train::RunOptions {
				file: Some(file.clone()),
				models: model.parse().unwrap(),
				models_dir: Some(models_dir.clone()),
				..Default::default()
			})
			.unwrap();
		}
		let context = Arc::new(Context::new(models_dir.clone()));
		let names = hazard_core::persist::list_models(&models_dir).unwrap();
		assert_eq!(names.len(), 2);
		for name in names {
			let artifact = ModelArtifact::from_path(&models_dir.join(format!("{}.pkl", name))).unwrap();
			assert_eq!(artifact.feature_names[0], "slope");
			let mut body = body();
			body["model_name"] = json!(name);
			let (status, json) = send(&context, Method::POST, "/api/v1/predict", Some(body)).await;
			assert_eq!(status, StatusCode::OK, "{}", json);
			let prediction = json["prediction"].as_f64().unwrap();
			assert!((0.0..=1.0).contains(&prediction));
			let variability = json["prediction_variability"].as_f64().unwrap();
			assert!((0.0..=0.5).contains(&variability));
		}
	}
}
