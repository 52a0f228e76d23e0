/*!
The hazard prediction server. `POST /predict` takes a json object with a `model_type` of `earthquake`, `flood` or `forestfire` and the fields that hazard's model needs, and responds with the prediction. Errors are returned as `{error}`.
*/

use crate::{
	cache::{CacheError, ModelCache},
	error::RequestError,
	json_response, preflight, with_cors,
};
use hazard_core::hazards::{Hazard, HazardArtifact, HazardPrediction};
use hazard_dataframe::{Column, DataFrame, NumberColumn, TextColumn};
use hazard_util::error::{Error, Result};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};

pub struct Context {
	pub cache: ModelCache<HazardArtifact>,
}

impl Context {
	pub fn new(models_dir: PathBuf) -> Self {
		Self {
			cache: ModelCache::new(models_dir, HazardArtifact::from_path),
		}
	}
}

pub async fn handle(context: Arc<Context>, request: Request<Body>) -> Response<Body> {
	let method = request.method().clone();
	let path = request.uri().path().to_owned();
	let path_components: Vec<&str> = path.split('/').skip(1).collect();
	let result = match (&method, path_components.as_slice()) {
		(&Method::OPTIONS, _) => Ok(preflight()),
		(&Method::POST, &["predict"]) => predict(&context, request).await,
		_ => Err(RequestError::NotFound("not found".to_owned()).into()),
	};
	with_cors(result.unwrap_or_else(error_response))
}

fn error_response(error: Error) -> Response<Body> {
	let (status, message) = match (
		error.downcast_ref::<RequestError>(),
		error.downcast_ref::<CacheError>(),
	) {
		(Some(RequestError::BadRequest(message)), _) => (StatusCode::BAD_REQUEST, message.clone()),
		(Some(RequestError::Validation(issues)), _) => (
			StatusCode::BAD_REQUEST,
			issues
				.iter()
				.map(|issue| issue.msg.as_str())
				.collect::<Vec<_>>()
				.join(", "),
		),
		(Some(RequestError::NotFound(message)), _) => (StatusCode::NOT_FOUND, message.clone()),
		(None, Some(CacheError::NotFound { name })) => {
			(StatusCode::NOT_FOUND, format!("model {} not found", name))
		}
		_ => {
			tracing::error!(error = %format!("{:#}", error), "prediction failed");
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				"internal server error".to_owned(),
			)
		}
	};
	json_response(status, json!({ "error": message }))
}

async fn predict(context: &Context, request: Request<Body>) -> Result<Response<Body>> {
	let bytes = hyper::body::to_bytes(request.into_body())
		.await
		.map_err(|_| RequestError::BadRequest("failed to read the request body".to_owned()))?;
	let body: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
		.map_err(|error| RequestError::BadRequest(format!("invalid json: {}", error)))?;
	let hazard: Hazard = match body.get("model_type") {
		Some(serde_json::Value::String(model_type)) => model_type
			.parse()
			.map_err(|error: hazard_core::hazards::ParseHazardError| RequestError::BadRequest(error.to_string()))?,
		_ => {
			return Err(RequestError::BadRequest(
				"model_type is required, it must be \"earthquake\", \"flood\" or \"forestfire\"".to_owned(),
			)
			.into())
		}
	};
	let dataframe = input_dataframe(hazard, &body)?;
	let artifact = context.cache.get(&format!("{}_model", hazard)).await?;
	let prediction = tokio::task::spawn_blocking(move || artifact.predict(&dataframe.view())).await??;
	let response = match prediction {
		HazardPrediction::Magnitude { value, risk_level } => json!({
			"model_type": hazard,
			"predicted_magnitude": value,
			"risk_level": risk_level,
		}),
		HazardPrediction::FloodRisk { value, risk_level } => json!({
			"model_type": hazard,
			"predicted_flood_risk": value,
			"risk_level": risk_level,
		}),
		HazardPrediction::RiskLevel(level) => json!({
			"model_type": hazard,
			"predicted_risk_level": level,
		}),
	};
	Ok(json_response(StatusCode::OK, response))
}

/// Build the single row dataframe the model for `hazard` predicts from. Every missing field is named in the error.
fn input_dataframe(
	hazard: Hazard,
	body: &serde_json::Map<String, serde_json::Value>,
) -> Result<DataFrame, RequestError> {
	let fields = hazard.required_fields();
	let missing: Vec<&str> = fields
		.iter()
		.copied()
		.filter(|field| body.get(*field).map_or(true, |value| value.is_null()))
		.collect();
	if !missing.is_empty() {
		return Err(RequestError::BadRequest(format!(
			"missing input data for the {} model, provide {}",
			hazard,
			missing.join(", ")
		)));
	}
	let mut columns = Vec::with_capacity(fields.len());
	for field in fields {
		let value = body.get(*field).unwrap_or(&serde_json::Value::Null);
		let column = match hazard {
			Hazard::ForestFire => {
				let value = value
					.as_str()
					.ok_or_else(|| RequestError::BadRequest(format!("{} must be a string", field)))?;
				Column::Text(TextColumn {
					name: (*field).to_owned(),
					data: vec![value.to_owned()],
				})
			}
			Hazard::Earthquake | Hazard::Flood => {
				let value = match value {
					serde_json::Value::Number(value) => value.as_f64(),
					serde_json::Value::String(value) => value.trim().parse().ok(),
					_ => None,
				}
				.filter(|value: &f64| value.is_finite())
				.ok_or_else(|| RequestError::BadRequest(format!("{} must be a number", field)))?;
				Column::Number(NumberColumn {
					name: (*field).to_owned(),
					data: vec![value as f32],
				})
			}
		};
		columns.push(column);
	}
	Ok(DataFrame { columns })
}

#[cfg(test)]
mod test {
	use super::*;
	use hazard_core::hazards::train_hazard;
	use std::fmt::Write;

	fn train_earthquake(dir: &std::path::Path) {
		let mut csv = String::from("Latitude,Longitude,Depth,Magnitude\n");
		for i in 0..40 {
			let depth = (i % 20) as f32;
			writeln!(csv, "{},{},{},{}", 20.0 + i as f32 * 0.1, 80.0, depth, 3.0 + depth / 10.0).unwrap();
		}
		let file = dir.join("earthquake.csv");
		std::fs::write(&file, csv).unwrap();
		train_hazard(Hazard::Earthquake, &file, dir).unwrap();
	}

	async fn send(context: &Arc<Context>, body: &str) -> (StatusCode, serde_json::Value) {
		let request = Request::builder()
			.method(Method::POST)
			.uri("/predict")
			.body(Body::from(body.to_owned()))
			.unwrap();
		let response = handle(context.clone(), request).await;
		let status = response.status();
		let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
		(status, serde_json::from_slice(&bytes).unwrap())
	}

	#[tokio::test]
	async fn test_predict_earthquake() {
		let dir = tempfile::tempdir().unwrap();
		train_earthquake(dir.path());
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let (status, json) = send(
			&context,
			r#"{"model_type": "earthquake", "latitude": 21.5, "longitude": 80, "depth": "18"}"#,
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(json["model_type"], "earthquake");
		let magnitude = json["predicted_magnitude"].as_f64().unwrap();
		assert!(magnitude > 4.3, "magnitude was {}", magnitude);
		assert_eq!(json["risk_level"], "High");
		assert_eq!(context.cache.loaded(), vec!["earthquake_model".to_owned()]);
	}

	#[tokio::test]
	async fn test_errors() {
		let dir = tempfile::tempdir().unwrap();
		let context = Arc::new(Context::new(dir.path().to_owned()));
		let (status, json) = send(&context, r#"{"model_type": "flood", "latitude": 1, "longitude": 2}"#).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(
			json["error"],
			"missing input data for the flood model, provide rainfall_mm, elevation_m, river_discharge_m3_s"
		);
		let (status, json) = send(&context, r#"{"model_type": "tsunami"}"#).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(
			json["error"],
			"invalid model_type \"tsunami\", it must be \"earthquake\", \"flood\" or \"forestfire\""
		);
		let (status, _) = send(&context, "not json").await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		let (status, json) = send(
			&context,
			r#"{"model_type": "earthquake", "latitude": "north", "longitude": 2, "depth": 3}"#,
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(json["error"], "latitude must be a number");
		let (status, json) = send(&context, r#"{"model_type": "forestfire", "state": "Kerala"}"#).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(json["error"], "model forestfire_model not found");
	}
}
