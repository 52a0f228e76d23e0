/*!
This crate contains the two prediction servers:

- [`landslide`](landslide/index.html) serves the landslide models trained by `hazard train`.
- [`hazards`](hazards/index.html) serves the earthquake, flood and forest fire models trained by `hazard train-hazard`.

Both load models lazily through a [`ModelCache`](cache/struct.ModelCache.html), answer every request with permissive CORS headers, and shut down gracefully on ctrl-c.
*/

use hazard_util::error::Result;
use hyper::{
	header::{self, HeaderValue},
	Body, Response, StatusCode,
};
use std::{net::IpAddr, path::PathBuf};

pub mod cache;
pub mod error;
pub mod hazards;
pub mod landslide;

pub struct Options {
	pub host: IpAddr,
	pub port: u16,
	pub models_dir: PathBuf,
}

/// Serve the landslide api until ctrl-c is pressed.
pub fn run_landslide(options: Options) -> Result<()> {
	tracing::info!(models_dir = %options.models_dir.display(), "starting the landslide prediction server");
	let context = landslide::Context::new(options.models_dir);
	match hazard_core::persist::list_models(context.cache.dir()) {
		Ok(models) if models.is_empty() => tracing::warn!("no models found in the models directory"),
		Ok(models) => tracing::info!(?models, "available models"),
		Err(error) => tracing::error!(%error, "failed to list models"),
	}
	runtime()?.block_on(hazard_util::serve::serve(
		options.host,
		options.port,
		context,
		landslide::handle,
		shutdown(),
	))?;
	Ok(())
}

/// Serve the hazard api until ctrl-c is pressed.
pub fn run_hazards(options: Options) -> Result<()> {
	tracing::info!(models_dir = %options.models_dir.display(), "starting the hazard prediction server");
	let context = hazards::Context::new(options.models_dir);
	runtime()?.block_on(hazard_util::serve::serve(
		options.host,
		options.port,
		context,
		hazards::handle,
		shutdown(),
	))?;
	Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
	Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

async fn shutdown() {
	if let Err(error) = tokio::signal::ctrl_c().await {
		tracing::error!(%error, "failed to listen for ctrl-c");
		// Without a signal handler the server runs until it is killed.
		futures::future::pending::<()>().await;
	}
	tracing::info!("shutting down");
}

pub(crate) fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Body> {
	let mut response = Response::new(Body::from(value.to_string()));
	*response.status_mut() = status;
	response.headers_mut().insert(
		header::CONTENT_TYPE,
		HeaderValue::from_static("application/json"),
	);
	response
}

/// The response to a CORS preflight request.
pub(crate) fn preflight() -> Response<Body> {
	let mut response = Response::new(Body::empty());
	*response.status_mut() = StatusCode::NO_CONTENT;
	response
}

pub(crate) fn with_cors(mut response: Response<Body>) -> Response<Body> {
	let headers = response.headers_mut();
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_ORIGIN,
		HeaderValue::from_static("*"),
	);
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_METHODS,
		HeaderValue::from_static("GET, POST, OPTIONS"),
	);
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_HEADERS,
		HeaderValue::from_static("*"),
	);
	response
}
