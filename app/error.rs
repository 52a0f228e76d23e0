use thiserror::Error;

/// A problem with one field of a request body.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ValidationIssue {
	pub loc: Vec<String>,
	pub msg: String,
}

impl ValidationIssue {
	pub fn new(field: &str, msg: impl Into<String>) -> Self {
		Self {
			loc: vec!["body".to_owned(), field.to_owned()],
			msg: msg.into(),
		}
	}
}

/// Errors caused by the client. Every other error becomes a 500 response.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("{0}")]
	BadRequest(String),
	#[error("request validation failed")]
	Validation(Vec<ValidationIssue>),
	#[error("{0}")]
	NotFound(String),
}
