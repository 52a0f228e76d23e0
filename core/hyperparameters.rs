/*!
Hyperparameters are stored as an ordered map from name to value. The values are untagged, so they read naturally from yaml and json: `max_depth: 7`, `learning_rate: 0.01`, `bootstrap: true` and `max_features: sqrt`.
*/

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum HyperparameterValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
}

impl std::fmt::Display for HyperparameterValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			HyperparameterValue::Bool(value) => write!(f, "{}", value),
			HyperparameterValue::Int(value) => write!(f, "{}", value),
			HyperparameterValue::Float(value) => write!(f, "{}", value),
			HyperparameterValue::String(value) => write!(f, "\"{}\"", value),
		}
	}
}

impl From<bool> for HyperparameterValue {
	fn from(value: bool) -> Self {
		HyperparameterValue::Bool(value)
	}
}

impl From<i64> for HyperparameterValue {
	fn from(value: i64) -> Self {
		HyperparameterValue::Int(value)
	}
}

impl From<i32> for HyperparameterValue {
	fn from(value: i32) -> Self {
		HyperparameterValue::Int(i64::from(value))
	}
}

impl From<f64> for HyperparameterValue {
	fn from(value: f64) -> Self {
		HyperparameterValue::Float(value)
	}
}

impl From<&str> for HyperparameterValue {
	fn from(value: &str) -> Self {
		HyperparameterValue::String(value.to_owned())
	}
}

#[derive(Debug, Error, PartialEq)]
pub enum HyperparameterError {
	#[error("missing hyperparameter {name}")]
	Missing { name: String },
	#[error("hyperparameter {name} must be {expected}, got {value}")]
	WrongType {
		name: String,
		expected: &'static str,
		value: HyperparameterValue,
	},
	#[error("hyperparameter {name} is {value}, but it {requirement}")]
	OutOfRange {
		name: String,
		value: HyperparameterValue,
		requirement: &'static str,
	},
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, HyperparameterValue>);

impl Hyperparameters {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, name: &str, value: impl Into<HyperparameterValue>) {
		self.0.insert(name.to_owned(), value.into());
	}

	pub fn get(&self, name: &str) -> Option<&HyperparameterValue> {
		self.0.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.contains_key(name)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperparameterValue)> {
		self.0.iter().map(|(name, value)| (name.as_str(), value))
	}

	/// Return a copy of `self` with every value in `overrides` replacing the value of the same name.
	pub fn merged(&self, overrides: &Hyperparameters) -> Hyperparameters {
		let mut merged = self.clone();
		for (name, value) in overrides.0.iter() {
			merged.0.insert(name.clone(), value.clone());
		}
		merged
	}

	fn require(&self, name: &str) -> Result<&HyperparameterValue, HyperparameterError> {
		self.get(name).ok_or_else(|| HyperparameterError::Missing {
			name: name.to_owned(),
		})
	}

	pub fn int(&self, name: &str) -> Result<i64, HyperparameterError> {
		match self.require(name)? {
			HyperparameterValue::Int(value) => Ok(*value),
			value => Err(wrong_type(name, "an integer", value)),
		}
	}

	/// Integers are accepted wherever a float is expected.
	pub fn float(&self, name: &str) -> Result<f64, HyperparameterError> {
		match self.require(name)? {
			HyperparameterValue::Float(value) => Ok(*value),
			HyperparameterValue::Int(value) => Ok(*value as f64),
			value => Err(wrong_type(name, "a number", value)),
		}
	}

	pub fn bool(&self, name: &str) -> Result<bool, HyperparameterError> {
		match self.require(name)? {
			HyperparameterValue::Bool(value) => Ok(*value),
			value => Err(wrong_type(name, "a boolean", value)),
		}
	}

	pub fn string(&self, name: &str) -> Result<&str, HyperparameterError> {
		match self.require(name)? {
			HyperparameterValue::String(value) => Ok(value),
			value => Err(wrong_type(name, "a string", value)),
		}
	}

	/// An integer that must be at least `min`.
	pub fn count(&self, name: &str, min: i64) -> Result<usize, HyperparameterError> {
		let value = self.int(name)?;
		if value < min {
			return Err(out_of_range(
				name,
				HyperparameterValue::Int(value),
				match min {
					0 => "must not be negative",
					1 => "must be at least 1",
					_ => "must be at least 2",
				},
			));
		}
		Ok(value as usize)
	}

	/// A finite float in `(0, 1]`.
	pub fn fraction(&self, name: &str) -> Result<f32, HyperparameterError> {
		let value = self.float(name)?;
		if !(value > 0.0 && value <= 1.0) {
			return Err(out_of_range(
				name,
				HyperparameterValue::Float(value),
				"must be greater than 0 and at most 1",
			));
		}
		Ok(value as f32)
	}

	/// A finite float greater than zero.
	pub fn positive(&self, name: &str) -> Result<f32, HyperparameterError> {
		let value = self.float(name)?;
		if !(value > 0.0) || !value.is_finite() {
			return Err(out_of_range(
				name,
				HyperparameterValue::Float(value),
				"must be a positive finite number",
			));
		}
		Ok(value as f32)
	}

	/// A finite float that is not negative.
	pub fn non_negative(&self, name: &str) -> Result<f32, HyperparameterError> {
		let value = self.float(name)?;
		if !(value >= 0.0) || !value.is_finite() {
			return Err(out_of_range(
				name,
				HyperparameterValue::Float(value),
				"must be a finite number that is not negative",
			));
		}
		Ok(value as f32)
	}
}

pub(crate) fn wrong_type(name: &str, expected: &'static str, value: &HyperparameterValue) -> HyperparameterError {
	HyperparameterError::WrongType {
		name: name.to_owned(),
		expected,
		value: value.clone(),
	}
}

pub(crate) fn out_of_range(name: &str, value: HyperparameterValue, requirement: &'static str) -> HyperparameterError {
	HyperparameterError::OutOfRange {
		name: name.to_owned(),
		value,
		requirement,
	}
}

impl std::fmt::Display for Hyperparameters {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut first = true;
		for (name, value) in self.0.iter() {
			if !first {
				write!(f, ", ")?;
			}
			first = false;
			write!(f, "{}={}", name, value)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_deserialize_untagged() {
		let hyperparameters: Hyperparameters =
			serde_yaml::from_str("max_depth: 7\nlearning_rate: 0.01\nbootstrap: true\nmax_features: sqrt\n").unwrap();
		assert_eq!(hyperparameters.get("max_depth"), Some(&HyperparameterValue::Int(7)));
		assert_eq!(
			hyperparameters.get("learning_rate"),
			Some(&HyperparameterValue::Float(0.01))
		);
		assert_eq!(hyperparameters.get("bootstrap"), Some(&HyperparameterValue::Bool(true)));
		assert_eq!(
			hyperparameters.get("max_features"),
			Some(&HyperparameterValue::String("sqrt".to_owned()))
		);
		insta::assert_snapshot!(hyperparameters.to_string(), @r###"bootstrap=true, learning_rate=0.01, max_depth=7, max_features="sqrt""###);
	}

	#[test]
	fn test_merged() {
		let mut defaults = Hyperparameters::new();
		defaults.insert("n_estimators", 300);
		defaults.insert("max_depth", 10);
		let mut overrides = Hyperparameters::new();
		overrides.insert("max_depth", 3);
		let merged = defaults.merged(&overrides);
		assert_eq!(merged.int("n_estimators"), Ok(300));
		assert_eq!(merged.int("max_depth"), Ok(3));
		assert_eq!(defaults.int("max_depth"), Ok(10));
	}

	#[test]
	fn test_errors() {
		let mut hyperparameters = Hyperparameters::new();
		hyperparameters.insert("n_estimators", "many");
		hyperparameters.insert("subsample", 1.5);
		hyperparameters.insert("min_samples_split", 1);
		assert_eq!(
			hyperparameters.count("n_estimators", 1).unwrap_err().to_string(),
			"hyperparameter n_estimators must be an integer, got \"many\""
		);
		assert_eq!(
			hyperparameters.fraction("subsample").unwrap_err().to_string(),
			"hyperparameter subsample is 1.5, but it must be greater than 0 and at most 1"
		);
		assert!(hyperparameters.count("min_samples_split", 2).is_err());
		assert_eq!(
			hyperparameters.float("alpha"),
			Err(HyperparameterError::Missing {
				name: "alpha".to_owned()
			})
		);
	}
}
