use num_traits::Float;
use std::cmp::Ordering;
use thiserror::Error;

/// A float that is neither NaN nor infinite, and is therefore totally ordered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Finite<T>(T)
where
	T: Float;

#[derive(Debug, Error, PartialEq)]
#[error("value is not finite")]
pub struct NotFiniteError;

impl<T> Finite<T>
where
	T: Float,
{
	pub fn new(value: T) -> Result<Self, NotFiniteError> {
		if value.is_finite() {
			Ok(Self(value))
		} else {
			Err(NotFiniteError)
		}
	}

	pub fn get(self) -> T {
		self.0
	}
}

impl<T> Eq for Finite<T> where T: Float {}

impl<T> PartialOrd for Finite<T>
where
	T: Float,
{
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> Ord for Finite<T>
where
	T: Float,
{
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
	}
}

impl<T> std::fmt::Display for Finite<T>
where
	T: Float + std::fmt::Display,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[test]
fn test_finite() {
	assert_eq!(Finite::new(f32::NAN), Err(NotFiniteError));
	assert_eq!(Finite::new(f32::NEG_INFINITY), Err(NotFiniteError));
	let mut values = vec![
		Finite::new(0.5f32).unwrap(),
		Finite::new(-1.0).unwrap(),
		Finite::new(0.25).unwrap(),
	];
	values.sort();
	let values: Vec<f32> = values.into_iter().map(|value| value.get()).collect();
	assert_eq!(values, vec![-1.0, 0.25, 0.5]);
}
