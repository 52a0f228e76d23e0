use super::{mean::Mean, StreamingMetric};

/// The mean squared error is the mean of the squared differences between the predicted value and the label.
#[derive(Debug, Default)]
pub struct MeanSquaredError(Mean);

impl StreamingMetric<'_> for MeanSquaredError {
	/// The input is `(prediction, label)`.
	type Input = (f32, f32);
	type Output = Option<f32>;

	fn update(&mut self, value: Self::Input) {
		self.0.update((value.1 - value.0).powi(2))
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Self::Output {
		self.0.finalize()
	}
}

#[test]
fn test_merge() {
	let mut a = MeanSquaredError::default();
	a.update((1.0, 2.0));
	let mut b = MeanSquaredError::default();
	b.update((0.0, 3.0));
	a.merge(b);
	assert_eq!(a.finalize(), Some(5.0));
}
