use super::{mean::Mean, StreamingMetric};

/// The fraction of predicted class indexes that equal their label.
#[derive(Debug, Default)]
pub struct Accuracy(Mean);

impl StreamingMetric<'_> for Accuracy {
	/// `(predicted class, label)`
	type Input = (usize, usize);
	type Output = Option<f32>;

	fn update(&mut self, (prediction, label): Self::Input) {
		let correct = if prediction == label { 1.0 } else { 0.0 };
		self.0.update(correct)
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Self::Output {
		self.0.finalize()
	}
}

#[test]
fn test_accuracy() {
	let mut accuracy = Accuracy::default();
	for input in [(0, 0), (1, 2), (2, 2), (1, 1)].iter() {
		accuracy.update(*input);
	}
	assert_eq!(accuracy.finalize(), Some(0.75));
	assert_eq!(Accuracy::default().finalize(), None);
}
