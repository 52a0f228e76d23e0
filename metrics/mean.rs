use super::StreamingMetric;
use num_traits::ToPrimitive;

/// The arithmetic mean, accumulated in `f64`.
#[derive(Debug, Default, Clone)]
pub struct Mean {
	n: u64,
	sum: f64,
}

impl StreamingMetric<'_> for Mean {
	type Input = f32;
	type Output = Option<f32>;

	fn update(&mut self, value: Self::Input) {
		self.n += 1;
		self.sum += value as f64;
	}

	fn merge(&mut self, other: Self) {
		self.n += other.n;
		self.sum += other.sum;
	}

	fn finalize(self) -> Self::Output {
		if self.n == 0 {
			None
		} else {
			(self.sum / self.n.to_f64()?).to_f32()
		}
	}
}
