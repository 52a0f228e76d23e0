/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait, a number of metrics that implement it such as [`MeanSquaredError`](struct.MeanSquaredError.html) and [`RegressionMetrics`](struct.RegressionMetrics.html), and the stateless scoring functions [`mean_squared_error`](fn.mean_squared_error.html), [`r2_score`](fn.r2_score.html) and [`root_mean_squared_error`](fn.root_mean_squared_error.html) used to evaluate models on held out data.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod accuracy;
mod mean;
mod mean_squared_error;
mod mean_variance;
mod regression;
mod score;

pub use self::accuracy::Accuracy;
pub use self::mean::Mean;
pub use self::mean_squared_error::MeanSquaredError;
pub use self::mean_variance::{merge_mean_m2, MeanVariance};
pub use self::regression::{RegressionMetrics, RegressionMetricsInput, RegressionMetricsOutput};
pub use self::score::{mean_squared_error, r2_score, root_mean_squared_error, MetricError};

/**
The `StreamingMetric` trait defines a common interface to metrics that can be computed in a streaming manner, where the input is available in chunks.

After being initialized, a value of type `T` implementing the `StreamingMetric` trait can have `update()` called on it with values of the associated type `Input`. Multiple values of `T` can be merged together by calling `merge()`. When finished aggregating, call `finalize()` to produce the associated type `Output`.

# Examples

Here is a `Max` metric, which takes `f32`s as input and produces the largest of them.

```
use hazard_metrics::StreamingMetric;

struct Max(f32);

impl StreamingMetric<'_> for Max {
	type Input = f32;
	type Output = f32;
	fn update(&mut self, input: Self::Input) {
		self.0 = self.0.max(input)
	}
	fn merge(&mut self, other: Self) { self.0 = self.0.max(other.0) }
	fn finalize(self) -> Self::Output { self.0 }
}
```
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this streaming metric with the `Input` `input`.
	fn update(&mut self, input: Self::Input);
	/// Merge multiple independently computed streaming metrics.
	fn merge(&mut self, other: Self);
	/// When you are done aggregating `Input`s, call `finalize()` to produce an `Output`.
	fn finalize(self) -> Self::Output;
}
