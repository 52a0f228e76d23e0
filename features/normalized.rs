use hazard_dataframe::{ColumnView, NumberColumnView};
use hazard_metrics::MeanVariance;
use hazard_util::error::Result;
use ndarray::prelude::*;

/**
A `NormalizedFeatureGroup` transforms a number column to zero mean and unit variance. [Learn more](https://en.wikipedia.org/wiki/Feature_scaling#Standardization_(Z-score_Normalization).

```text
feature_value = (value - mean) / std
```

Invalid values, and every value of a column with zero variance, map to 0.0, which is the mean after scaling.
*/
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedFeatureGroup {
	pub source_column_name: String,
	pub mean: f32,
	pub variance: f32,
}

impl NormalizedFeatureGroup {
	pub fn fit(column: NumberColumnView) -> Self {
		let mean_variance = MeanVariance::compute(column.data);
		Self {
			source_column_name: column.name.to_owned(),
			mean: mean_variance.mean,
			variance: mean_variance.variance,
		}
	}

	pub fn compute_array_f32(&self, mut features: ArrayViewMut2<f32>, column: &ColumnView) -> Result<()> {
		let column = column
			.as_number()
			.ok_or_else(|| super::unsupported_column("normalized", column))?;
		for (feature, value) in features.column_mut(0).iter_mut().zip(column.data.iter()) {
			*feature = self.normalize(*value);
		}
		Ok(())
	}

	pub fn normalize(&self, value: f32) -> f32 {
		if value.is_nan() || self.variance == 0.0 {
			0.0
		} else {
			(value - self.mean) / f32::sqrt(self.variance)
		}
	}
}

#[test]
fn test_fit_and_normalize() {
	let data = vec![0.0, 5.2, 1.3, 10.0];
	let group = NormalizedFeatureGroup::fit(NumberColumnView {
		name: "rainfall_daily",
		data: &data,
	});
	assert_eq!(group.source_column_name, "rainfall_daily");
	let std = group.variance.sqrt();
	assert!((group.normalize(0.0) - (0.0 - 4.125) / std).abs() < 1e-6);
	assert_eq!(group.normalize(f32::NAN), 0.0);
	let constant = NormalizedFeatureGroup {
		source_column_name: "snow_melt".to_owned(),
		mean: 3.0,
		variance: 0.0,
	};
	assert_eq!(constant.normalize(3.0), 0.0);
}
