use hazard_dataframe::ColumnView;
use hazard_util::error::Result;
use ndarray::prelude::*;

/**
An `IdentityFeatureGroup` passes a single number column from the input dataframe to the output features untouched. Invalid values stay NaN.

| dataframe value | feature value |
|-----------------|---------------|
| 0.2             | 0.2           |
| 3.0             | 3.0           |
| NaN             | NaN           |
*/
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdentityFeatureGroup {
	pub source_column_name: String,
}

impl IdentityFeatureGroup {
	pub fn compute_array_f32(&self, mut features: ArrayViewMut2<f32>, column: &ColumnView) -> Result<()> {
		let column = column
			.as_number()
			.ok_or_else(|| super::unsupported_column("identity", column))?;
		for (feature, value) in features.column_mut(0).iter_mut().zip(column.data.iter()) {
			*feature = *value;
		}
		Ok(())
	}
}
