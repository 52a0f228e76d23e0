use hazard_dataframe::{ColumnView, EnumColumnView};
use hazard_util::error::Result;
use ndarray::prelude::*;

/**
A `OneHotEncodedFeatureGroup` creates one feature for each option of a categorical column. For each example every feature is 0.0 except the one for the example's value, which is 1.0. Values that are not one of the options, including invalid values, produce all zeros.

| dataframe value | land_use_forest | land_use_urban |
|-----------------|-----------------|----------------|
| "forest"        | 1.0             | 0.0            |
| "urban"         | 0.0             | 1.0            |
| "swamp"         | 0.0             | 0.0            |

The options are matched by string, so both enum and text columns can be encoded. This lets a single request row, whose values arrive as text, be encoded with the options fit during training.
*/
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OneHotEncodedFeatureGroup {
	pub source_column_name: String,
	pub options: Vec<String>,
}

impl OneHotEncodedFeatureGroup {
	pub fn fit(column: EnumColumnView) -> Self {
		Self {
			source_column_name: column.name.to_owned(),
			options: column.options.to_owned(),
		}
	}

	pub fn option_index(&self, value: &str) -> Option<usize> {
		self.options.iter().position(|option| option == value)
	}

	pub fn compute_array_f32(&self, mut features: ArrayViewMut2<f32>, column: &ColumnView) -> Result<()> {
		match column {
			ColumnView::Enum(column) => {
				for (index, mut row) in features.axis_iter_mut(Axis(0)).enumerate() {
					if let Some(option_index) = column.option_at(index).and_then(|v| self.option_index(v)) {
						row[option_index] = 1.0;
					}
				}
			}
			ColumnView::Text(column) => {
				for (value, mut row) in column.data.iter().zip(features.axis_iter_mut(Axis(0))) {
					if let Some(option_index) = self.option_index(value) {
						row[option_index] = 1.0;
					}
				}
			}
			ColumnView::Unknown(_) => {}
			ColumnView::Number(_) => {
				return Err(super::unsupported_column("one hot encoded", column));
			}
		}
		Ok(())
	}
}

#[test]
fn test_enum_column_with_different_options() {
	use std::num::NonZeroUsize;
	let options = vec!["granite".to_owned(), "shale".to_owned(), "slate".to_owned()];
	let data = vec![NonZeroUsize::new(2), None, NonZeroUsize::new(3)];
	let column = EnumColumnView {
		name: "lithology",
		options: &options,
		data: &data,
	};
	let group = OneHotEncodedFeatureGroup {
		source_column_name: "lithology".to_owned(),
		options: vec!["basalt".to_owned(), "shale".to_owned()],
	};
	let mut features = Array2::zeros((3, 2));
	group
		.compute_array_f32(features.view_mut(), &ColumnView::Enum(column))
		.unwrap();
	assert_eq!(features, arr2(&[[0.0, 1.0], [0.0, 0.0], [0.0, 0.0]]));
}
