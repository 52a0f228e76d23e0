/*!
This crate provides a small columnar dataframe, a two dimensional table where each column has its own data type. Dataframes are loaded from csv files with [`DataFrame::from_path`](struct.DataFrame.html#method.from_path), which infers the type of every column whose type was not given explicitly.
*/

#![allow(clippy::tabs_in_doc_comments)]

use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::num::NonZeroUsize;

mod load;

pub use self::load::*;

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrameView<'a> {
	pub columns: Vec<ColumnView<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Unknown(UnknownColumn),
	Number(NumberColumn),
	Enum(EnumColumn),
	Text(TextColumn),
}

/// A column with no valid values, whose type could not be inferred.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownColumn {
	pub name: String,
	pub len: usize,
}

/// Invalid values are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f32>,
}

/// Values are stored as one-based indexes into `options`. Values that are not one of the options are stored as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextColumn {
	pub name: String,
	pub data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnView<'a> {
	Unknown(UnknownColumnView<'a>),
	Number(NumberColumnView<'a>),
	Enum(EnumColumnView<'a>),
	Text(TextColumnView<'a>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownColumnView<'a> {
	pub name: &'a str,
	pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumnView<'a> {
	pub name: &'a str,
	pub data: &'a [f32],
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumnView<'a> {
	pub name: &'a str,
	pub options: &'a [String],
	pub data: &'a [Option<NonZeroUsize>],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextColumnView<'a> {
	pub name: &'a str,
	pub data: &'a [String],
}

/// The type of a column, either declared in configuration or inferred while loading a csv.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum ColumnType {
	#[serde(rename = "unknown")]
	Unknown,
	#[serde(rename = "number")]
	Number,
	#[serde(rename = "enum")]
	Enum { options: Vec<String> },
	#[serde(rename = "text")]
	Text,
}

impl DataFrame {
	/// Create a dataframe with no rows, one empty column per name and type.
	pub fn new(column_names: Vec<String>, column_types: Vec<ColumnType>) -> Self {
		let columns = column_names
			.into_iter()
			.zip(column_types)
			.map(|(name, column_type)| Column::empty(name, column_type))
			.collect();
		Self { columns }
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn view(&self) -> DataFrameView {
		let columns = self.columns.iter().map(|column| column.view()).collect();
		DataFrameView { columns }
	}

	pub fn column_names(&self) -> Vec<&str> {
		self.columns.iter().map(|column| column.name()).collect()
	}

	pub fn column_index(&self, name: &str) -> Option<usize> {
		self.columns.iter().position(|column| column.name() == name)
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|column| column.name() == name)
	}

	/// Remove the column named `name` and return it.
	pub fn take_column(&mut self, name: &str) -> Option<Column> {
		let index = self.column_index(name)?;
		Some(self.columns.remove(index))
	}

	/// Remove every column whose name is in `names`. The names of the columns that were present and removed are returned.
	pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
		let mut dropped = Vec::new();
		self.columns.retain(|column| {
			if names.contains(&column.name()) {
				dropped.push(column.name().to_owned());
				false
			} else {
				true
			}
		});
		dropped
	}

	/// Trim and lowercase every column name, so `" Rainfall_mm"` becomes `"rainfall_mm"`.
	pub fn normalize_column_names(&mut self) {
		for column in self.columns.iter_mut() {
			let name = column.name().trim().to_lowercase();
			column.set_name(name);
		}
	}

	/// Shuffle the rows of the dataframe. Every column is shuffled with an identically seeded rng, so rows stay aligned.
	pub fn shuffle_rows(&mut self, seed: u64) {
		for column in self.columns.iter_mut() {
			let mut rng = Xoshiro256Plus::seed_from_u64(seed);
			match column {
				Column::Unknown(_) => {}
				Column::Number(column) => column.data.shuffle(&mut rng),
				Column::Enum(column) => column.data.shuffle(&mut rng),
				Column::Text(column) => column.data.shuffle(&mut rng),
			}
		}
	}
}

impl Column {
	/// An empty column of the given type.
	pub fn empty(name: String, column_type: ColumnType) -> Self {
		match column_type {
			ColumnType::Unknown => Self::Unknown(UnknownColumn { name, len: 0 }),
			ColumnType::Number => Self::Number(NumberColumn {
				name,
				data: Vec::new(),
			}),
			ColumnType::Enum { options } => Self::Enum(EnumColumn {
				name,
				options,
				data: Vec::new(),
			}),
			ColumnType::Text => Self::Text(TextColumn {
				name,
				data: Vec::new(),
			}),
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Self::Unknown(s) => s.len,
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
			Self::Text(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Unknown(s) => s.name.as_str(),
			Self::Number(s) => s.name.as_str(),
			Self::Enum(s) => s.name.as_str(),
			Self::Text(s) => s.name.as_str(),
		}
	}

	fn set_name(&mut self, name: String) {
		match self {
			Self::Unknown(s) => s.name = name,
			Self::Number(s) => s.name = name,
			Self::Enum(s) => s.name = name,
			Self::Text(s) => s.name = name,
		}
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Self::Number(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_enum(&self) -> Option<&EnumColumn> {
		match self {
			Self::Enum(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&TextColumn> {
		match self {
			Self::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn view(&self) -> ColumnView {
		match self {
			Self::Unknown(column) => ColumnView::Unknown(column.view()),
			Self::Number(column) => ColumnView::Number(column.view()),
			Self::Enum(column) => ColumnView::Enum(column.view()),
			Self::Text(column) => ColumnView::Text(column.view()),
		}
	}
}

impl UnknownColumn {
	pub fn view(&self) -> UnknownColumnView {
		UnknownColumnView {
			name: &self.name,
			len: self.len,
		}
	}
}

impl NumberColumn {
	pub fn view(&self) -> NumberColumnView {
		NumberColumnView {
			name: &self.name,
			data: &self.data,
		}
	}
}

impl EnumColumn {
	pub fn view(&self) -> EnumColumnView {
		EnumColumnView {
			name: &self.name,
			options: &self.options,
			data: &self.data,
		}
	}
}

impl TextColumn {
	pub fn view(&self) -> TextColumnView {
		TextColumnView {
			name: &self.name,
			data: &self.data,
		}
	}
}

impl<'a> DataFrameView<'a> {
	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn column(&self, name: &str) -> Option<&ColumnView<'a>> {
		self.columns.iter().find(|column| column.name() == name)
	}
}

impl<'a> ColumnView<'a> {
	pub fn len(&self) -> usize {
		match self {
			Self::Unknown(s) => s.len,
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
			Self::Text(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &'a str {
		match self {
			Self::Unknown(s) => s.name,
			Self::Number(s) => s.name,
			Self::Enum(s) => s.name,
			Self::Text(s) => s.name,
		}
	}

	pub fn as_number(&self) -> Option<NumberColumnView<'a>> {
		match self {
			Self::Number(s) => Some(s.clone()),
			_ => None,
		}
	}
}

impl<'a> EnumColumnView<'a> {
	/// Retrieve the option string for the value at `index`, or `None` if the value is invalid.
	pub fn option_at(&self, index: usize) -> Option<&'a str> {
		self.data[index].and_then(|value| self.options.get(value.get() - 1).map(|option| option.as_str()))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn dataframe() -> DataFrame {
		DataFrame {
			columns: vec![
				Column::Number(NumberColumn {
					name: "elevation".to_owned(),
					data: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
				}),
				Column::Text(TextColumn {
					name: "label".to_owned(),
					data: (0..8).map(|i| format!("row{}", i)).collect(),
				}),
			],
		}
	}

	#[test]
	fn test_shuffle_rows_keeps_rows_aligned() {
		let mut dataframe = dataframe();
		dataframe.shuffle_rows(42);
		let numbers = &dataframe.columns[0].as_number().unwrap().data;
		let labels = &dataframe.columns[1].as_text().unwrap().data;
		for (number, label) in numbers.iter().zip(labels.iter()) {
			assert_eq!(format!("row{}", *number as usize), *label);
		}
	}

	#[test]
	fn test_shuffle_rows_is_deterministic() {
		let mut a = dataframe();
		let mut b = dataframe();
		a.shuffle_rows(42);
		b.shuffle_rows(42);
		assert_eq!(a, b);
		let mut c = dataframe();
		c.shuffle_rows(7);
		assert_ne!(a, c);
	}

	#[test]
	fn test_drop_columns() {
		let mut dataframe = dataframe();
		let dropped = dataframe.drop_columns(&["label", "latitude"]);
		assert_eq!(dropped, vec!["label".to_owned()]);
		assert_eq!(dataframe.column_names(), vec!["elevation"]);
	}
}
