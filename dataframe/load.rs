use super::*;
use fnv::FnvHashMap;
use hazard_util::error::{Context, Result};
use std::{
	collections::{BTreeMap, BTreeSet},
	path::Path,
};

#[derive(Clone)]
pub struct FromCsvOptions<'a> {
	pub column_types: Option<BTreeMap<String, ColumnType>>,
	pub infer_options: InferOptions,
	pub invalid_values: &'a [&'a str],
}

impl<'a> Default for FromCsvOptions<'a> {
	fn default() -> Self {
		Self {
			column_types: None,
			infer_options: InferOptions::default(),
			invalid_values: DEFAULT_INVALID_VALUES,
		}
	}
}

#[derive(Clone, Debug)]
pub struct InferOptions {
	pub enum_max_unique_values: usize,
}

impl Default for InferOptions {
	fn default() -> Self {
		Self {
			enum_max_unique_values: 100,
		}
	}
}

/// These values are the default values that are considered invalid.
pub const DEFAULT_INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

impl DataFrame {
	pub fn from_path(path: &Path, options: FromCsvOptions, progress: impl Fn(u64)) -> Result<Self> {
		let mut reader = csv::ReaderBuilder::new()
			.trim(csv::Trim::All)
			.from_path(path)
			.with_context(|| format!("failed to open csv file {}", path.display()))?;
		Self::from_csv(&mut reader, options, progress)
			.with_context(|| format!("failed to load csv file {}", path.display()))
	}

	pub fn from_csv<R>(
		reader: &mut csv::Reader<R>,
		options: FromCsvOptions,
		progress: impl Fn(u64),
	) -> Result<Self>
	where
		R: std::io::Read + std::io::Seek,
	{
		let column_names: Vec<String> = reader
			.headers()?
			.into_iter()
			.map(|column_name| column_name.to_owned())
			.collect();
		let start_position = reader.position().clone();
		let infer_options = &options.infer_options;
		let invalid_values = options.invalid_values;
		let mut n_rows = None;

		#[derive(Clone, Debug)]
		enum ColumnTypeOrInferStats<'a> {
			ColumnType(ColumnType),
			InferStats(InferStats<'a>),
		}

		// Retrieve any column types present in the options.
		let mut column_types: Vec<ColumnTypeOrInferStats> = column_names
			.iter()
			.map(|column_name| {
				options
					.column_types
					.as_ref()
					.and_then(|column_types| column_types.get(column_name))
					.map(|column_type| ColumnTypeOrInferStats::ColumnType(column_type.clone()))
					.unwrap_or_else(|| {
						ColumnTypeOrInferStats::InferStats(InferStats::new(infer_options, invalid_values))
					})
			})
			.collect();

		// Passing over the csv to infer column types is only necessary if one or more columns did not have its type specified.
		let needs_infer = column_types
			.iter()
			.any(|column_type| matches!(column_type, ColumnTypeOrInferStats::InferStats(_)));

		if needs_infer {
			let mut infer_stats: Vec<(usize, &mut InferStats)> = column_types
				.iter_mut()
				.enumerate()
				.filter_map(|(index, column_type)| match column_type {
					ColumnTypeOrInferStats::ColumnType(_) => None,
					ColumnTypeOrInferStats::InferStats(infer_stats) => Some((index, infer_stats)),
				})
				.collect();
			let mut record = csv::StringRecord::new();
			let mut n_rows_computed = 0;
			while reader.read_record(&mut record)? {
				n_rows_computed += 1;
				for (index, infer_stats) in infer_stats.iter_mut() {
					if let Some(value) = record.get(*index) {
						infer_stats.update(value);
					}
				}
			}
			n_rows = Some(n_rows_computed);
			// After inference, return back to the beginning of the csv to load the values.
			reader.seek(start_position)?;
		}
		let column_types: Vec<ColumnType> = column_types
			.into_iter()
			.map(|column_type| match column_type {
				ColumnTypeOrInferStats::ColumnType(column_type) => column_type,
				ColumnTypeOrInferStats::InferStats(infer_stats) => infer_stats.finalize(),
			})
			.collect();

		let mut dataframe = Self::new(column_names, column_types);
		// Enum values are looked up by their option string.
		let enum_option_indexes: Vec<Option<FnvHashMap<String, NonZeroUsize>>> = dataframe
			.columns
			.iter()
			.map(|column| match column {
				Column::Enum(column) => Some(
					column
						.options
						.iter()
						.zip(1..)
						.filter_map(|(option, index)| {
							NonZeroUsize::new(index).map(|index| (option.clone(), index))
						})
						.collect(),
				),
				_ => None,
			})
			.collect();
		if let Some(n_rows) = n_rows {
			for column in dataframe.columns.iter_mut() {
				match column {
					Column::Unknown(_) => {}
					Column::Number(column) => column.data.reserve_exact(n_rows),
					Column::Enum(column) => column.data.reserve_exact(n_rows),
					Column::Text(column) => column.data.reserve_exact(n_rows),
				}
			}
		}
		// Read each csv record and insert the values into the columns of the dataframe.
		let mut record = csv::ByteRecord::new();
		while reader.read_byte_record(&mut record)? {
			if let Some(position) = record.position() {
				progress(position.byte());
			}
			for ((column, enum_option_indexes), value) in dataframe
				.columns
				.iter_mut()
				.zip(enum_option_indexes.iter())
				.zip(record.iter())
			{
				match column {
					Column::Unknown(column) => {
						column.len += 1;
					}
					Column::Number(column) => {
						let value = match lexical::parse::<f32, _>(value) {
							Ok(value) if value.is_finite() => value,
							_ => f32::NAN,
						};
						column.data.push(value);
					}
					Column::Enum(column) => {
						let value = std::str::from_utf8(value).ok().and_then(|value| {
							enum_option_indexes
								.as_ref()
								.and_then(|indexes| indexes.get(value).copied())
						});
						column.data.push(value);
					}
					Column::Text(column) => column.data.push(std::str::from_utf8(value)?.to_owned()),
				}
			}
		}
		Ok(dataframe)
	}
}

#[derive(Clone, Debug)]
pub struct InferStats<'a> {
	infer_options: &'a InferOptions,
	invalid_values: &'a [&'a str],
	column_type: InferColumnType,
	unique_values: Option<BTreeSet<String>>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
enum InferColumnType {
	Unknown,
	Number,
	Enum,
	Text,
}

impl<'a> InferStats<'a> {
	pub fn new(infer_options: &'a InferOptions, invalid_values: &'a [&'a str]) -> Self {
		Self {
			infer_options,
			invalid_values,
			column_type: InferColumnType::Unknown,
			unique_values: Some(BTreeSet::new()),
		}
	}

	pub fn update(&mut self, value: &str) {
		if self.invalid_values.contains(&value) {
			return;
		}
		if let Some(unique_values) = self.unique_values.as_mut() {
			if !unique_values.contains(value) {
				unique_values.insert(value.to_owned());
			}
			if unique_values.len() > self.infer_options.enum_max_unique_values {
				self.unique_values = None;
			}
		}
		let is_number = lexical::parse::<f32, _>(value)
			.map(|value| value.is_finite())
			.unwrap_or(false);
		self.column_type = match self.column_type {
			InferColumnType::Unknown | InferColumnType::Number if is_number => InferColumnType::Number,
			InferColumnType::Text => InferColumnType::Text,
			_ if self.unique_values.is_some() => InferColumnType::Enum,
			_ => InferColumnType::Text,
		};
	}

	/// Columns with only zeros and ones stay number columns so they can be used as regression targets.
	pub fn finalize(self) -> ColumnType {
		match self.column_type {
			InferColumnType::Unknown => ColumnType::Unknown,
			InferColumnType::Number => ColumnType::Number,
			InferColumnType::Enum => ColumnType::Enum {
				options: self.unique_values.unwrap_or_default().into_iter().collect(),
			},
			InferColumnType::Text => ColumnType::Text,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn load(csv: &str, options: FromCsvOptions) -> DataFrame {
		DataFrame::from_csv(
			&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
			options,
			|_| {},
		)
		.unwrap()
	}

	#[test]
	fn test_infer() {
		let csv = r#"number,enum,text
1,test,hello
2,test,world
"#;
		let df = load(
			csv,
			FromCsvOptions {
				infer_options: InferOptions {
					enum_max_unique_values: 1,
				},
				..Default::default()
			},
		);
		insta::assert_debug_snapshot!(df, @r###"
  DataFrame {
      columns: [
          Number(
              NumberColumn {
                  name: "number",
                  data: [
                      1.0,
                      2.0,
                  ],
              },
          ),
          Enum(
              EnumColumn {
                  name: "enum",
                  options: [
                      "test",
                  ],
                  data: [
                      Some(
                          1,
                      ),
                      Some(
                          1,
                      ),
                  ],
              },
          ),
          Text(
              TextColumn {
                  name: "text",
                  data: [
                      "hello",
                      "world",
                  ],
              },
          ),
      ],
  }
  "###);
	}

	#[test]
	fn test_column_types() {
		let csv = r#"lithology,soil_depth
granite,1.5
slate,2
"#;
		let mut column_types = BTreeMap::new();
		column_types.insert(
			"lithology".to_owned(),
			ColumnType::Enum {
				options: vec!["basalt".to_owned(), "granite".to_owned()],
			},
		);
		let df = load(
			csv,
			FromCsvOptions {
				column_types: Some(column_types),
				..Default::default()
			},
		);
		let lithology = df.columns[0].as_enum().unwrap();
		assert_eq!(lithology.data, vec![NonZeroUsize::new(2), None]);
		assert_eq!(lithology.view().option_at(0), Some("granite"));
		assert_eq!(lithology.view().option_at(1), None);
		assert_eq!(df.columns[1].as_number().unwrap().data, vec![1.5, 2.0]);
	}

	#[test]
	fn test_zero_one_column_stays_number() {
		let csv = r#"landslide_occurred
0
1
1
"#;
		let df = load(csv, FromCsvOptions::default());
		assert_eq!(df.columns[0].as_number().unwrap().data, vec![0.0, 1.0, 1.0]);
	}

	#[test]
	fn test_invalid_values() {
		let csv = r#"rainfall,land_use
12.5,forest
NaN,?
,urban
"#;
		let df = load(csv, FromCsvOptions::default());
		let rainfall = df.columns[0].as_number().unwrap();
		assert_eq!(rainfall.data[0], 12.5);
		assert!(rainfall.data[1].is_nan());
		assert!(rainfall.data[2].is_nan());
		let land_use = df.columns[1].as_enum().unwrap();
		assert_eq!(land_use.options, vec!["forest".to_owned(), "urban".to_owned()]);
		assert_eq!(land_use.data[1], None);
	}

	#[test]
	fn test_text_after_enum_limit() {
		let csv = "state\na\nb\nc\n";
		let df = load(
			csv,
			FromCsvOptions {
				infer_options: InferOptions {
					enum_max_unique_values: 2,
				},
				..Default::default()
			},
		);
		assert!(df.columns[0].as_text().is_some());
	}
}
