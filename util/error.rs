pub use anyhow::{Context, Error, Result};

/// Create an `Error` from a format string.
#[macro_export]
macro_rules! err {
	($($t:tt)*) => {
		$crate::error::Error::msg(format!($($t)*))
	};
}
