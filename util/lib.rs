/*!
This crate contains small utilities shared by the other crates in the workspace: the error type, a float wrapper that is guaranteed to be finite, a shared progress counter, the `zip!` macro, and the hyper server loop used by the prediction servers.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod error;
pub mod finite;
pub mod progress_counter;
pub mod serve;

/// Zip any number of iterables together, producing an iterator of tuples.
#[macro_export]
macro_rules! zip {
	($e:expr $(,)?) => {
		::std::iter::IntoIterator::into_iter($e)
	};
	($a:expr, $b:expr $(,)?) => {
		::std::iter::Iterator::zip(::std::iter::IntoIterator::into_iter($a), $b)
	};
	($a:expr, $b:expr, $c:expr $(,)?) => {
		::std::iter::Iterator::map(
			::std::iter::Iterator::zip(
				::std::iter::Iterator::zip(::std::iter::IntoIterator::into_iter($a), $b),
				$c,
			),
			|((a, b), c)| (a, b, c),
		)
	};
}
