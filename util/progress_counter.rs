use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/// A counter that can be cloned and updated from any thread, for example to report how many bytes of a dataset have been read.
#[derive(Clone, Debug)]
pub struct ProgressCounter {
	current: Arc<AtomicU64>,
	total: u64,
}

impl ProgressCounter {
	pub fn new(total: u64) -> Self {
		Self {
			current: Arc::new(AtomicU64::new(0)),
			total,
		}
	}
	pub fn total(&self) -> u64 {
		self.total
	}
	pub fn get(&self) -> u64 {
		self.current.load(Ordering::Relaxed)
	}
	pub fn set(&self, value: u64) {
		self.current.store(value, Ordering::Relaxed);
	}
	pub fn inc(&self, amount: u64) {
		self.current.fetch_add(amount, Ordering::Relaxed);
	}

	/// The completed fraction in `0.0..=1.0`. A counter with a total of zero is complete.
	pub fn fraction(&self) -> f64 {
		if self.total == 0 {
			1.0
		} else {
			(self.get() as f64 / self.total as f64).min(1.0)
		}
	}
}

#[test]
fn test_progress_counter() {
	let counter = ProgressCounter::new(200);
	let clone = counter.clone();
	clone.inc(50);
	counter.set(counter.get() + 50);
	assert_eq!(clone.get(), 100);
	assert!((counter.fraction() - 0.5).abs() < 1e-9);
	assert_eq!(ProgressCounter::new(0).fraction(), 1.0);
}
