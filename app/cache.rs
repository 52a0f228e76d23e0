use hazard_core::persist::MODEL_FILE_EXTENSION;
use hazard_util::error::Result;
use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex, PoisonError,
	},
};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum CacheError {
	#[error("model {name} not found")]
	NotFound { name: String },
	#[error("failed to load model {name}: {message}")]
	Load { name: String, message: String },
}

/**
A `ModelCache` loads models from `{dir}/{name}.pkl` the first time they are requested and keeps them for the lifetime of the process.

Each name gets its own `OnceCell`, so concurrent first requests for the same model share a single load while requests for other models proceed. A load that fails leaves its cell empty, so a model file added later is picked up by the next request.
*/
pub struct ModelCache<T> {
	dir: PathBuf,
	load: fn(&Path) -> Result<T>,
	entries: Mutex<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
	loads: AtomicUsize,
}

impl<T> ModelCache<T>
where
	T: Send + Sync + 'static,
{
	pub fn new(dir: PathBuf, load: fn(&Path) -> Result<T>) -> Self {
		Self {
			dir,
			load,
			entries: Mutex::new(HashMap::new()),
			loads: AtomicUsize::new(0),
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub async fn get(&self, name: &str) -> Result<Arc<T>, CacheError> {
		// Names come from requests, so they must not escape the models directory.
		if name.is_empty() || name.contains(|c| c == '/' || c == '\\') || name.contains("..") {
			return Err(CacheError::NotFound {
				name: name.to_owned(),
			});
		}
		let cell = self
			.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.entry(name.to_owned())
			.or_insert_with(|| Arc::new(OnceCell::new()))
			.clone();
		let model = cell
			.get_or_try_init(|| async {
				let path = self.dir.join(format!("{}.{}", name, MODEL_FILE_EXTENSION));
				if !path.is_file() {
					return Err(CacheError::NotFound {
						name: name.to_owned(),
					});
				}
				self.loads.fetch_add(1, Ordering::SeqCst);
				let load = self.load;
				let model = tokio::task::spawn_blocking(move || load(&path))
					.await
					.map_err(|error| CacheError::Load {
						name: name.to_owned(),
						message: error.to_string(),
					})?
					.map_err(|error| CacheError::Load {
						name: name.to_owned(),
						message: format!("{:#}", error),
					})?;
				tracing::info!(model = name, "loaded model");
				Ok(Arc::new(model))
			})
			.await?;
		Ok(model.clone())
	}

	/// The names of the models that are loaded, sorted.
	pub fn loaded(&self) -> Vec<String> {
		let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		let mut names: Vec<String> = entries
			.iter()
			.filter(|(_, cell)| cell.initialized())
			.map(|(name, _)| name.clone())
			.collect();
		names.sort();
		names
	}

	/// The number of times a model file was read from disk.
	pub fn load_count(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use hazard_util::err;

	fn load_text(path: &Path) -> Result<String> {
		let text = std::fs::read_to_string(path)?;
		if text.is_empty() {
			return Err(err!("empty model"));
		}
		Ok(text)
	}

	#[tokio::test]
	async fn test_loads_each_model_once() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.pkl"), "model a").unwrap();
		let cache = Arc::new(ModelCache::new(dir.path().to_owned(), load_text));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let cache = cache.clone();
				tokio::spawn(async move { cache.get("a").await.map(|model| model.as_ref().clone()) })
			})
			.collect();
		for handle in handles {
			assert_eq!(handle.await.unwrap().unwrap(), "model a");
		}
		assert_eq!(cache.load_count(), 1);
		assert_eq!(cache.loaded(), vec!["a".to_owned()]);
	}

	#[tokio::test]
	async fn test_errors() {
		let dir = tempfile::tempdir().unwrap();
		let cache = ModelCache::new(dir.path().to_owned(), load_text);
		assert!(matches!(cache.get("missing").await, Err(CacheError::NotFound { .. })));
		assert!(matches!(cache.get("../secret").await, Err(CacheError::NotFound { .. })));
		std::fs::write(dir.path().join("empty.pkl"), "").unwrap();
		let error = cache.get("empty").await.unwrap_err();
		assert_eq!(error.to_string(), "failed to load model empty: empty model");
		assert!(cache.loaded().is_empty());
		// A failed load is retried once the file is fixed.
		std::fs::write(dir.path().join("empty.pkl"), "fixed").unwrap();
		assert_eq!(cache.get("empty").await.unwrap().as_str(), "fixed");
		assert_eq!(cache.load_count(), 2);
	}
}
