//! Thread-safe in-memory [`SnapshotStore`] for local development and tests.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	store::{SnapshotStore, StoreFuture},
};

/// Keeps snapshots in-process; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<Mutex<BTreeMap<String, Value>>>);
impl MemoryStore {
	/// Number of stored snapshots.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}
impl SnapshotStore for MemoryStore {
	fn save<'a>(&'a self, key: &'a str, snapshot: Value) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.lock().insert(key.to_owned(), snapshot);

			Ok(())
		})
	}

	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
		Box::pin(async move { Ok(self.0.lock().get(key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.lock().remove(key);

			Ok(())
		})
	}
}
