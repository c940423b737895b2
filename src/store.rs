//! Storage contracts and built-in stores for persisted manager snapshots.
//!
//! Stores hold opaque JSON snapshots under caller-chosen keys. The manager encodes and
//! decodes them (see [`ManagerSnapshot`](crate::manager::ManagerSnapshot)), so a store never
//! needs to know which backend produced a snapshot.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use serde_json::Value;
// self
use crate::_prelude::*;

/// Boxed future returned by [`SnapshotStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for persisted manager snapshots.
pub trait SnapshotStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the snapshot stored under `key`.
	fn save<'a>(&'a self, key: &'a str, snapshot: Value) -> StoreFuture<'a, ()>;

	/// Fetches the snapshot stored under `key`, if present.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;

	/// Removes the snapshot stored under `key`; removing a missing key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by snapshot encoding and [`SnapshotStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding snapshots.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload, including the JSON path when known.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl From<serde_json::Error> for StoreError {
	fn from(e: serde_json::Error) -> Self {
		Self::Serialization { message: e.to_string() }
	}
}
impl From<serde_path_to_error::Error<serde_json::Error>> for StoreError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Serialization { message: e.to_string() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_manager_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk full"));

		let source =
			StdError::source(&error).expect("Manager error should expose the store error.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn path_errors_name_the_failing_field() {
		let deserializer = &mut serde_json::Deserializer::from_str(r#"{"expires_at":7}"#);
		let err = serde_path_to_error::deserialize::<_, crate::auth::CredentialStore>(deserializer)
			.expect_err("Numeric expiry must be rejected.");

		assert!(StoreError::from(err).to_string().contains("expires_at"));
	}
}
