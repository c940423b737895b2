//! Serializable manager state for persistence round-trips.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::CredentialStore,
	backend::{BackendKind, ExchangeBackend},
	error::ConfigError,
	store::StoreError,
};

/// Everything needed to rebuild an [`AuthorizationManager`](crate::manager::AuthorizationManager)
/// except its transport.
///
/// Decoding an encoded snapshot yields an equal snapshot. The `backend_kind` discriminator is
/// checked before the backend itself is decoded, so restoring a snapshot into the wrong
/// backend type fails with [`ConfigError::BackendMismatch`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManagerSnapshot<B> {
	/// Which backend produced the snapshot.
	pub backend_kind: BackendKind,
	/// Backend configuration.
	pub backend: B,
	/// Installed credentials.
	pub credentials: CredentialStore,
	/// How long before expiry a token is considered due for refresh.
	pub refresh_margin: Duration,
}
impl<B> ManagerSnapshot<B>
where
	B: ExchangeBackend,
{
	/// Removes backend secrets (the client secret) before persisting.
	pub fn without_secrets(mut self) -> Self {
		self.backend.strip_secrets();

		self
	}

	/// Encodes the snapshot as a JSON value.
	pub fn to_value(&self) -> Result<Value> {
		Ok(serde_json::to_value(self).map_err(StoreError::from)?)
	}

	/// Encodes the snapshot as a JSON string.
	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self).map_err(StoreError::from)?)
	}

	/// Decodes a snapshot from a JSON value, validating the discriminator and endpoints.
	pub fn from_value(value: Value) -> Result<Self> {
		let found = value
			.get("backend_kind")
			.cloned()
			.map(serde_json::from_value::<BackendKind>)
			.transpose()
			.map_err(StoreError::from)?
			.ok_or_else(|| StoreError::Serialization {
				message: "missing field `backend_kind`".into(),
			})?;

		if found != B::KIND {
			return Err(ConfigError::BackendMismatch { expected: B::KIND, found }.into());
		}

		let snapshot: Self = serde_path_to_error::deserialize(value).map_err(StoreError::from)?;

		snapshot.backend.validate()?;

		Ok(snapshot)
	}

	/// Decodes a snapshot from a JSON string.
	pub fn from_json(json: &str) -> Result<Self> {
		let value = serde_json::from_str(json).map_err(StoreError::from)?;

		Self::from_value(value)
	}
}
