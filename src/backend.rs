//! Exchange backends: how an authorization code or refresh token becomes credentials.
//!
//! A backend is immutable configuration plus two operations, [`ExchangeBackend::exchange`]
//! and [`ExchangeBackend::refresh`], each returning a complete [`CredentialStore`] that the
//! manager installs. Backends never touch the installed store themselves.

pub mod client;
pub mod endpoints;
pub mod pkce;
pub mod proxy;
pub mod token;

pub use client::*;
pub use endpoints::*;
pub use pkce::*;
pub use proxy::*;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{CredentialStore, ScopeSet, TokenSecret},
	error::ConfigError,
	http::NetworkTransport,
	manager::AuthorizationSession,
};

/// Boxed future returned by backend exchanges.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<CredentialStore>> + 'a + Send>>;

/// Discriminator recorded in persisted snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
	/// Direct exchange with a client secret.
	Client,
	/// Proof Key for Code Exchange, no secret.
	Pkce,
	/// Exchange delegated to a proxy that holds the secret.
	Proxy,
}
impl BackendKind {
	/// Stable identifier used in snapshots, spans, and metrics.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Client => "client",
			Self::Pkce => "pkce",
			Self::Proxy => "proxy",
		}
	}
}
impl Display for BackendKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Strategy for obtaining and renewing credentials.
///
/// Implementations hold only immutable configuration. The manager picks exactly one backend
/// at construction and keeps it for its lifetime, so callers never branch on the variant.
pub trait ExchangeBackend
where
	Self: 'static + Send + Sync + Clone + Debug + PartialEq + Serialize + DeserializeOwned,
{
	/// Authorization code grant accepted by [`exchange`](Self::exchange).
	type Grant: 'static + Send + Sync + Debug;

	/// Discriminator written to persisted snapshots.
	const KIND: BackendKind;

	/// OAuth client identifier.
	fn client_id(&self) -> &str;

	/// Authorization endpoint users are sent to.
	fn authorization_endpoint(&self) -> &Url;

	/// Returns `true` when authorize URLs must carry a PKCE challenge.
	fn uses_pkce(&self) -> bool {
		false
	}

	/// Builds the grant for an authorization code returned to `session`'s redirect URI.
	fn grant_for_session(session: &AuthorizationSession, code: String) -> Self::Grant;

	/// Trades an authorization code for credentials.
	fn exchange<'a>(
		&'a self,
		grant: &'a Self::Grant,
		transport: &'a dyn NetworkTransport,
	) -> BackendFuture<'a>;

	/// Trades a refresh token for credentials, keeping `granted` when the server omits scopes.
	fn refresh<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
		granted: &'a ScopeSet,
		transport: &'a dyn NetworkTransport,
	) -> BackendFuture<'a>;

	/// Removes secrets that must not be persisted.
	fn strip_secrets(&mut self) {}

	/// Re-checks configuration restored from a snapshot.
	fn validate(&self) -> Result<(), ConfigError>;
}
