//! Exchange delegated to a trusted proxy that holds the client secret.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	backend::{
		BackendFuture, BackendKind, ExchangeBackend, ProxyEndpoints,
		token::{self, TokenRequestKind},
	},
	error::ConfigError,
	http::NetworkTransport,
	manager::AuthorizationSession,
};

/// Authorization code forwarded to the proxy.
///
/// The proxy owns the redirect URI and client credentials, so only the code travels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyCodeGrant {
	/// Authorization code from the redirect query.
	pub code: String,
	/// Scopes requested on the authorize URL.
	pub scopes: ScopeSet,
}
impl ProxyCodeGrant {
	/// Creates a grant without requested scopes.
	pub fn new(code: impl Into<String>) -> Self {
		Self { code: code.into(), scopes: ScopeSet::default() }
	}

	/// Records the scopes requested on the authorize URL.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}
}

/// Backend that posts codes and refresh tokens to a proxy.
///
/// Requests carry `grant_type` plus `code` or `refresh_token` and nothing else; the proxy
/// adds the client credentials before talking to the authorization server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyBackend {
	/// OAuth client identifier, used on authorize URLs only.
	pub client_id: String,
	/// Authorization endpoint and proxy URLs.
	pub endpoints: ProxyEndpoints,
}
impl ProxyBackend {
	/// Creates a backend from the client identifier and proxy endpoints.
	pub fn new(client_id: impl Into<String>, endpoints: ProxyEndpoints) -> Self {
		Self { client_id: client_id.into(), endpoints }
	}
}
impl ExchangeBackend for ProxyBackend {
	type Grant = ProxyCodeGrant;

	const KIND: BackendKind = BackendKind::Proxy;

	fn client_id(&self) -> &str {
		&self.client_id
	}

	fn authorization_endpoint(&self) -> &Url {
		&self.endpoints.authorization
	}

	fn grant_for_session(session: &AuthorizationSession, code: String) -> Self::Grant {
		ProxyCodeGrant { code, scopes: session.scopes.clone() }
	}

	fn exchange<'a>(
		&'a self,
		grant: &'a Self::Grant,
		transport: &'a dyn NetworkTransport,
	) -> BackendFuture<'a> {
		Box::pin(async move {
			let params = [("grant_type", "authorization_code"), ("code", grant.code.as_str())];

			token::request_credentials(
				transport,
				&self.endpoints.token,
				&params,
				TokenRequestKind::Authorize { requested: &grant.scopes },
			)
			.await
		})
	}

	fn refresh<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
		granted: &'a ScopeSet,
		transport: &'a dyn NetworkTransport,
	) -> BackendFuture<'a> {
		Box::pin(async move {
			let params =
				[("grant_type", "refresh_token"), ("refresh_token", refresh_token.expose())];

			token::request_credentials(
				transport,
				&self.endpoints.token_refresh,
				&params,
				TokenRequestKind::Refresh { refresh_token, granted },
			)
			.await
		})
	}

	fn validate(&self) -> Result<(), ConfigError> {
		Ok(self.endpoints.validate()?)
	}
}
