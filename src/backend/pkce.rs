//! Proof Key for Code Exchange for public clients without a secret.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	backend::{
		BackendFuture, BackendKind, ExchangeBackend, ProviderEndpoints,
		token::{self, TokenRequestKind},
	},
	error::ConfigError,
	http::NetworkTransport,
	manager::AuthorizationSession,
};

/// Authorization code plus the verifier whose challenge was on the authorize URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PkceCodeGrant {
	/// Authorization code from the redirect query.
	pub code: String,
	/// Redirect URI used on the authorize URL.
	pub redirect_uri: Url,
	/// PKCE code verifier matching the challenge sent with the authorize URL.
	pub code_verifier: TokenSecret,
	/// Scopes requested on the authorize URL.
	pub scopes: ScopeSet,
}
impl PkceCodeGrant {
	/// Creates a grant without requested scopes.
	pub fn new(
		code: impl Into<String>,
		redirect_uri: Url,
		code_verifier: impl Into<String>,
	) -> Self {
		Self {
			code: code.into(),
			redirect_uri,
			code_verifier: TokenSecret::new(code_verifier),
			scopes: ScopeSet::default(),
		}
	}

	/// Records the scopes requested on the authorize URL.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}
}

/// Backend for public clients proving possession with a PKCE verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceBackend {
	/// OAuth client identifier.
	pub client_id: String,
	/// Authorization server endpoints.
	pub endpoints: ProviderEndpoints,
}
impl PkceBackend {
	/// Creates a backend from the client identifier and endpoints.
	pub fn new(client_id: impl Into<String>, endpoints: ProviderEndpoints) -> Self {
		Self { client_id: client_id.into(), endpoints }
	}
}
impl ExchangeBackend for PkceBackend {
	type Grant = PkceCodeGrant;

	const KIND: BackendKind = BackendKind::Pkce;

	fn client_id(&self) -> &str {
		&self.client_id
	}

	fn authorization_endpoint(&self) -> &Url {
		&self.endpoints.authorization
	}

	fn uses_pkce(&self) -> bool {
		true
	}

	fn grant_for_session(session: &AuthorizationSession, code: String) -> Self::Grant {
		PkceCodeGrant {
			code,
			redirect_uri: session.redirect_uri.clone(),
			code_verifier: TokenSecret::new(session.code_verifier()),
			scopes: session.scopes.clone(),
		}
	}

	fn exchange<'a>(
		&'a self,
		grant: &'a Self::Grant,
		transport: &'a dyn NetworkTransport,
	) -> BackendFuture<'a> {
		Box::pin(async move {
			let params = [
				("grant_type", "authorization_code"),
				("code", grant.code.as_str()),
				("redirect_uri", grant.redirect_uri.as_str()),
				("client_id", self.client_id.as_str()),
				("code_verifier", grant.code_verifier.expose()),
			];

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
			let params = [
				("grant_type", "refresh_token"),
				("refresh_token", refresh_token.expose()),
				("client_id", self.client_id.as_str()),
			];

			token::request_credentials(
				transport,
				&self.endpoints.token,
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
