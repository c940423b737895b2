//! Direct code and refresh exchange authenticated with the client secret.

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

/// Authorization code returned to a redirect URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeGrant {
	/// Authorization code from the redirect query.
	pub code: String,
	/// Redirect URI used on the authorize URL; sent again for verification.
	pub redirect_uri: Url,
	/// Scopes requested on the authorize URL.
	pub scopes: ScopeSet,
}
impl CodeGrant {
	/// Creates a grant without requested scopes.
	pub fn new(code: impl Into<String>, redirect_uri: Url) -> Self {
		Self { code: code.into(), redirect_uri, scopes: ScopeSet::default() }
	}

	/// Records the scopes requested on the authorize URL.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}
}

/// Backend for confidential clients that hold their own secret.
///
/// The secret is sent in the form body of every token request. It can be stripped before a
/// snapshot is persisted and re-supplied with [`with_client_secret`](Self::with_client_secret)
/// after restoring; until then every exchange fails with
/// [`ConfigError::MissingClientSecret`] before touching the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientBackend {
	/// OAuth client identifier.
	pub client_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	client_secret: Option<TokenSecret>,
	/// Authorization server endpoints.
	pub endpoints: ProviderEndpoints,
}
impl ClientBackend {
	/// Creates a backend from the client credentials and endpoints.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		endpoints: ProviderEndpoints,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: Some(TokenSecret::new(client_secret)),
			endpoints,
		}
	}

	/// Re-supplies the client secret, e.g. after restoring a redacted snapshot.
	pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(client_secret));

		self
	}

	/// Returns `true` when a non-empty secret is configured.
	pub fn has_client_secret(&self) -> bool {
		self.client_secret().is_ok()
	}

	fn client_secret(&self) -> Result<&TokenSecret, ConfigError> {
		self.client_secret
			.as_ref()
			.filter(|secret| !secret.is_empty())
			.ok_or(ConfigError::MissingClientSecret)
	}
}
impl ExchangeBackend for ClientBackend {
	type Grant = CodeGrant;

	const KIND: BackendKind = BackendKind::Client;

	fn client_id(&self) -> &str {
		&self.client_id
	}

	fn authorization_endpoint(&self) -> &Url {
		&self.endpoints.authorization
	}

	fn grant_for_session(session: &AuthorizationSession, code: String) -> Self::Grant {
		CodeGrant { code, redirect_uri: session.redirect_uri.clone(), scopes: session.scopes.clone() }
	}

	fn exchange<'a>(
		&'a self,
		grant: &'a Self::Grant,
		transport: &'a dyn NetworkTransport,
	) -> BackendFuture<'a> {
		Box::pin(async move {
			let secret = self.client_secret()?;
			let params = [
				("grant_type", "authorization_code"),
				("code", grant.code.as_str()),
				("redirect_uri", grant.redirect_uri.as_str()),
				("client_id", self.client_id.as_str()),
				("client_secret", secret.expose()),
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
			let secret = self.client_secret()?;
			let params = [
				("grant_type", "refresh_token"),
				("refresh_token", refresh_token.expose()),
				("client_id", self.client_id.as_str()),
				("client_secret", secret.expose()),
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

	fn strip_secrets(&mut self) {
		self.client_secret = None;
	}

	fn validate(&self) -> Result<(), ConfigError> {
		Ok(self.endpoints.validate()?)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[tokio::test]
	async fn code_exchange_sends_secret_and_redirect() {
		let transport = RecordingTransport::json(200, token_body("T1", Some("R1"), "a b", 3600));
		let backend = test_client_backend();
		let grant = CodeGrant::new(
			"abc123",
			Url::parse("https://app.example.com/callback").expect("Redirect fixture should parse."),
		);
		let record =
			backend.exchange(&grant, &transport).await.expect("Code exchange should succeed.");
		let form = transport.last_request().expect("Exchange should hit the transport.").form();

		assert_eq!(record.access_token(), Some("T1"));
		assert_eq!(form.get("grant_type").map(String::as_str), Some("authorization_code"));
		assert_eq!(form.get("code").map(String::as_str), Some("abc123"));
		assert_eq!(
			form.get("redirect_uri").map(String::as_str),
			Some("https://app.example.com/callback")
		);
		assert_eq!(form.get("client_secret").map(String::as_str), Some(TEST_CLIENT_SECRET));
	}

	#[tokio::test]
	async fn missing_secret_fails_before_the_network() {
		let transport = RecordingTransport::json(200, token_body("T1", None, "", 3600));
		let mut backend = test_client_backend();

		backend.strip_secrets();

		let err = backend
			.refresh(&TokenSecret::new("R1"), &ScopeSet::default(), &transport)
			.await
			.expect_err("Refresh without a secret must fail.");

		assert!(matches!(err, Error::Config(ConfigError::MissingClientSecret)));
		assert_eq!(transport.calls(), 0);
		assert!(backend.with_client_secret("again").has_client_secret());
	}
}
