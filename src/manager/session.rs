//! Authorize URL construction, `state` and PKCE generation, and redirect parsing.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::ScopeSet, backend::ExchangeBackend, error::CallbackError};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods surfaced via [`AuthorizationSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Options for [`AuthorizationManager::start_authorization`](crate::manager::AuthorizationManager::start_authorization).
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Redirect URI registered for the client.
	pub redirect_uri: Url,
	/// Scopes to request.
	pub scopes: ScopeSet,
	/// Forces the consent dialog even if the user already approved the client.
	pub show_dialog: bool,
}
impl AuthorizationRequest {
	/// Creates a request without scopes or a forced dialog.
	pub fn new(redirect_uri: Url) -> Self {
		Self { redirect_uri, scopes: ScopeSet::default(), show_dialog: false }
	}

	/// Sets the scopes to request.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets whether the consent dialog is forced.
	pub fn show_dialog(mut self, show_dialog: bool) -> Self {
		self.show_dialog = show_dialog;

		self
	}
}

/// Authorize URL plus the values that must survive until the redirect comes back.
///
/// Keep the session until the user is redirected, then hand the redirect URL to
/// [`AuthorizationManager::complete_authorization`](crate::manager::AuthorizationManager::complete_authorization).
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Requested scope set.
	pub scopes: ScopeSet,
	/// Opaque state value that must round-trip via the redirect.
	pub state: String,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL that callers should send end-users to.
	pub authorize_url: Url,
	pkce: PkcePair,
}
impl AuthorizationSession {
	pub(crate) fn build<B>(backend: &B, request: AuthorizationRequest) -> Self
	where
		B: ExchangeBackend,
	{
		let state = random_string(STATE_LEN);
		let pkce = PkcePair::generate();
		let mut authorize_url = backend.authorization_endpoint().clone();

		{
			let mut pairs = authorize_url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", backend.client_id());
			pairs.append_pair("redirect_uri", request.redirect_uri.as_str());

			if !request.scopes.is_empty() {
				pairs.append_pair("scope", &request.scopes.normalized());
			}

			pairs.append_pair("state", &state);

			if backend.uses_pkce() {
				pairs.append_pair("code_challenge", &pkce.challenge);
				pairs.append_pair("code_challenge_method", pkce.method.as_str());
			}
			if request.show_dialog {
				pairs.append_pair("show_dialog", "true");
			}
		}

		Self {
			scopes: request.scopes,
			state,
			redirect_uri: request.redirect_uri,
			authorize_url,
			pkce,
		}
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// PKCE code verifier. Callers must avoid logging this string.
	pub fn code_verifier(&self) -> &str {
		&self.pkce.verifier
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<(), CallbackError> {
		if returned_state == self.state { Ok(()) } else { Err(CallbackError::StateMismatch) }
	}

	/// Extracts the authorization code from the redirect URL, checking `state` first.
	pub fn authorization_code(&self, redirect: &Url) -> Result<String, CallbackError> {
		let mut code = None;
		let mut state = None;
		let mut error = None;
		let mut description = None;

		for (key, value) in redirect.query_pairs() {
			match key.as_ref() {
				"code" => code = Some(value.into_owned()),
				"state" => state = Some(value.into_owned()),
				"error" => error = Some(value.into_owned()),
				"error_description" => description = Some(value.into_owned()),
				_ => {},
			}
		}

		self.validate_state(state.as_deref().unwrap_or_default())?;

		if let Some(error) = error {
			return Err(CallbackError::Denied { error, description });
		}

		code.filter(|code| !code.is_empty()).ok_or(CallbackError::MissingCode)
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("scopes", &self.scopes)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
