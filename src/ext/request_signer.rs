//! Bearer signing for outbound API calls.
//!
//! [`RequestSignerExt`] describes how a set of credentials is attached to a request without
//! constraining the HTTP client type. [`BearerSigner`] implements it for the crate's own
//! [`HttpRequest`] and drives the manager so every signed call carries a fresh token.

// crates.io
use oauth2::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::CredentialStore,
	backend::ExchangeBackend,
	http::{HttpRequest, HttpResponse, NetworkTransport},
	manager::AuthorizationManager,
	obs,
};

/// Describes how to attach installed credentials to an outbound request.
///
/// Generic over both the request and error types so implementers can target any client
/// builder while the manager stays free of those dependencies.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the request and injects authorization state derived from `credentials`.
	fn attach_token(&self, request: Request, credentials: &CredentialStore)
	-> Result<Request, Error>;
}

/// Signs [`HttpRequest`]s with `Authorization: Bearer <token>` and sends them.
///
/// Tokens come from [`AuthorizationManager::valid_access_token`], so a token within the
/// refresh margin is refreshed before the call. A `401 Unauthorized` answer triggers one
/// forced refresh and a single retry; the retry's response is returned whatever its status.
pub struct BearerSigner<B>
where
	B: ExchangeBackend,
{
	manager: AuthorizationManager<B>,
	transport: Arc<dyn NetworkTransport>,
}
impl<B> BearerSigner<B>
where
	B: ExchangeBackend,
{
	/// Creates a signer that sends API calls through `transport`.
	pub fn new(manager: AuthorizationManager<B>, transport: impl NetworkTransport) -> Self {
		Self::with_shared_transport(manager, Arc::new(transport))
	}

	/// Creates a signer that reuses a transport shared with the manager or other clients.
	pub fn with_shared_transport(
		manager: AuthorizationManager<B>,
		transport: Arc<dyn NetworkTransport>,
	) -> Self {
		Self { manager, transport }
	}

	/// Manager supplying the tokens.
	pub fn manager(&self) -> &AuthorizationManager<B> {
		&self.manager
	}

	/// Attaches a currently valid access token to `request`, refreshing first when due.
	pub async fn sign(&self, request: HttpRequest) -> Result<HttpRequest> {
		let credentials = self.valid_credentials().await?;

		self.attach_token(request, &credentials)
	}

	/// Signs and sends `request`, refreshing and retrying once on `401 Unauthorized`.
	///
	/// The refresh is skipped when the rejected token has already been replaced, e.g. by a
	/// concurrent call that saw its own `401`. A failed refresh is returned instead of the
	/// original `401` response.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		let retry = duplicate(&request);
		let credentials = self.valid_credentials().await?;
		let response =
			self.transport.execute(self.attach_token(request, &credentials)?).await?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return Ok(response);
		}

		if self.manager.access_token().as_deref() == credentials.access_token() {
			obs::debug_event("API call answered 401; refreshing before the single retry");
			self.manager.refresh_tokens(false).await?;
		} else {
			obs::debug_event("API call answered 401 with a replaced token; retrying");
		}

		let response = self.transport.execute(self.sign(retry).await?).await?;

		Ok(response)
	}

	async fn valid_credentials(&self) -> Result<CredentialStore> {
		self.manager.valid_access_token().await?;

		Ok(self.manager.credentials())
	}
}
impl<B> RequestSignerExt<HttpRequest, Error> for BearerSigner<B>
where
	B: ExchangeBackend,
{
	fn attach_token(
		&self,
		mut request: HttpRequest,
		credentials: &CredentialStore,
	) -> Result<HttpRequest> {
		let token = credentials.access_token().ok_or(Error::Deauthorized)?;
		let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
			Error::MalformedResponse {
				detail: "access token is not a valid header value".into(),
				status: None,
				body: None,
			}
		})?;

		value.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, value);

		Ok(request)
	}
}
impl<B> Clone for BearerSigner<B>
where
	B: ExchangeBackend,
{
	fn clone(&self) -> Self {
		Self { manager: self.manager.clone(), transport: self.transport.clone() }
	}
}
impl<B> Debug for BearerSigner<B>
where
	B: ExchangeBackend,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerSigner").field("manager", &self.manager).finish_non_exhaustive()
	}
}

// `http::Request` is not `Clone`; extensions are not carried over.
fn duplicate(request: &HttpRequest) -> HttpRequest {
	let mut copy = HttpRequest::new(request.body().clone());

	*copy.method_mut() = request.method().clone();
	*copy.uri_mut() = request.uri().clone();
	*copy.version_mut() = request.version();
	*copy.headers_mut() = request.headers().clone();

	copy
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::ScopeSet,
		backend::ClientBackend,
		http::form_post,
	};

	fn seeded_manager(
		token_transport: &RecordingTransport,
		expires_in: Duration,
	) -> AuthorizationManager<ClientBackend> {
		let credentials = CredentialStore::builder()
			.access_token("T1")
			.refresh_token("R1")
			.expires_in(expires_in)
			.scopes(ScopeSet::from_str("a b").expect("Scopes should parse."))
			.build()
			.expect("Credential fixture should build.");

		AuthorizationManager::builder(test_client_backend())
			.credentials(credentials)
			.transport(token_transport.clone())
			.build()
	}

	fn api_request() -> HttpRequest {
		let url = Url::parse("https://api.example.com/v1/me").expect("API URL fixture should parse.");

		form_post(&url, &[("fields", "id")]).expect("API request should build.")
	}

	#[tokio::test]
	async fn fresh_tokens_are_attached_without_refreshing() {
		let token_transport = RecordingTransport::json(500, "{}");
		let api = RecordingTransport::json(200, "{}");
		let signer = BearerSigner::new(seeded_manager(&token_transport, Duration::hours(1)), api.clone());
		let response = signer.send(api_request()).await.expect("Signed call should succeed.");

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(token_transport.calls(), 0);
		assert_eq!(
			api.last_request().and_then(|request| request.header("authorization").map(str::to_owned)),
			Some("Bearer T1".to_owned()),
		);
	}

	#[tokio::test]
	async fn expiring_tokens_are_refreshed_before_signing() {
		let token_transport = RecordingTransport::json(200, token_body("T2", None, "a b", 3600));
		let api = RecordingTransport::json(200, "{}");
		let signer =
			BearerSigner::new(seeded_manager(&token_transport, Duration::seconds(30)), api.clone());

		signer.send(api_request()).await.expect("Signed call should succeed.");

		assert_eq!(token_transport.calls(), 1);
		assert_eq!(
			api.last_request().and_then(|request| request.header("authorization").map(str::to_owned)),
			Some("Bearer T2".to_owned()),
		);
	}

	#[tokio::test]
	async fn unauthorized_answers_refresh_and_retry_once() {
		let token_transport = RecordingTransport::json(200, token_body("T2", None, "a b", 3600));
		let api = RecordingTransport::scripted([
			ScriptedReply::Json(401, "{}".into()),
			ScriptedReply::Json(200, "{}".into()),
		]);
		let signer = BearerSigner::new(seeded_manager(&token_transport, Duration::hours(1)), api.clone());
		let response = signer.send(api_request()).await.expect("Retried call should succeed.");
		let captured = api.captured();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(token_transport.calls(), 1);
		assert_eq!(captured.len(), 2);
		assert_eq!(captured[0].header("authorization"), Some("Bearer T1"));
		assert_eq!(captured[1].header("authorization"), Some("Bearer T2"));
		assert_eq!(captured[1].form().get("fields").map(String::as_str), Some("id"));
	}

	#[tokio::test]
	async fn a_second_unauthorized_answer_is_returned() {
		let token_transport = RecordingTransport::json(200, token_body("T2", None, "a b", 3600));
		let api = RecordingTransport::json(401, "{}");
		let signer = BearerSigner::new(seeded_manager(&token_transport, Duration::hours(1)), api.clone());
		let response = signer.send(api_request()).await.expect("Transport should answer.");

		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
		assert_eq!(api.calls(), 2);
		assert_eq!(token_transport.calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_unauthorized_answers_share_one_refresh() {
		let token_transport = RecordingTransport::json(200, token_body("T2", None, "a b", 3600));
		let api = RecordingTransport::scripted([
			ScriptedReply::Json(401, "{}".into()),
			ScriptedReply::Json(401, "{}".into()),
			ScriptedReply::Json(200, "{}".into()),
		])
		.with_yields(4);
		let signer = BearerSigner::new(seeded_manager(&token_transport, Duration::hours(1)), api.clone());
		let (first, second) = tokio::join!(signer.send(api_request()), signer.send(api_request()));

		assert_eq!(first.expect("First call should succeed.").status(), StatusCode::OK);
		assert_eq!(second.expect("Second call should succeed.").status(), StatusCode::OK);
		assert_eq!(token_transport.calls(), 1);

		let captured = api.captured();

		assert_eq!(captured.len(), 4);
		assert_eq!(captured[0].header("authorization"), Some("Bearer T1"));
		assert_eq!(captured[1].header("authorization"), Some("Bearer T1"));
		assert_eq!(captured[2].header("authorization"), Some("Bearer T2"));
		assert_eq!(captured[3].header("authorization"), Some("Bearer T2"));
	}

	#[test]
	fn attaching_without_credentials_fails() {
		let signer = BearerSigner::new(
			manager_with(test_client_backend(), &RecordingTransport::json(500, "{}")),
			RecordingTransport::json(200, "{}"),
		);
		let err = signer
			.attach_token(api_request(), &CredentialStore::default())
			.expect_err("Unauthorized credentials cannot sign.");

		assert!(matches!(err, Error::Deauthorized));
	}
}
