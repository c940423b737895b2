//! Transport primitives for token exchanges and signed API calls.
//!
//! [`NetworkTransport`] is the manager's only dependency on an HTTP stack: a single
//! substitutable function from an [`HttpRequest`] to a future of [`HttpResponse`]. Any
//! `Fn(HttpRequest) -> impl Future<Output = Result<HttpResponse, TransportError>>` closure
//! implements it, so tests can answer token requests in-process while production code uses
//! [`ReqwestHttpClient`].

// crates.io
use oauth2::http::{
	HeaderValue, Method,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{_prelude::*, error::ConfigError, error::TransportError};

pub use oauth2::{HttpRequest, HttpResponse};

/// Boxed future returned by [`NetworkTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Executes HTTP requests on behalf of the manager and its backends.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared across
/// managers and the exchange futures that outlive individual callers.
pub trait NetworkTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with the raw response, whatever its status code.
	///
	/// Only failures that prevent a response from arriving are reported as errors; HTTP
	/// error statuses are returned as ordinary responses for the caller to classify.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<F, Fut> NetworkTransport for F
where
	F: 'static + Send + Sync + Fn(HttpRequest) -> Fut,
	Fut: 'static + Send + Future<Output = Result<HttpResponse, TransportError>>,
{
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(self(request))
	}
}

/// Builds a form-urlencoded `POST` request for a token endpoint.
pub fn form_post(url: &Url, params: &[(&str, &str)]) -> Result<HttpRequest, ConfigError> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(params).finish();
	let request = oauth2::http::Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
		.header(ACCEPT, HeaderValue::from_static("application/json"))
		.body(body.into_bytes())?;

	Ok(request)
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl NetworkTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request).map_err(TransportError::from)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
