//! Client-side OAuth 2.0 authorization manager: acquire, cache, refresh, and share access
//! tokens across concurrent API calls through pluggable exchange backends and injectable
//! HTTP transports.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backend;
pub mod error;
pub mod ext;
pub mod http;
pub mod manager;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for unit and integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		task::{Context, Poll},
	};
	// self
	use crate::{
		backend::{ClientBackend, PkceBackend, ProviderEndpoints, ProxyBackend, ProxyEndpoints},
		error::TransportError,
		http::{HttpRequest, HttpResponse, NetworkTransport, TransportFuture},
		manager::AuthorizationManager,
	};

	/// Client identifier shared by the test fixtures.
	pub const TEST_CLIENT_ID: &str = "test-client-id";
	/// Client secret shared by the test fixtures.
	pub const TEST_CLIENT_SECRET: &str = "test-client-secret";

	/// A request captured by [`RecordingTransport`].
	#[derive(Clone, Debug)]
	pub struct CapturedRequest {
		/// HTTP method.
		pub method: String,
		/// Absolute request URL.
		pub url: String,
		/// Request headers as lowercase name/value pairs.
		pub headers: Vec<(String, String)>,
		/// Raw request body.
		pub body: Vec<u8>,
	}
	impl CapturedRequest {
		/// Decodes the form-urlencoded body into key/value pairs.
		pub fn form(&self) -> BTreeMap<String, String> {
			url::form_urlencoded::parse(&self.body).into_owned().collect()
		}

		/// Returns the first header value matching `name`.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers
				.iter()
				.find(|(key, _)| key.eq_ignore_ascii_case(name))
				.map(|(_, value)| value.as_str())
		}
	}

	/// Scripted reply for [`RecordingTransport`].
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// Respond with the status code and JSON body.
		Json(u16, String),
		/// Fail at the transport layer.
		Fail(&'static str),
	}

	/// Future that stays pending for a fixed number of polls, waking itself each time.
	///
	/// Keeps a scripted exchange in flight across executor turns without depending on a
	/// particular runtime's timer.
	#[derive(Debug)]
	pub struct YieldTimes(pub usize);
	impl Future for YieldTimes {
		type Output = ();

		fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
			if self.0 == 0 {
				return Poll::Ready(());
			}

			self.0 -= 1;
			cx.waker().wake_by_ref();

			Poll::Pending
		}
	}

	/// In-process [`NetworkTransport`] that records every request and answers from a script.
	///
	/// Replies are consumed in order; the last reply repeats once the script runs out. An
	/// optional yield count keeps exchanges in flight long enough for concurrency tests.
	#[derive(Clone)]
	pub struct RecordingTransport {
		replies: Arc<Mutex<Vec<ScriptedReply>>>,
		captured: Arc<Mutex<Vec<CapturedRequest>>>,
		calls: Arc<AtomicUsize>,
		yields: usize,
	}
	impl RecordingTransport {
		/// Answers every request with `status` and `body`.
		pub fn json(status: u16, body: impl Into<String>) -> Self {
			Self::scripted([ScriptedReply::Json(status, body.into())])
		}

		/// Answers requests with the provided replies in order.
		pub fn scripted(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
			let mut replies = replies.into_iter().collect::<Vec<_>>();

			replies.reverse();

			Self {
				replies: Arc::new(Mutex::new(replies)),
				captured: Default::default(),
				calls: Default::default(),
				yields: 0,
			}
		}

		/// Keeps every response pending for `yields` polls before resolving.
		pub fn with_yields(mut self, yields: usize) -> Self {
			self.yields = yields;

			self
		}

		/// Number of requests executed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Requests captured so far, oldest first.
		pub fn captured(&self) -> Vec<CapturedRequest> {
			self.captured.lock().clone()
		}

		/// Most recent captured request.
		pub fn last_request(&self) -> Option<CapturedRequest> {
			self.captured.lock().last().cloned()
		}

		fn next_reply(&self) -> ScriptedReply {
			let mut replies = self.replies.lock();

			if replies.len() > 1 {
				replies.pop().unwrap_or(ScriptedReply::Fail("script exhausted"))
			} else {
				replies.last().cloned().unwrap_or(ScriptedReply::Fail("script exhausted"))
			}
		}
	}
	impl NetworkTransport for RecordingTransport {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			let captured = CapturedRequest {
				method: request.method().to_string(),
				url: request.uri().to_string(),
				headers: request
					.headers()
					.iter()
					.map(|(name, value)| {
						(name.as_str().to_owned(), value.to_str().unwrap_or_default().to_owned())
					})
					.collect(),
				body: request.body().clone(),
			};

			self.captured.lock().push(captured);
			self.calls.fetch_add(1, Ordering::SeqCst);

			let reply = self.next_reply();
			let yields = self.yields;

			Box::pin(async move {
				YieldTimes(yields).await;

				match reply {
					ScriptedReply::Json(status, body) => {
						let mut response = HttpResponse::new(body.into_bytes());

						*response.status_mut() = oauth2::http::StatusCode::from_u16(status)
							.expect("Scripted status code should be valid.");
						response.headers_mut().insert(
							oauth2::http::header::CONTENT_TYPE,
							oauth2::http::HeaderValue::from_static("application/json"),
						);

						Ok(response)
					},
					ScriptedReply::Fail(message) =>
						Err(TransportError::network(std::io::Error::other(message))),
				}
			})
		}
	}

	/// Token response body in the shape every backend expects.
	pub fn token_body(access: &str, refresh: Option<&str>, scope: &str, expires_in: i64) -> String {
		let mut body = serde_json::json!({
			"access_token": access,
			"token_type": "Bearer",
			"scope": scope,
			"expires_in": expires_in,
		});

		if let Some(refresh) = refresh {
			body["refresh_token"] = serde_json::Value::from(refresh);
		}

		body.to_string()
	}

	/// Endpoints pointing at an unreachable HTTPS host; pair with [`RecordingTransport`].
	pub fn test_endpoints() -> ProviderEndpoints {
		ProviderEndpoints::builder()
			.authorization_endpoint(
				Url::parse("https://accounts.example.com/authorize")
					.expect("Authorization endpoint fixture should parse."),
			)
			.token_endpoint(
				Url::parse("https://accounts.example.com/api/token")
					.expect("Token endpoint fixture should parse."),
			)
			.build()
			.expect("Endpoint fixture should validate.")
	}

	/// Client backend built from the shared fixtures.
	pub fn test_client_backend() -> ClientBackend {
		ClientBackend::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET, test_endpoints())
	}

	/// PKCE backend built from the shared fixtures.
	pub fn test_pkce_backend() -> PkceBackend {
		PkceBackend::new(TEST_CLIENT_ID, test_endpoints())
	}

	/// Proxy backend pointing at loopback proxy endpoints.
	pub fn test_proxy_backend() -> ProxyBackend {
		let endpoints = ProxyEndpoints::builder()
			.authorization_endpoint(
				Url::parse("https://accounts.example.com/authorize")
					.expect("Authorization endpoint fixture should parse."),
			)
			.token_endpoint(
				Url::parse("http://127.0.0.1:7000/authorization-code/retrieve-tokens")
					.expect("Proxy token endpoint fixture should parse."),
			)
			.token_refresh_endpoint(
				Url::parse("http://127.0.0.1:7000/authorization-code/refresh-tokens")
					.expect("Proxy refresh endpoint fixture should parse."),
			)
			.build()
			.expect("Proxy endpoint fixture should validate.");

		ProxyBackend::new(TEST_CLIENT_ID, endpoints)
	}

	/// Builds a manager around `backend` that talks to `transport`.
	pub fn manager_with<B>(backend: B, transport: &RecordingTransport) -> AuthorizationManager<B>
	where
		B: crate::backend::ExchangeBackend,
	{
		AuthorizationManager::builder(backend).transport(transport.clone()).build()
	}

	/// Builds a reqwest transport for tests against `httpmock` servers.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.build()
			.expect("Failed to build Reqwest client for tests.");

		crate::http::ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, oauth2_auth_manager as _};
