//! Manager-level error types shared across backends, transports, and stores.
//!
//! Every error is `Clone` so a single exchange outcome can be handed to each caller attached
//! to it.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Snapshot store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts); safe to retry.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The authorization redirect could not be turned into a grant.
	#[error(transparent)]
	Callback(#[from] CallbackError),

	/// Token endpoint rejected the authorization code or refresh token.
	#[error("Token endpoint rejected the grant: {reason}.")]
	InvalidGrant {
		/// OAuth `error` code returned by the server.
		error: String,
		/// Human-readable reason preserved from the server response.
		reason: String,
		/// HTTP status code of the rejection.
		status: u16,
	},
	/// Token endpoint response could not be parsed into credentials.
	#[error("Token endpoint returned a malformed response: {detail}.")]
	MalformedResponse {
		/// What failed to parse, including the JSON path when known.
		detail: String,
		/// HTTP status code, when a response was received.
		status: Option<u16>,
		/// Truncated preview of the raw response body.
		body: Option<String>,
	},
	/// A refresh was requested but no refresh token is stored.
	#[error("No refresh token is available; authorize again.")]
	NoRefreshToken,
	/// Credentials were cleared while the exchange was in flight.
	#[error("Authorization was cleared while the exchange was in flight.")]
	Deauthorized,
}
impl Error {
	/// Returns `true` when retrying the same call may succeed without user action.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transport(_))
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// Endpoint configuration is invalid.
	#[error(transparent)]
	Endpoint(#[from] crate::backend::EndpointError),
	/// Scopes cannot be normalized.
	#[error("Scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// The client backend has no secret; re-supply it after restoring a redacted snapshot.
	#[error("Client secret is missing for the client backend.")]
	MissingClientSecret,
	/// A snapshot was produced by a different backend variant.
	#[error("Snapshot was produced by the {found} backend, expected {expected}.")]
	BackendMismatch {
		/// Backend the caller asked to restore.
		expected: crate::backend::BackendKind,
		/// Backend recorded in the snapshot.
		found: crate::backend::BackendKind,
	},
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}

/// Failures reading the query of an authorization redirect.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CallbackError {
	/// The returned `state` does not match the one sent on the authorize URL.
	#[error("Authorization state mismatch.")]
	StateMismatch,
	/// The redirect carried neither a `code` nor an `error`.
	#[error("Authorization redirect carried no code.")]
	MissingCode,
	/// The user or the authorization server declined the request.
	#[error("Authorization was denied: {error}.")]
	Denied {
		/// OAuth `error` code from the redirect query, e.g. `access_denied`.
		error: String,
		/// Optional `error_description` from the redirect query.
		description: Option<String>,
	},
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {context}.")]
	Network {
		/// What the request was for.
		context: &'static str,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying HTTP client gave up waiting.
	#[error("Request timed out while calling {context}.")]
	Timeout {
		/// What the request was for.
		context: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { context: "the remote endpoint", source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::Timeout { context: "the remote endpoint" }
		} else {
			Self::network(e)
		}
	}
}
