//! Token endpoint dispatch and response classification shared by every backend.

// crates.io
use oauth2::{
	TokenResponse,
	basic::{BasicErrorResponse, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{CredentialStore, ScopeSet, TokenSecret},
	http::{self, HttpResponse, NetworkTransport},
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// What a token request is for; decides which fields fall back to prior state.
#[derive(Clone, Copy, Debug)]
pub enum TokenRequestKind<'a> {
	/// Initial code exchange carrying the scopes the caller asked for.
	Authorize {
		/// Scopes requested on the authorize URL; empty when the caller asked for none.
		requested: &'a ScopeSet,
	},
	/// Renewal using the stored refresh token.
	Refresh {
		/// Refresh token sent with the request; kept when the server does not rotate it.
		refresh_token: &'a TokenSecret,
		/// Scopes granted so far; kept when the server omits `scope`.
		granted: &'a ScopeSet,
	},
}

/// Posts `params` to `url` and turns the response into a fresh [`CredentialStore`].
pub async fn request_credentials(
	transport: &dyn NetworkTransport,
	url: &Url,
	params: &[(&str, &str)],
	kind: TokenRequestKind<'_>,
) -> Result<CredentialStore> {
	let request = http::form_post(url, params)?;
	let response = transport.execute(request).await?;

	parse_token_response(&response, kind, OffsetDateTime::now_utc())
}

/// Classifies a token endpoint response.
///
/// Successful responses must carry `access_token`, `token_type`, and a positive
/// `expires_in`. Error statuses with an OAuth error body become [`Error::InvalidGrant`];
/// anything else that cannot be understood becomes [`Error::MalformedResponse`].
pub fn parse_token_response(
	response: &HttpResponse,
	kind: TokenRequestKind<'_>,
	issued_at: OffsetDateTime,
) -> Result<CredentialStore> {
	let status = response.status().as_u16();
	let body = response.body().as_slice();

	if !response.status().is_success() {
		return Err(classify_error_response(status, body));
	}

	let deserializer = &mut serde_json::Deserializer::from_slice(body);
	let token: BasicTokenResponse = serde_path_to_error::deserialize(deserializer)
		.map_err(|e| malformed(e.to_string(), status, body))?;
	let expires_in = token
		.expires_in()
		.ok_or_else(|| malformed("missing `expires_in`".into(), status, body))?
		.as_secs();
	let expires_in = i64::try_from(expires_in)
		.ok()
		.filter(|secs| *secs > 0)
		.ok_or_else(|| malformed(format!("`expires_in` must be positive, got {expires_in}"), status, body))?;
	let returned = token
		.scopes()
		.map(|scopes| {
			ScopeSet::new(scopes.iter().map(|scope| scope.as_str()).filter(|scope| !scope.is_empty()))
		})
		.transpose()
		.map_err(|e| malformed(format!("invalid `scope`: {e}"), status, body))?;
	let (scopes, refresh_token) = match kind {
		TokenRequestKind::Authorize { requested } => {
			let scopes = returned.unwrap_or_else(|| requested.clone());

			if !requested.is_empty() && !scopes.is_subset(requested) {
				return Err(malformed(
					format!("granted scopes `{scopes}` exceed the requested `{requested}`"),
					status,
					body,
				));
			}

			(scopes, token.refresh_token().map(|token| TokenSecret::new(token.secret().as_str())))
		},
		TokenRequestKind::Refresh { refresh_token, granted } => (
			returned.unwrap_or_else(|| granted.clone()),
			Some(
				token
					.refresh_token()
					.map(|token| TokenSecret::new(token.secret().as_str()))
					.unwrap_or_else(|| refresh_token.clone()),
			),
		),
	};

	CredentialStore::builder()
		.access_token(token.access_token().secret().as_str())
		.maybe_refresh_token(refresh_token)
		.issued_at(issued_at)
		.expires_in(Duration::seconds(expires_in))
		.scopes(scopes)
		.build()
		.map_err(|e| malformed(e.to_string(), status, body))
}

fn classify_error_response(status: u16, body: &[u8]) -> Error {
	match serde_json::from_slice::<BasicErrorResponse>(body) {
		Ok(response) => {
			let error = response.error().as_ref().to_owned();
			let reason = response.error_description().cloned().unwrap_or_else(|| error.clone());

			Error::InvalidGrant { error, reason, status }
		},
		Err(_) => malformed(format!("HTTP {status} without an OAuth error body"), status, body),
	}
}

fn malformed(detail: String, status: u16, body: &[u8]) -> Error {
	Error::MalformedResponse { detail, status: Some(status), body: preview(body) }
}

fn preview(body: &[u8]) -> Option<String> {
	if body.is_empty() {
		return None;
	}

	let text = String::from_utf8_lossy(body);

	if text.chars().count() <= BODY_PREVIEW_LIMIT {
		return Some(text.into_owned());
	}

	let mut buf = text.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	Some(buf)
}
