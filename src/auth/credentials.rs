//! The credential record installed by the manager and its builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Errors produced by [`CredentialStoreBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialStoreBuilderError {
	/// Issued when no non-empty access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the relative expiry lands outside the representable time range.
	#[error("Expiry of {0} from the issued instant is out of range.")]
	ExpiryOutOfRange(Duration),
}

/// Access token, refresh token, expiry, and granted scopes held by a manager.
///
/// An empty or absent access token means the record is unauthorized; the remaining fields
/// are then kept for display only and never drive refresh decisions. Records are replaced
/// as a whole, never patched field by field.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStore {
	/// Access token secret; callers must avoid logging it.
	#[serde(default)]
	pub access_token: Option<TokenSecret>,
	/// Refresh token secret, if the server issued one.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant derived from the exchange's `expires_in`.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Normalized scopes granted to this record.
	#[serde(default)]
	pub scopes: ScopeSet,
}
impl CredentialStore {
	/// Returns a builder for records produced by token exchanges.
	pub fn builder() -> CredentialStoreBuilder {
		CredentialStoreBuilder::default()
	}

	/// Returns `true` when a non-empty access token is present.
	pub fn is_authorized(&self) -> bool {
		self.access_token().is_some()
	}

	/// Returns the access token when the record is authorized.
	pub fn access_token(&self) -> Option<&str> {
		self.access_token.as_ref().map(TokenSecret::expose).filter(|token| !token.is_empty())
	}

	/// Returns the refresh token, ignoring it when the record is unauthorized.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		if !self.is_authorized() {
			return None;
		}

		self.refresh_token.as_ref().filter(|token| !token.is_empty())
	}

	/// Time left before expiry at `instant`; negative once expired.
	pub fn expires_in_at(&self, instant: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expires_at| expires_at - instant)
	}

	/// Returns `true` when the access token should be renewed at `instant`.
	///
	/// A token is due once its remaining lifetime drops to `margin` or below. Records without
	/// an expiry are always due.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		match self.expires_in_at(instant) {
			Some(remaining) => remaining <= margin,
			None => true,
		}
	}

	/// Returns `true` when the record is authorized and was granted every scope in `scopes`.
	pub fn is_authorized_for(&self, scopes: &ScopeSet) -> bool {
		self.is_authorized() && scopes.is_subset(&self.scopes)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("scopes", &self.scopes)
			.finish()
	}
}

/// Builder for [`CredentialStore`].
#[derive(Clone, Debug, Default)]
pub struct CredentialStoreBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scopes: ScopeSet,
}
impl CredentialStoreBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Carries over an existing refresh token, if any.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Sets the instant `expires_in` is measured from; defaults to the current clock.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the granted scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Consumes the builder and produces a [`CredentialStore`].
	pub fn build(self) -> Result<CredentialStore, CredentialStoreBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(CredentialStoreBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => self
				.issued_at
				.unwrap_or_else(OffsetDateTime::now_utc)
				.checked_add(delta)
				.ok_or(CredentialStoreBuilderError::ExpiryOutOfRange(delta))?,
			(None, None) => return Err(CredentialStoreBuilderError::MissingExpiry),
		};

		Ok(CredentialStore {
			access_token: Some(access_token),
			refresh_token: self.refresh_token,
			expires_at: Some(expires_at),
			scopes: self.scopes,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn sample() -> CredentialStore {
		CredentialStore::builder()
			.access_token("T1")
			.refresh_token("R1")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(1))
			.scopes(ScopeSet::from_str("a b").expect("Scopes should parse."))
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn empty_records_are_unauthorized() {
		let empty = CredentialStore::default();
		let blank = CredentialStore { access_token: Some(TokenSecret::new("")), ..sample() };

		assert!(!empty.is_authorized());
		assert!(!blank.is_authorized());
		assert!(blank.refresh_token().is_none(), "Unauthorized records ignore refresh tokens.");
		assert!(sample().is_authorized());
	}

	#[test]
	fn refresh_is_due_within_margin() {
		let record = sample();
		let margin = Duration::minutes(2);

		assert!(!record.needs_refresh_at(macros::datetime!(2025-01-01 00:30 UTC), margin));
		assert!(record.needs_refresh_at(macros::datetime!(2025-01-01 00:58 UTC), margin));
		assert!(record.needs_refresh_at(macros::datetime!(2025-01-01 02:00 UTC), margin));
		assert!(
			CredentialStore { expires_at: None, ..record }
				.needs_refresh_at(macros::datetime!(2025-01-01 00:00 UTC), margin)
		);
	}

	#[test]
	fn builder_requires_token_and_expiry() {
		let missing_token = CredentialStore::builder().expires_in(Duration::hours(1)).build();
		let missing_expiry = CredentialStore::builder().access_token("T1").build();

		assert_eq!(missing_token, Err(CredentialStoreBuilderError::MissingAccessToken));
		assert_eq!(missing_expiry, Err(CredentialStoreBuilderError::MissingExpiry));
	}

	#[test]
	fn builder_rejects_unrepresentable_expiry() {
		let delta = Duration::seconds(i64::MAX);
		let built = CredentialStore::builder()
			.access_token("T1")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(delta)
			.build();

		assert_eq!(built, Err(CredentialStoreBuilderError::ExpiryOutOfRange(delta)));
	}

	#[test]
	fn json_uses_rfc3339_and_round_trips() {
		let record = sample();
		let json = serde_json::to_value(&record).expect("Record should serialize.");

		assert_eq!(json["expires_at"], "2025-01-01T01:00:00Z");
		assert_eq!(json["scopes"], serde_json::json!(["a", "b"]));

		let decoded: CredentialStore =
			serde_json::from_value(json).expect("Record should deserialize.");

		assert_eq!(decoded, record);
	}

	#[test]
	fn debug_redacts_tokens() {
		let rendered = format!("{:?}", sample());

		assert!(!rendered.contains("T1"));
		assert!(!rendered.contains("R1"));
		assert!(rendered.contains("<redacted>"));
	}

	#[test]
	fn scope_checks_require_authorization() {
		let wanted = ScopeSet::from_str("a").expect("Scopes should parse.");

		assert!(sample().is_authorized_for(&wanted));
		assert!(!CredentialStore::default().is_authorized_for(&ScopeSet::default()));
	}
}
