//! Endpoint sets for the exchange backends and their validating builders.

// self
use crate::_prelude::*;

/// Errors raised while constructing or validating endpoint sets.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EndpointError {
	/// A required endpoint was never supplied to the builder.
	#[error("Missing {endpoint} endpoint.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		endpoint: &'static str,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Authorization and token endpoints of an OAuth 2.0 authorization server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint users are sent to.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
}
impl ProviderEndpoints {
	/// Creates a new builder.
	pub fn builder() -> ProviderEndpointsBuilder {
		ProviderEndpointsBuilder::default()
	}

	/// Re-checks the invariants enforced by the builder.
	pub fn validate(&self) -> Result<(), EndpointError> {
		validate_endpoint("authorization", &self.authorization)?;
		validate_endpoint("token", &self.token)?;

		Ok(())
	}
}

/// Builder for [`ProviderEndpoints`].
#[derive(Clone, Debug, Default)]
pub struct ProviderEndpointsBuilder {
	authorization: Option<Url>,
	token: Option<Url>,
}
impl ProviderEndpointsBuilder {
	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting endpoints.
	pub fn build(self) -> Result<ProviderEndpoints, EndpointError> {
		let endpoints = ProviderEndpoints {
			authorization: self
				.authorization
				.ok_or(EndpointError::MissingEndpoint { endpoint: "authorization" })?,
			token: self.token.ok_or(EndpointError::MissingEndpoint { endpoint: "token" })?,
		};

		endpoints.validate()?;

		Ok(endpoints)
	}
}

/// Endpoints used by the proxy backend.
///
/// The authorization endpoint belongs to the authorization server; the two token endpoints
/// belong to a trusted proxy that holds the client secret and forwards exchanges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoints {
	/// Authorization endpoint users are sent to.
	pub authorization: Url,
	/// Proxy URL that trades an authorization code for tokens.
	pub token: Url,
	/// Proxy URL that trades a refresh token for a new access token.
	pub token_refresh: Url,
}
impl ProxyEndpoints {
	/// Creates a new builder.
	pub fn builder() -> ProxyEndpointsBuilder {
		ProxyEndpointsBuilder::default()
	}

	/// Re-checks the invariants enforced by the builder.
	pub fn validate(&self) -> Result<(), EndpointError> {
		validate_endpoint("authorization", &self.authorization)?;
		validate_endpoint("proxy token", &self.token)?;
		validate_endpoint("proxy token refresh", &self.token_refresh)?;

		Ok(())
	}
}

/// Builder for [`ProxyEndpoints`].
#[derive(Clone, Debug, Default)]
pub struct ProxyEndpointsBuilder {
	authorization: Option<Url>,
	token: Option<Url>,
	token_refresh: Option<Url>,
}
impl ProxyEndpointsBuilder {
	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization = Some(url);

		self
	}

	/// Sets the proxy endpoint that exchanges authorization codes.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token = Some(url);

		self
	}

	/// Sets the proxy endpoint that refreshes tokens.
	pub fn token_refresh_endpoint(mut self, url: Url) -> Self {
		self.token_refresh = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting endpoints.
	pub fn build(self) -> Result<ProxyEndpoints, EndpointError> {
		let endpoints = ProxyEndpoints {
			authorization: self
				.authorization
				.ok_or(EndpointError::MissingEndpoint { endpoint: "authorization" })?,
			token: self.token.ok_or(EndpointError::MissingEndpoint { endpoint: "proxy token" })?,
			token_refresh: self
				.token_refresh
				.ok_or(EndpointError::MissingEndpoint { endpoint: "proxy token refresh" })?,
		};

		endpoints.validate()?;

		Ok(endpoints)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), EndpointError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(EndpointError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("URL fixture should parse.")
	}

	#[test]
	fn builder_requires_both_endpoints() {
		let err = ProviderEndpoints::builder()
			.authorization_endpoint(url("https://accounts.example.com/authorize"))
			.build()
			.expect_err("Token endpoint is required.");

		assert_eq!(err, EndpointError::MissingEndpoint { endpoint: "token" });
	}

	#[test]
	fn plain_http_is_rejected_off_loopback() {
		let err = ProviderEndpoints::builder()
			.authorization_endpoint(url("https://accounts.example.com/authorize"))
			.token_endpoint(url("http://accounts.example.com/api/token"))
			.build()
			.expect_err("Plain HTTP token endpoint must be rejected.");

		assert!(matches!(err, EndpointError::InsecureEndpoint { endpoint: "token", .. }));
	}

	#[test]
	fn loopback_proxies_may_use_plain_http() {
		let endpoints = ProxyEndpoints::builder()
			.authorization_endpoint(url("https://accounts.example.com/authorize"))
			.token_endpoint(url("http://localhost:8080/retrieve"))
			.token_refresh_endpoint(url("http://[::1]:8080/refresh"))
			.build()
			.expect("Loopback proxy endpoints should validate.");

		assert_eq!(endpoints.token_refresh.port(), Some(8080));
	}
}
