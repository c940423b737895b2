//! Demonstrates plugging a closure in as the network transport and signing an API call.
//!
//! 1. Any `Fn(HttpRequest) -> impl Future<Output = Result<HttpResponse, TransportError>>` is a
//!    [`NetworkTransport`](oauth2_auth_manager::http::NetworkTransport).
//! 2. The manager exchanges the code through it and installs the credentials.
//! 3. [`BearerSigner`] attaches the token to an outbound call sent through the same closure.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use oauth2_auth_manager::{
	backend::{ClientBackend, CodeGrant, ProviderEndpoints},
	error::TransportError,
	ext::BearerSigner,
	http::{HttpRequest, HttpResponse, NetworkTransport},
	manager::AuthorizationManager,
	oauth2::http::{StatusCode, header::AUTHORIZATION},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let transport: Arc<dyn NetworkTransport> = Arc::new(|request: HttpRequest| async move {
		let (status, body) = match request.uri().path() {
			"/api/token" => (
				StatusCode::OK,
				"{\"access_token\":\"mock-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			),
			_ if request.headers().contains_key(AUTHORIZATION) => (StatusCode::OK, "{\"id\":\"42\"}"),
			_ => (StatusCode::UNAUTHORIZED, "{}"),
		};
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = status;

		Ok::<_, TransportError>(response)
	});
	let endpoints = ProviderEndpoints::builder()
		.authorization_endpoint(Url::parse("https://accounts.example.com/authorize")?)
		.token_endpoint(Url::parse("https://accounts.example.com/api/token")?)
		.build()?;
	let manager =
		AuthorizationManager::builder(ClientBackend::new("demo-client", "demo-secret", endpoints))
			.shared_transport(transport.clone())
			.build();

	manager
		.authorize(CodeGrant::new(
			"demo-code",
			Url::parse("https://app.example.com/oauth/callback")?,
		))
		.await?;

	println!("Access token issued by the closure transport: {:?}.", manager.access_token());

	let signer = BearerSigner::with_shared_transport(manager, transport);
	let request = oauth2_auth_manager::oauth2::http::Request::builder()
		.uri("https://api.example.com/v1/me")
		.body(Vec::new())?;
	let response = signer.send(request).await?;

	println!("Signed call answered {}.", response.status());

	Ok(())
}
