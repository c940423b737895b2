//! Walks through building an authorize URL for a PKCE client and completing it from the
//! redirect the user is sent back with.

// std
use std::collections::HashMap;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use oauth2_auth_manager::{
	auth::ScopeSet,
	backend::{PkceBackend, ProviderEndpoints},
	manager::{AuthorizationManager, AuthorizationRequest},
};

fn main() -> Result<()> {
	color_eyre::install()?;

	let endpoints = ProviderEndpoints::builder()
		.authorization_endpoint(Url::parse("https://accounts.example.com/authorize")?)
		.token_endpoint(Url::parse("https://accounts.example.com/api/token")?)
		.build()?;
	let manager = AuthorizationManager::new(PkceBackend::new("demo-client", endpoints));
	let session = manager.start_authorization(
		AuthorizationRequest::new(Url::parse("https://app.example.com/oauth/callback")?)
			.scopes(ScopeSet::new(["playlist-read-private", "user-read-email"])?),
	);

	println!("Send your user to {}.", &session.authorize_url);
	println!(
		"PKCE challenge ({:?}): {}.",
		session.code_challenge_method(),
		session.code_challenge()
	);

	let mut sessions = HashMap::new();

	sessions.insert(session.state.clone(), session.clone());

	// Simulate the redirect handler looking up the stored session by `state`.
	let redirect = Url::parse(&format!(
		"https://app.example.com/oauth/callback?code=demo-code&state={}",
		session.state
	))?;
	let returned_state = redirect
		.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.unwrap_or_default();

	match sessions.remove(&returned_state) {
		Some(stashed) => {
			let code = stashed.authorization_code(&redirect)?;

			println!("Received code `{code}`; pass the redirect to complete_authorization.");
		},
		None => eprintln!("State `{returned_state}` was not recognized."),
	}

	Ok(())
}
