// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use tokio::{sync::Semaphore, task::JoinSet};
// self
use oauth2_auth_manager::{
	_preludet::*,
	auth::{CredentialStore, ScopeSet},
	backend::{ClientBackend, CodeGrant},
	error::TransportError,
	http::{HttpRequest, NetworkTransport},
	manager::AuthorizationManager,
};

fn redirect_uri() -> Url {
	Url::parse("https://app.example.com/callback").expect("Redirect URI fixture should parse.")
}

fn seeded(expires_in: Duration) -> CredentialStore {
	CredentialStore::builder()
		.access_token("T0")
		.refresh_token("R0")
		.expires_in(expires_in)
		.scopes(ScopeSet::from_str("a b").expect("Scopes should parse."))
		.build()
		.expect("Credential fixture should build.")
}

fn seeded_manager(
	transport: &RecordingTransport,
	expires_in: Duration,
) -> AuthorizationManager<ClientBackend> {
	AuthorizationManager::builder(test_client_backend())
		.credentials(seeded(expires_in))
		.transport(transport.clone())
		.build()
}

#[tokio::test]
async fn authorize_installs_the_exchanged_token() {
	let transport = RecordingTransport::json(
		200,
		r#"{"access_token":"T1","token_type":"Bearer","scope":"a b","expires_in":3600}"#,
	);
	let manager = manager_with(test_client_backend(), &transport);

	assert!(!manager.is_authorized());

	manager
		.authorize(CodeGrant::new("abc123", redirect_uri()))
		.await
		.expect("Authorization should succeed.");

	assert!(manager.is_authorized());
	assert_eq!(manager.access_token().as_deref(), Some("T1"));
	assert!(manager.is_authorized_for(&ScopeSet::from_str("a").expect("Scopes should parse.")));
	assert!(!manager.is_exchanging());

	let credentials = manager.credentials();
	let remaining = credentials
		.expires_in_at(OffsetDateTime::now_utc())
		.expect("Exchanged credentials should carry an expiry.");

	assert!(remaining > Duration::minutes(59) && remaining <= Duration::hours(1));
	assert!(credentials.refresh_token.is_none());

	let form = transport.last_request().expect("A token request should be captured.").form();

	assert_eq!(form.get("grant_type").map(String::as_str), Some("authorization_code"));
	assert_eq!(form.get("code").map(String::as_str), Some("abc123"));
	assert_eq!(form.get("client_secret").map(String::as_str), Some(TEST_CLIENT_SECRET));
}

#[tokio::test]
async fn rejected_refresh_leaves_credentials_untouched() {
	let transport = RecordingTransport::json(400, r#"{"error":"invalid_grant"}"#);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let before = manager.credentials();
	let notified = Arc::new(AtomicUsize::new(0));
	let _subscription = {
		let notified = notified.clone();

		manager.subscribe(move || {
			notified.fetch_add(1, Ordering::SeqCst);
		})
	};
	let err = manager.refresh_tokens(false).await.expect_err("Refresh should be rejected.");

	match &err {
		Error::InvalidGrant { error, status, .. } => {
			assert_eq!(error, "invalid_grant");
			assert_eq!(*status, 400);
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert!(!err.is_retryable());
	assert_eq!(manager.credentials(), before);
	assert_eq!(notified.load(Ordering::SeqCst), 0);
	assert_eq!(manager.metrics().failures(), 1);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_exchange() {
	let transport =
		RecordingTransport::json(200, token_body("T1", Some("R1"), "a b", 3600)).with_yields(8);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let (first, second, third) = tokio::join!(
		manager.refresh_tokens(false),
		manager.refresh_tokens(false),
		manager.refresh_tokens(true),
	);

	first.expect("First refresh should succeed.");
	second.expect("Second refresh should succeed.");
	third.expect("Third refresh should succeed.");

	assert_eq!(transport.calls(), 1);
	assert_eq!(manager.access_token().as_deref(), Some("T1"));
	assert_eq!(manager.metrics().started(), 1);
	assert_eq!(manager.metrics().joined(), 2);
	assert_eq!(manager.metrics().successes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refreshes_from_many_threads_share_one_exchange() {
	const CALLERS: usize = 16;

	let recording = RecordingTransport::json(200, token_body("T1", Some("R1"), "a b", 3600));
	// Holds the token request until every caller has attached to it.
	let gate = Arc::new(Semaphore::new(0));
	let transport = {
		let recording = recording.clone();
		let gate = gate.clone();

		move |request: HttpRequest| {
			let recording = recording.clone();
			let gate = gate.clone();

			async move {
				let _permit = gate.acquire().await.map_err(TransportError::network)?;

				recording.execute(request).await
			}
		}
	};
	let manager = AuthorizationManager::builder(test_client_backend())
		.credentials(seeded(Duration::seconds(30)))
		.transport(transport)
		.build();
	let mut tasks = JoinSet::new();

	for i in 0..CALLERS {
		let manager = manager.clone();

		tasks.spawn(async move {
			if i % 2 == 0 {
				manager.valid_access_token().await
			} else {
				manager.refresh_tokens(false).await?;

				manager.access_token().ok_or(Error::Deauthorized)
			}
		});
	}

	tokio::time::timeout(std::time::Duration::from_secs(5), async {
		while manager.metrics().started() + manager.metrics().joined() < CALLERS as u64 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("Every caller should attach to the exchange.");

	gate.add_permits(CALLERS);

	let mut tokens = Vec::new();

	while let Some(joined) = tasks.join_next().await {
		let token = joined.expect("Caller task should not panic.");

		tokens.push(token.expect("Caller should get a token."));
	}

	assert_eq!(tokens.len(), CALLERS);
	assert!(tokens.iter().all(|token| token == "T1"));
	assert_eq!(recording.calls(), 1);
	assert_eq!(manager.metrics().started(), 1);
	assert_eq!(manager.metrics().joined(), (CALLERS - 1) as u64);
	assert!(!manager.is_exchanging());
}

#[tokio::test]
async fn out_of_range_expiry_fails_without_wedging_the_manager() {
	let transport = RecordingTransport::scripted([
		ScriptedReply::Json(
			200,
			r#"{"access_token":"T1","token_type":"Bearer","expires_in":9223372036854775807}"#.into(),
		),
		ScriptedReply::Json(200, token_body("T2", None, "a b", 3600)),
	]);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let before = manager.credentials();
	let err = manager.refresh_tokens(false).await.expect_err("Unrepresentable expiry should fail.");

	assert!(matches!(err, Error::MalformedResponse { status: Some(200), .. }));
	assert!(!manager.is_exchanging());
	assert_eq!(manager.credentials(), before);

	manager.refresh_tokens(false).await.expect("A later refresh should run its own exchange.");

	assert_eq!(transport.calls(), 2);
	assert_eq!(manager.access_token().as_deref(), Some("T2"));
}

#[tokio::test]
async fn attached_callers_observe_the_same_failure() {
	let transport = RecordingTransport::json(
		400,
		r#"{"error":"invalid_grant","error_description":"revoked"}"#,
	)
	.with_yields(8);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let (first, second) =
		tokio::join!(manager.refresh_tokens(false), manager.refresh_tokens(false));
	let first = first.expect_err("First refresh should fail.");
	let second = second.expect_err("Second refresh should fail.");

	assert_eq!(first.to_string(), second.to_string());
	assert!(first.to_string().contains("revoked"));
	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn fresh_tokens_skip_the_network() {
	let transport = RecordingTransport::json(200, token_body("T1", None, "a b", 3600));
	let manager = seeded_manager(&transport, Duration::hours(1));

	manager.refresh_tokens(true).await.expect("Fresh tokens should be kept.");

	assert_eq!(transport.calls(), 0);
	assert_eq!(manager.access_token().as_deref(), Some("T0"));
	assert_eq!(manager.metrics().skipped(), 1);

	manager.refresh_tokens(false).await.expect("Forced refresh should succeed.");

	assert_eq!(transport.calls(), 1);
	assert_eq!(manager.access_token().as_deref(), Some("T1"));
	assert_eq!(
		manager.credentials().refresh_token().map(|token| token.expose().to_owned()),
		Some("R0".to_owned()),
	);
}

#[tokio::test]
async fn tokens_inside_the_margin_are_refreshed_once() {
	let transport = RecordingTransport::json(200, token_body("T1", None, "a b", 3600));
	let manager = seeded_manager(&transport, Duration::seconds(60));

	manager.refresh_tokens(true).await.expect("Due tokens should be refreshed.");
	manager.refresh_tokens(true).await.expect("Refreshed tokens should be kept.");

	assert_eq!(transport.calls(), 1);
	assert_eq!(manager.refresh_margin(), Duration::seconds(120));
}

#[tokio::test]
async fn configured_margin_changes_the_refresh_decision() {
	let transport = RecordingTransport::json(200, token_body("T1", None, "a b", 3600));
	let manager = AuthorizationManager::builder(test_client_backend())
		.refresh_margin(Duration::seconds(10))
		.credentials(seeded(Duration::seconds(60)))
		.transport(transport.clone())
		.build();

	manager.refresh_tokens(true).await.expect("Tokens outside the margin should be kept.");

	assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn refreshing_without_a_refresh_token_fails_locally() {
	let transport = RecordingTransport::json(200, token_body("T1", None, "a b", 3600));
	let manager = manager_with(test_client_backend(), &transport);
	let err = manager.refresh_tokens(true).await.expect_err("Unauthorized refresh should fail.");

	assert!(matches!(err, Error::NoRefreshToken));
	assert_eq!(transport.calls(), 0);

	let err = manager.valid_access_token().await.expect_err("No token can be produced.");

	assert!(matches!(err, Error::NoRefreshToken));
}

#[tokio::test]
async fn valid_access_token_refreshes_when_due() {
	let transport = RecordingTransport::json(200, token_body("T1", None, "a b", 3600));
	let manager = seeded_manager(&transport, Duration::seconds(5));
	let token = manager.valid_access_token().await.expect("A token should be produced.");

	assert_eq!(token, "T1");
	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn authorize_waits_for_the_exchange_in_flight() {
	let transport = RecordingTransport::scripted([
		ScriptedReply::Json(200, token_body("T1", None, "a b", 3600)),
		ScriptedReply::Json(200, token_body("T2", Some("R2"), "a b", 3600)),
	])
	.with_yields(4);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let (refreshed, authorized) = tokio::join!(
		manager.refresh_tokens(false),
		manager.authorize(CodeGrant::new("abc123", redirect_uri())),
	);

	refreshed.expect("Refresh should succeed.");
	authorized.expect("Authorization should succeed.");

	let captured = transport.captured();

	assert_eq!(captured.len(), 2);
	assert_eq!(captured[0].form().get("grant_type").map(String::as_str), Some("refresh_token"));
	assert_eq!(
		captured[1].form().get("grant_type").map(String::as_str),
		Some("authorization_code"),
	);
	assert_eq!(manager.access_token().as_deref(), Some("T2"));
}

#[tokio::test]
async fn deauthorize_clears_credentials_and_notifies_every_time() {
	let transport = RecordingTransport::json(500, "{}");
	let manager = seeded_manager(&transport, Duration::hours(1));
	let notified = Arc::new(AtomicUsize::new(0));
	let subscription = {
		let notified = notified.clone();

		manager.subscribe(move || {
			notified.fetch_add(1, Ordering::SeqCst);
		})
	};

	manager.deauthorize();
	manager.deauthorize();

	assert!(!manager.is_authorized());
	assert_eq!(manager.access_token(), None);
	assert_eq!(manager.credentials(), CredentialStore::default());
	assert_eq!(notified.load(Ordering::SeqCst), 2);

	drop(subscription);
	manager.deauthorize();

	assert_eq!(notified.load(Ordering::SeqCst), 2);
	assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn every_install_notifies_once() {
	let transport = RecordingTransport::json(200, token_body("T1", Some("R1"), "a b", 3600));
	let manager = manager_with(test_client_backend(), &transport);
	let notified = Arc::new(AtomicUsize::new(0));
	let _subscription = {
		let notified = notified.clone();

		manager.subscribe(move || {
			notified.fetch_add(1, Ordering::SeqCst);
		})
	};

	manager
		.authorize(CodeGrant::new("abc123", redirect_uri()))
		.await
		.expect("Authorization should succeed.");

	assert_eq!(notified.load(Ordering::SeqCst), 1);

	manager.refresh_tokens(false).await.expect("Refresh should succeed.");

	assert_eq!(notified.load(Ordering::SeqCst), 2);

	manager.deauthorize();

	assert_eq!(notified.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn deauthorize_during_an_exchange_discards_its_result() {
	let transport =
		RecordingTransport::json(200, token_body("T1", Some("R1"), "a b", 3600)).with_yields(16);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let (refreshed, ()) = tokio::join!(manager.refresh_tokens(false), async {
		tokio::task::yield_now().await;
		manager.deauthorize();
	});
	let err = refreshed.expect_err("Superseded exchange should fail.");

	assert!(matches!(err, Error::Deauthorized));
	assert_eq!(transport.calls(), 1);
	assert_eq!(manager.access_token(), None);
	assert!(!manager.is_exchanging());
}

#[tokio::test]
async fn dropping_a_caller_keeps_the_exchange_alive_for_others() {
	let transport =
		RecordingTransport::json(200, token_body("T1", Some("R1"), "a b", 3600)).with_yields(8);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let abandoned = tokio::time::timeout(std::time::Duration::ZERO, manager.refresh_tokens(false));

	assert!(abandoned.await.is_err(), "Zero timeout should abandon the first caller.");
	assert!(manager.is_exchanging());

	manager.refresh_tokens(false).await.expect("Attached refresh should succeed.");

	assert_eq!(transport.calls(), 1);
	assert_eq!(manager.access_token().as_deref(), Some("T1"));
}

#[tokio::test]
async fn transport_failures_are_retryable_and_install_nothing() {
	let transport = RecordingTransport::scripted([ScriptedReply::Fail("connection reset")]);
	let manager = seeded_manager(&transport, Duration::seconds(30));
	let err = manager.refresh_tokens(false).await.expect_err("Transport failure should surface.");

	assert!(matches!(err, Error::Transport(_)));
	assert!(err.is_retryable());
	assert_eq!(manager.access_token().as_deref(), Some("T0"));
}

#[tokio::test]
async fn clones_share_state() {
	let transport = RecordingTransport::json(200, token_body("T1", None, "a b", 3600));
	let manager = manager_with(test_client_backend(), &transport);
	let clone = manager.clone();

	clone
		.authorize(CodeGrant::new("abc123", redirect_uri()))
		.await
		.expect("Authorization should succeed.");

	assert_eq!(manager.access_token().as_deref(), Some("T1"));
	assert_eq!(manager, clone);
}
