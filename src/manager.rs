//! The authorization manager: installed credentials, single-flight exchanges, and the
//! persistence round-trip.
//!
//! One [`parking_lot::Mutex`] guards both the installed [`CredentialStore`] and the handle of
//! the exchange currently in flight. The first caller that needs an exchange creates a shared
//! future under that lock; every later refresh attaches to it instead of sending a second
//! request. The shared future owns what it needs, installs its result under the same lock,
//! clears the handle, and only then notifies observers, so dropping one caller never cancels
//! the exchange for the others.

mod flight;
mod metrics;
mod observer;
mod session;
mod snapshot;

pub use metrics::ExchangeMetrics;
pub use observer::Subscription;
pub use session::*;
pub use snapshot::ManagerSnapshot;

// self
use crate::{
	_prelude::*,
	auth::{CredentialStore, ScopeSet},
	backend::ExchangeBackend,
	error::ConfigError,
	http::NetworkTransport,
	manager::{
		flight::{InFlight, State},
		observer::Observers,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::SnapshotStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Refresh margin applied when none is configured.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::seconds(120);

/// Acquires, caches, refreshes, and shares credentials for one OAuth client.
///
/// Clones share the same state, so one manager can be handed to every task that signs
/// requests. Reads ([`access_token`](Self::access_token), [`is_authorized`](Self::is_authorized))
/// never suspend and return the previously installed token while an exchange is in flight.
pub struct AuthorizationManager<B>
where
	B: ExchangeBackend,
{
	inner: Arc<Inner<B>>,
}
impl<B> AuthorizationManager<B>
where
	B: ExchangeBackend,
{
	/// Starts configuring a manager around `backend`.
	pub fn builder(backend: B) -> AuthorizationManagerBuilder<B> {
		AuthorizationManagerBuilder {
			backend,
			transport: NoTransport,
			refresh_margin: DEFAULT_REFRESH_MARGIN,
			credentials: CredentialStore::default(),
		}
	}

	/// Backend configuration.
	pub fn backend(&self) -> &B {
		&self.inner.backend
	}

	/// How long before expiry a token is considered due for refresh.
	pub fn refresh_margin(&self) -> Duration {
		self.inner.refresh_margin
	}

	/// Exchange counters for this manager.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.inner.metrics
	}

	/// Returns `true` when a non-empty access token is installed.
	pub fn is_authorized(&self) -> bool {
		self.inner.state.lock().credentials.is_authorized()
	}

	/// Returns `true` when authorized and every scope in `scopes` was granted.
	pub fn is_authorized_for(&self, scopes: &ScopeSet) -> bool {
		self.inner.state.lock().credentials.is_authorized_for(scopes)
	}

	/// Installed access token, without any freshness check or network activity.
	pub fn access_token(&self) -> Option<String> {
		self.inner.state.lock().credentials.access_token().map(str::to_owned)
	}

	/// Copy of the installed credentials.
	pub fn credentials(&self) -> CredentialStore {
		CredentialStore::clone(&self.inner.state.lock().credentials)
	}

	/// Returns `true` while an exchange is in flight.
	pub fn is_exchanging(&self) -> bool {
		self.inner.state.lock().in_flight.is_some()
	}

	/// Builds an authorize URL for the user to visit.
	///
	/// The returned session carries a random `state` and, for PKCE backends, the verifier
	/// whose challenge is on the URL. Keep it until the redirect arrives.
	pub fn start_authorization(&self, request: AuthorizationRequest) -> AuthorizationSession {
		AuthorizationSession::build(self.backend(), request)
	}

	/// Validates the redirect against `session` and exchanges its code.
	pub async fn complete_authorization(
		&self,
		session: &AuthorizationSession,
		redirect: &Url,
	) -> Result<()> {
		let code = session.authorization_code(redirect)?;

		self.authorize(B::grant_for_session(session, code)).await
	}

	/// Exchanges an authorization code and installs the resulting credentials.
	///
	/// If another exchange is in flight, waits for it to settle and then runs this one; an
	/// authorization code cannot be satisfied by someone else's exchange.
	pub async fn authorize(&self, grant: B::Grant) -> Result<()> {
		const KIND: FlowKind = FlowKind::Authorize;

		let flight = loop {
			let pending = {
				let mut state = self.inner.state.lock();

				match state.in_flight.as_ref() {
					Some(in_flight) => in_flight.future.clone(),
					None => {
						let backend = self.inner.backend.clone();
						let transport = self.inner.transport.clone();
						let exchange =
							async move { backend.exchange(&grant, transport.as_ref()).await };

						break self.start_flight(&mut state, KIND, "authorize", exchange);
					},
				}
			};

			obs::debug_event("waiting for the exchange in flight before authorizing");

			let _ = pending.await;
		};

		flight.await
	}

	/// Refreshes the access token with the stored refresh token.
	///
	/// With `only_if_expired`, a token with more than the refresh margin left is kept and no
	/// request is sent. A call made while any exchange is in flight attaches to it and
	/// observes the same outcome. Fails with [`Error::NoRefreshToken`] when unauthorized or
	/// when no refresh token is stored.
	pub async fn refresh_tokens(&self, only_if_expired: bool) -> Result<()> {
		const KIND: FlowKind = FlowKind::Refresh;

		let flight = {
			let mut state = self.inner.state.lock();

			if only_if_expired
				&& state.credentials.is_authorized()
				&& !state
					.credentials
					.needs_refresh_at(OffsetDateTime::now_utc(), self.inner.refresh_margin)
			{
				self.inner.metrics.record_skipped();
				obs::record_flow_outcome(KIND, FlowOutcome::Skipped);

				return Ok(());
			}

			match state.in_flight.as_ref() {
				Some(in_flight) => {
					self.inner.metrics.record_joined();
					obs::record_flow_outcome(in_flight.kind, FlowOutcome::Joined);

					in_flight.future.clone()
				},
				None => {
					let Some(refresh_token) = state.credentials.refresh_token().cloned() else {
						obs::record_flow_outcome(KIND, FlowOutcome::Failure);

						return Err(Error::NoRefreshToken);
					};
					let granted = state.credentials.scopes.clone();
					let backend = self.inner.backend.clone();
					let transport = self.inner.transport.clone();
					let exchange = async move {
						backend.refresh(&refresh_token, &granted, transport.as_ref()).await
					};

					self.start_flight(&mut state, KIND, "refresh_tokens", exchange)
				},
			}
		};

		flight.await
	}

	/// Returns an access token that is valid for at least the refresh margin.
	///
	/// Refreshes first when the installed token is due.
	pub async fn valid_access_token(&self) -> Result<String> {
		self.refresh_tokens(true).await?;

		self.access_token().ok_or(Error::Deauthorized)
	}

	/// Clears the installed credentials and abandons any exchange in flight.
	///
	/// Callers attached to the abandoned exchange receive [`Error::Deauthorized`] and its
	/// result is discarded. Idempotent; observers are notified on every call.
	pub fn deauthorize(&self) {
		{
			let mut state = self.inner.state.lock();

			state.epoch += 1;
			state.in_flight = None;
			state.credentials = Arc::new(CredentialStore::default());
		}

		obs::debug_event("credentials cleared");
		self.inner.observers.notify();
	}

	/// Registers `observer` to run after every install (authorize, refresh, deauthorize).
	///
	/// Observers run on the task that completed the change, outside the manager's lock.
	pub fn subscribe<F>(&self, observer: F) -> Subscription
	where
		F: 'static + Send + Sync + Fn(),
	{
		self.inner.observers.subscribe(Arc::new(observer))
	}

	/// Captures the backend, credentials, and refresh margin.
	pub fn snapshot(&self) -> ManagerSnapshot<B> {
		ManagerSnapshot {
			backend_kind: B::KIND,
			backend: B::clone(&self.inner.backend),
			credentials: self.credentials(),
			refresh_margin: self.inner.refresh_margin,
		}
	}

	/// Rebuilds a manager from a snapshot.
	pub fn from_snapshot(
		snapshot: ManagerSnapshot<B>,
		transport: impl NetworkTransport,
	) -> Result<Self> {
		if snapshot.backend_kind != B::KIND {
			return Err(ConfigError::BackendMismatch {
				expected: B::KIND,
				found: snapshot.backend_kind,
			}
			.into());
		}

		snapshot.backend.validate()?;

		Ok(Self::builder(snapshot.backend)
			.refresh_margin(snapshot.refresh_margin)
			.credentials(snapshot.credentials)
			.transport(transport)
			.build())
	}

	/// Saves the current snapshot under `key`.
	///
	/// The snapshot includes the client secret of a [`ClientBackend`](crate::backend::ClientBackend);
	/// use [`persist_without_secrets`](Self::persist_without_secrets) when the store should not
	/// hold it.
	pub async fn persist(&self, store: &dyn SnapshotStore, key: &str) -> Result<()> {
		Self::save_snapshot(store, key, self.snapshot()).await
	}

	/// Saves the current snapshot under `key` with backend secrets stripped.
	///
	/// After restoring, re-supply the secret before the next exchange.
	pub async fn persist_without_secrets(&self, store: &dyn SnapshotStore, key: &str) -> Result<()> {
		Self::save_snapshot(store, key, self.snapshot().without_secrets()).await
	}

	/// Loads the snapshot stored under `key` and rebuilds a manager from it.
	///
	/// Returns `Ok(None)` when nothing is stored.
	pub async fn restore(
		store: &dyn SnapshotStore,
		key: &str,
		transport: impl NetworkTransport,
	) -> Result<Option<Self>> {
		let Some(value) = store.load(key).await? else {
			return Ok(None);
		};
		let snapshot = ManagerSnapshot::from_value(value)?;

		Self::from_snapshot(snapshot, transport).map(Some)
	}

	async fn save_snapshot(
		store: &dyn SnapshotStore,
		key: &str,
		snapshot: ManagerSnapshot<B>,
	) -> Result<()> {
		store.save(key, snapshot.to_value()?).await?;

		Ok(())
	}

	fn start_flight<F>(
		&self,
		state: &mut State,
		kind: FlowKind,
		stage: &'static str,
		exchange: F,
	) -> flight::SharedExchange
	where
		F: 'static + Send + Future<Output = Result<CredentialStore>>,
	{
		let span = FlowSpan::new(kind, stage);
		let future =
			flight::launch(Arc::downgrade(&self.inner), state, kind, span.instrument(exchange));

		self.inner.metrics.record_started();
		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		future
	}
}
#[cfg(feature = "reqwest")]
impl<B> AuthorizationManager<B>
where
	B: ExchangeBackend,
{
	/// Creates a manager that talks to the network through a default [`ReqwestHttpClient`].
	pub fn new(backend: B) -> Self {
		Self::builder(backend).build()
	}
}
impl<B> Clone for AuthorizationManager<B>
where
	B: ExchangeBackend,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<B> PartialEq for AuthorizationManager<B>
where
	B: ExchangeBackend,
{
	fn eq(&self, other: &Self) -> bool {
		if Arc::ptr_eq(&self.inner, &other.inner) {
			return true;
		}

		self.inner.backend == other.inner.backend
			&& self.inner.refresh_margin == other.inner.refresh_margin
			&& self.credentials() == other.credentials()
	}
}
impl<B> Debug for AuthorizationManager<B>
where
	B: ExchangeBackend,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.inner.state.lock();

		f.debug_struct("AuthorizationManager")
			.field("backend", &self.inner.backend)
			.field("credentials", &state.credentials)
			.field("refresh_margin", &self.inner.refresh_margin)
			.field("exchanging", &state.in_flight.is_some())
			.finish()
	}
}

/// Marker for a builder that has no transport yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTransport;

/// Builder for [`AuthorizationManager`].
///
/// A transport must be supplied with [`transport`](Self::transport) unless the `reqwest`
/// feature is enabled, in which case a default client is used.
#[derive(Debug)]
pub struct AuthorizationManagerBuilder<B, T = NoTransport> {
	backend: B,
	transport: T,
	refresh_margin: Duration,
	credentials: CredentialStore,
}
impl<B, T> AuthorizationManagerBuilder<B, T>
where
	B: ExchangeBackend,
{
	/// Sets how long before expiry a token is considered due; negative values count as zero.
	pub fn refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Seeds the manager with previously issued credentials.
	pub fn credentials(mut self, credentials: CredentialStore) -> Self {
		self.credentials = credentials;

		self
	}

	/// Sets the transport used for every exchange.
	pub fn transport(
		self,
		transport: impl NetworkTransport,
	) -> AuthorizationManagerBuilder<B, Arc<dyn NetworkTransport>> {
		self.shared_transport(Arc::new(transport))
	}

	/// Sets a transport shared with other managers or API clients.
	pub fn shared_transport(
		self,
		transport: Arc<dyn NetworkTransport>,
	) -> AuthorizationManagerBuilder<B, Arc<dyn NetworkTransport>> {
		AuthorizationManagerBuilder {
			backend: self.backend,
			transport,
			refresh_margin: self.refresh_margin,
			credentials: self.credentials,
		}
	}
}
impl<B> AuthorizationManagerBuilder<B, Arc<dyn NetworkTransport>>
where
	B: ExchangeBackend,
{
	/// Builds the manager.
	pub fn build(self) -> AuthorizationManager<B> {
		AuthorizationManager {
			inner: Arc::new(Inner {
				backend: Arc::new(self.backend),
				transport: self.transport,
				refresh_margin: self.refresh_margin,
				state: Mutex::new(State::new(self.credentials)),
				observers: Default::default(),
				metrics: Default::default(),
			}),
		}
	}
}
#[cfg(feature = "reqwest")]
impl<B> AuthorizationManagerBuilder<B, NoTransport>
where
	B: ExchangeBackend,
{
	/// Builds the manager with a default [`ReqwestHttpClient`].
	pub fn build(self) -> AuthorizationManager<B> {
		self.transport(ReqwestHttpClient::default()).build()
	}
}

pub(crate) struct Inner<B> {
	backend: Arc<B>,
	transport: Arc<dyn NetworkTransport>,
	refresh_margin: Duration,
	state: Mutex<State>,
	observers: Arc<Observers>,
	metrics: ExchangeMetrics,
}
