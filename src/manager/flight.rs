//! The in-flight exchange handle and the code that settles it.

// std
use std::sync::Weak;
// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::CredentialStore,
	backend::ExchangeBackend,
	manager::Inner,
	obs::{self, FlowKind, FlowOutcome},
};

/// Exchange outcome shared by every caller attached to it.
pub(crate) type SharedExchange = Shared<BoxFuture<'static, Result<()>>>;

/// Mutable manager state, always accessed under the manager's lock.
pub(crate) struct State {
	pub(crate) credentials: Arc<CredentialStore>,
	pub(crate) in_flight: Option<InFlight>,
	/// Bumped by every deauthorize; exchanges launched under an older epoch are discarded.
	pub(crate) epoch: u64,
	next_id: u64,
}
impl State {
	pub(crate) fn new(credentials: CredentialStore) -> Self {
		Self { credentials: Arc::new(credentials), in_flight: None, epoch: 0, next_id: 0 }
	}
}

pub(crate) struct InFlight {
	id: u64,
	pub(crate) kind: FlowKind,
	pub(crate) future: SharedExchange,
}

/// Registers `exchange` as the in-flight exchange and returns the handle callers await.
///
/// Nothing runs until the first caller polls the handle. The future holds only a weak
/// reference to the manager so an abandoned handle cannot keep it alive.
pub(crate) fn launch<B, F>(
	inner: Weak<Inner<B>>,
	state: &mut State,
	kind: FlowKind,
	exchange: F,
) -> SharedExchange
where
	B: ExchangeBackend,
	F: 'static + Send + Future<Output = Result<CredentialStore>>,
{
	state.next_id += 1;

	let id = state.next_id;
	let epoch = state.epoch;
	let future = async move {
		let result = exchange.await;

		match inner.upgrade() {
			Some(inner) => inner.settle(id, epoch, kind, result),
			None => Err(Error::Deauthorized),
		}
	}
	.boxed()
	.shared();

	state.in_flight = Some(InFlight { id, kind, future: future.clone() });

	future
}

impl<B> Inner<B>
where
	B: ExchangeBackend,
{
	fn settle(
		&self,
		id: u64,
		epoch: u64,
		kind: FlowKind,
		result: Result<CredentialStore>,
	) -> Result<()> {
		let mut state = self.state.lock();

		if state.in_flight.as_ref().is_some_and(|in_flight| in_flight.id == id) {
			state.in_flight = None;
		}

		let result = if state.epoch != epoch {
			Err(Error::Deauthorized)
		} else {
			result.map(|credentials| state.credentials = Arc::new(credentials))
		};

		drop(state);

		match result {
			Ok(()) => {
				self.metrics.record_success();
				obs::record_flow_outcome(kind, FlowOutcome::Success);
				self.observers.notify();

				Ok(())
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(kind, FlowOutcome::Failure);

				Err(e)
			},
		}
	}
}
