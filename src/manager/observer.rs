//! Payload-free change notifications with drop-to-unsubscribe handles.

// std
use std::sync::Weak;
// self
use crate::_prelude::*;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct Observers {
	entries: Mutex<ObserverEntries>,
}
impl Observers {
	pub(crate) fn subscribe(self: &Arc<Self>, callback: Callback) -> Subscription {
		let mut entries = self.entries.lock();
		let id = entries.next_id;

		entries.next_id += 1;
		entries.callbacks.insert(id, callback);

		Subscription { id, observers: Arc::downgrade(self) }
	}

	/// Calls every observer once. Must not be called with the manager state locked.
	pub(crate) fn notify(&self) {
		let callbacks = self.entries.lock().callbacks.values().cloned().collect::<Vec<_>>();

		for callback in callbacks {
			callback();
		}
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.entries.lock().callbacks.len()
	}
}

#[derive(Default)]
struct ObserverEntries {
	next_id: u64,
	callbacks: BTreeMap<u64, Callback>,
}

/// Keeps an observer registered; dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes the observer"]
pub struct Subscription {
	id: u64,
	observers: Weak<Observers>,
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(observers) = self.observers.upgrade() {
			observers.entries.lock().callbacks.remove(&self.id);
		}
	}
}
impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Subscription").field("id", &self.id).finish()
	}
}
