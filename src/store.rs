//! Concurrency-safe holder for the session's current bearer credential.

// self
use crate::{
	_prelude::*,
	auth::{Credential, IssuedCredential},
};

#[derive(Debug, Default)]
struct Slot {
	current: Option<Credential>,
	generation: u64,
}

/// Last-writer-wins credential holder backed by a read/write lock.
///
/// Reads run concurrently; a write is visible to every read that starts after it returns. Each
/// [`set`](Self::set) bumps the generation counter, which survives [`clear`](Self::clear) so a
/// credential issued after a logout is never mistaken for one issued before it.
#[derive(Debug, Default)]
pub struct CredentialStore(RwLock<Slot>);
impl CredentialStore {
	/// Returns a copy of the current credential, if any.
	pub fn get(&self) -> Option<Credential> {
		self.0.read().current.clone()
	}

	/// Stamps and stores a freshly issued credential, returning the stored value.
	pub fn set(&self, issued: IssuedCredential) -> Credential {
		let mut slot = self.0.write();

		slot.generation += 1;

		let credential = Credential::stamp(issued, OffsetDateTime::now_utc(), slot.generation);

		slot.current = Some(credential.clone());

		credential
	}

	/// Drops the current credential.
	pub fn clear(&self) {
		self.0.write().current = None;
	}

	/// Returns the number of writes performed so far.
	pub fn generation(&self) -> u64 {
		self.0.read().generation
	}

	/// Returns the current credential if it is newer than the one identified by `generation`.
	///
	/// `None` stands for a request that was sent without any credential.
	pub fn newer_than(&self, generation: Option<u64>) -> Option<Credential> {
		let slot = self.0.read();
		let current = slot.current.as_ref()?;

		match generation {
			Some(seen) if current.generation <= seen => None,
			_ => Some(current.clone()),
		}
	}
}
