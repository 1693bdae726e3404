use std::fmt::Debug;
use std::hash::Hash;

/// A value stored together with its fxhash fingerprint, so that writes
/// of an equal value can be told apart from real changes.
pub(crate) struct Hashed<T> {
	pub value: T,
	pub hash: u64,
}

impl<T: Hash> Hashed<T> {
	pub fn new(value: T) -> Self {
		let hash = fxhash::hash64(&value);
		Self { value, hash }
	}

	/// Stores `value` and reports whether the fingerprint moved.
	pub fn replace(&mut self, value: T) -> bool {
		let next = Hashed::new(value);
		let changed = next.hash != self.hash;
		*self = next;
		changed
	}
}

impl<T> Debug for Hashed<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.value.fmt(f)
	}
}
