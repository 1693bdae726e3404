use crate::dependencies::Dependencies;

/// Subscription changes needed to move from one pass to the next.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
	pub add: Dependencies,
	pub remove: Dependencies,
}

impl Diff {
	pub fn is_empty(&self) -> bool {
		self.add.is_empty() && self.remove.is_empty()
	}
}

/// Pairs read in `current` but not in `previous` go to `add`, pairs read in
/// `previous` but not in `current` go to `remove`. Pairs read in both
/// passes appear in neither.
pub fn diff(previous: &Dependencies, current: &Dependencies) -> Diff {
	let mut result = Diff::default();

	for (node, event) in current.pairs() {
		if !previous.contains(node, event) {
			result.add.insert(node, event);
		}
	}

	for (node, event) in previous.pairs() {
		if !current.contains(node, event) {
			result.remove.insert(node, event);
		}
	}

	result
}
