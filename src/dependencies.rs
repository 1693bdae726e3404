use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::tree::NodeId;

/// Event names read on one node, unique, in first-read order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Events {
	names: SmallVec<[String; 4]>,
}

impl Events {
	pub fn contains(&self, event: &str) -> bool {
		self.names.iter().any(|name| name == event)
	}

	/// Returns `false` when the event was already present.
	pub(crate) fn insert(&mut self, event: &str) -> bool {
		if self.contains(event) {
			return false;
		}
		self.names.push(event.to_owned());
		true
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.names.iter().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}
}

/// Which `(node, event)` pairs one observation pass read.
///
/// Reads are only recorded while the map is active; outside of a pass
/// [`Dependencies::add`] does nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
	active: bool,
	based_on: BTreeMap<NodeId, Events>,
}

impl Dependencies {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn add(&mut self, node: NodeId, event: &str) {
		if !self.active {
			return;
		}
		self.insert(node, event);
	}

	/// Records unconditionally. Used to build maps outside of a pass.
	pub(crate) fn insert(&mut self, node: NodeId, event: &str) {
		self.based_on.entry(node).or_default().insert(event);
	}

	/// Starts a pass: clears the map, switches recording on and returns
	/// what the map held before.
	pub fn observe(&mut self) -> Dependencies {
		let previous = std::mem::take(&mut self.based_on);
		self.active = true;
		Dependencies {
			active: false,
			based_on: previous,
		}
	}

	/// Ends a pass and returns a snapshot of everything it recorded.
	pub fn stop(&mut self) -> Dependencies {
		self.active = false;
		self.clone()
	}

	pub fn get(&self, node: NodeId) -> Option<&Events> {
		self.based_on.get(&node)
	}

	pub fn contains(&self, node: NodeId, event: &str) -> bool {
		self.get(node).is_some_and(|events| events.contains(event))
	}

	pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Events)> {
		self.based_on.iter().map(|(node, events)| (*node, events))
	}

	/// Every `(node, event)` pair.
	pub fn pairs(&self) -> impl Iterator<Item = (NodeId, &str)> {
		self.iter()
			.flat_map(|(node, events)| events.iter().map(move |event| (node, event)))
	}

	pub fn len(&self) -> usize {
		self.based_on.len()
	}

	pub fn is_empty(&self) -> bool {
		self.based_on.is_empty()
	}
}
