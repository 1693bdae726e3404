use std::collections::BTreeMap;

use crate::tree::{NodeId, Receipt};

/// Identifies one `watch` call on an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub(crate) u64);

/// Receipts of every listener an observer has installed, per watch cycle,
/// per node, per event. An entry exists exactly as long as its listener is
/// registered on the node.
#[derive(Default)]
pub(crate) struct Receipts {
	by_watch: BTreeMap<WatchId, BTreeMap<NodeId, BTreeMap<String, Receipt>>>,
}

impl Receipts {
	pub fn insert(&mut self, watch: WatchId, node: NodeId, event: &str, receipt: Receipt) {
		let previous = self
			.by_watch
			.entry(watch)
			.or_default()
			.entry(node)
			.or_default()
			.insert(event.to_owned(), receipt);
		debug_assert!(previous.is_none(), "duplicate subscription to {event} on {node}");
	}

	pub fn take(&mut self, watch: WatchId, node: NodeId, event: &str) -> Option<Receipt> {
		let nodes = self.by_watch.get_mut(&watch)?;
		let events = nodes.get_mut(&node)?;
		let receipt = events.remove(event);

		if events.is_empty() {
			nodes.remove(&node);
		}
		if nodes.is_empty() {
			self.by_watch.remove(&watch);
		}

		receipt
	}

	/// Empties the table, handing back every `(node, receipt)`.
	pub fn drain(&mut self) -> Vec<(NodeId, Receipt)> {
		std::mem::take(&mut self.by_watch)
			.into_values()
			.flat_map(|nodes| nodes.into_iter())
			.flat_map(|(node, events)| events.into_values().map(move |r| (node, r)))
			.collect()
	}

	pub fn pairs(&self) -> Vec<(NodeId, String)> {
		self.by_watch
			.values()
			.flat_map(|nodes| nodes.iter())
			.flat_map(|(node, events)| events.keys().map(move |e| (*node, e.clone())))
			.collect()
	}
}
