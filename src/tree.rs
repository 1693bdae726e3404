//! In-memory node tree.
//!
//! Nodes live in an arena and are addressed by [`NodeId`] handles. Each node
//! holds a value, a property bag, a ledger of named counters and a list of
//! event listeners. Writes that do not change anything emit nothing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::rc::Rc;

use crate::hashed::Hashed;
use crate::{Error, Result};

/// Emitted when a node value changes.
pub const COMMIT: &str = "commit";
/// Emitted on every `input`, changed or not.
pub const INPUT: &str = "input";
/// Emitted on a parent when a child is adopted.
pub const CHILD: &str = "child";
/// Emitted on a former parent when a child is detached.
pub const CHILD_REMOVED: &str = "childRemoved";

pub fn prop_event(key: &str) -> String {
	format!("prop:{key}")
}

pub fn count_event(key: &str) -> String {
	format!("count:{key}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl Display for NodeId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Handle identifying exactly one listener on one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Receipt(u64);

/// Where a new listener goes relative to the ones already registered
/// for the same event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
	#[default]
	Push,
	Unshift,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
	pub origin: NodeId,
	pub name: String,
}

pub type Listener = Rc<dyn Fn(&Event) -> Result<()>>;

pub struct Tree<V> {
	inner: Rc<RefCell<Arena<V>>>,
}

impl<V> Clone for Tree<V> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<V> Default for Tree<V> {
	fn default() -> Self {
		Tree {
			inner: Rc::new(RefCell::new(Arena {
				nodes: Vec::new(),
				next_receipt: 0,
			})),
		}
	}
}

struct Arena<V> {
	nodes: Vec<NodeData<V>>,
	next_receipt: u64,
}

struct NodeData<V> {
	name: String,
	value: Hashed<V>,
	props: BTreeMap<String, Hashed<V>>,
	ledger: BTreeMap<String, i64>,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	listeners: Vec<Subscription>,
}

struct Subscription {
	receipt: Receipt,
	event: String,
	listener: Listener,
}

impl<V> Arena<V> {
	fn node(&self, id: NodeId) -> Result<&NodeData<V>> {
		self.nodes.get(id.0 as usize).ok_or(Error::UnknownNode(id))
	}

	fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData<V>> {
		self.nodes.get_mut(id.0 as usize).ok_or(Error::UnknownNode(id))
	}

	fn child_named(&self, id: NodeId, name: &str) -> Result<Option<NodeId>> {
		let node = self.node(id)?;
		for child in &node.children {
			if self.node(*child)?.name == name {
				return Ok(Some(*child));
			}
		}
		Ok(None)
	}

	fn root(&self, mut id: NodeId) -> Result<NodeId> {
		while let Some(parent) = self.node(id)?.parent {
			id = parent;
		}
		Ok(id)
	}

	/// Unlinks `child` from its parent and returns the former parent.
	fn unlink(&mut self, child: NodeId) -> Result<Option<NodeId>> {
		let Some(parent) = self.node_mut(child)?.parent.take() else {
			return Ok(None);
		};
		self.node_mut(parent)?.children.retain(|c| *c != child);
		Ok(Some(parent))
	}
}

impl<V> Tree<V>
where
	V: Clone + Hash + 'static,
{
	pub fn new() -> Self {
		Self::default()
	}

	pub fn create(&self, name: impl Into<String>, value: V) -> NodeId {
		let mut arena = self.inner.borrow_mut();
		let id = NodeId(arena.nodes.len() as u32);
		arena.nodes.push(NodeData {
			name: name.into(),
			value: Hashed::new(value),
			props: BTreeMap::new(),
			ledger: BTreeMap::new(),
			parent: None,
			children: Vec::new(),
			listeners: Vec::new(),
		});
		id
	}

	/// Checks that `id` belongs to this tree.
	pub fn contains(&self, id: NodeId) -> bool {
		self.inner.borrow().node(id).is_ok()
	}

	pub fn adopt(&self, parent: NodeId, child: NodeId) -> Result<()> {
		let former = {
			let mut arena = self.inner.borrow_mut();
			arena.node(child)?;
			let mut ancestor = Some(parent);
			while let Some(id) = ancestor {
				if id == child {
					return Err(Error::Ancestor { parent, child });
				}
				ancestor = arena.node(id)?.parent;
			}
			let former = arena.unlink(child)?;
			arena.node_mut(child)?.parent = Some(parent);
			arena.node_mut(parent)?.children.push(child);
			former
		};

		if let Some(former) = former {
			self.emit_from(former, CHILD_REMOVED, child)?;
		}
		self.emit_from(parent, CHILD, child)
	}

	pub fn detach(&self, child: NodeId) -> Result<()> {
		let former = self.inner.borrow_mut().unlink(child)?;
		match former {
			Some(former) => self.emit_from(former, CHILD_REMOVED, child),
			None => Ok(()),
		}
	}

	pub fn name(&self, id: NodeId) -> Result<String> {
		Ok(self.inner.borrow().node(id)?.name.clone())
	}

	pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
		Ok(self.inner.borrow().node(id)?.parent)
	}

	pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
		Ok(self.inner.borrow().node(id)?.children.clone())
	}

	pub fn root(&self, id: NodeId) -> Result<NodeId> {
		self.inner.borrow().root(id)
	}

	/// Names of every node from the root down to `id`.
	pub fn address(&self, id: NodeId) -> Result<Vec<String>> {
		let arena = self.inner.borrow();
		let mut names = Vec::new();
		let mut current = Some(id);
		while let Some(id) = current {
			let node = arena.node(id)?;
			names.push(node.name.clone());
			current = node.parent;
		}
		names.reverse();
		Ok(names)
	}

	/// Resolves a dot-separated path relative to `id`. Besides child names a
	/// segment may be `$parent`, `$root` or `$self`.
	pub fn at(&self, id: NodeId, address: &str) -> Result<Option<NodeId>> {
		let arena = self.inner.borrow();
		arena.node(id)?;

		let mut current = id;
		for segment in address.split('.').filter(|s| !s.is_empty()) {
			let next = match segment {
				"$self" => Some(current),
				"$parent" => arena.node(current)?.parent,
				"$root" => Some(arena.root(current)?),
				name => arena.child_named(current, name)?,
			};
			match next {
				Some(next) => current = next,
				None => return Ok(None),
			}
		}
		Ok(Some(current))
	}

	pub fn value(&self, id: NodeId) -> Result<V> {
		Ok(self.inner.borrow().node(id)?.value.value.clone())
	}

	pub fn input(&self, id: NodeId, value: V) -> Result<()> {
		let changed = self.inner.borrow_mut().node_mut(id)?.value.replace(value);
		let input = self.emit(id, INPUT);
		if changed {
			self.emit(id, COMMIT)?;
		}
		input
	}

	pub fn prop(&self, id: NodeId, key: &str) -> Result<Option<V>> {
		let arena = self.inner.borrow();
		Ok(arena.node(id)?.props.get(key).map(|p| p.value.clone()))
	}

	pub fn set_prop(&self, id: NodeId, key: &str, value: V) -> Result<()> {
		let changed = {
			let mut arena = self.inner.borrow_mut();
			let props = &mut arena.node_mut(id)?.props;
			match props.get_mut(key) {
				Some(current) => current.replace(value),
				None => {
					props.insert(key.to_owned(), Hashed::new(value));
					true
				}
			}
		};

		if changed {
			self.emit(id, &prop_event(key))?;
		}
		Ok(())
	}

	pub fn remove_prop(&self, id: NodeId, key: &str) -> Result<Option<V>> {
		let removed = self.inner.borrow_mut().node_mut(id)?.props.remove(key);
		match removed {
			Some(prop) => {
				self.emit(id, &prop_event(key))?;
				Ok(Some(prop.value))
			}
			None => Ok(None),
		}
	}

	/// Reads a ledger counter. Counters that were never set read as zero.
	pub fn count(&self, id: NodeId, key: &str) -> Result<i64> {
		let arena = self.inner.borrow();
		Ok(arena.node(id)?.ledger.get(key).copied().unwrap_or(0))
	}

	pub fn set_count(&self, id: NodeId, key: &str, count: i64) -> Result<()> {
		let previous = {
			let mut arena = self.inner.borrow_mut();
			let ledger = &mut arena.node_mut(id)?.ledger;
			ledger.insert(key.to_owned(), count).unwrap_or(0)
		};

		if previous != count {
			self.emit(id, &count_event(key))?;
		}
		Ok(())
	}

	pub fn add_count(&self, id: NodeId, key: &str, delta: i64) -> Result<()> {
		let current = self.count(id, key)?;
		let count = current.checked_add(delta).ok_or_else(|| Error::CountOverflow {
			node: id,
			key: key.to_owned(),
		})?;
		self.set_count(id, key, count)
	}

	pub fn on(
		&self,
		id: NodeId,
		event: &str,
		listener: impl Fn(&Event) -> Result<()> + 'static,
		order: Order,
	) -> Result<Receipt> {
		let mut arena = self.inner.borrow_mut();
		let receipt = Receipt(arena.next_receipt);
		let subscription = Subscription {
			receipt,
			event: event.to_owned(),
			listener: Rc::new(listener),
		};

		let listeners = &mut arena.node_mut(id)?.listeners;
		match order {
			Order::Push => listeners.push(subscription),
			Order::Unshift => listeners.insert(0, subscription),
		}
		arena.next_receipt += 1;

		Ok(receipt)
	}

	/// Removes one listener. Returns `false` when the receipt is not
	/// registered on this node.
	pub fn off(&self, id: NodeId, receipt: Receipt) -> Result<bool> {
		// Dropped outside the borrow: a listener may own observers of this tree.
		let removed = {
			let mut arena = self.inner.borrow_mut();
			let listeners = &mut arena.node_mut(id)?.listeners;
			listeners
				.iter()
				.position(|s| s.receipt == receipt)
				.map(|index| listeners.remove(index))
		};
		Ok(removed.is_some())
	}

	pub fn listener_count(&self, id: NodeId, event: &str) -> Result<usize> {
		let arena = self.inner.borrow();
		let node = arena.node(id)?;
		Ok(node.listeners.iter().filter(|s| s.event == event).count())
	}

	pub fn emit(&self, id: NodeId, event: &str) -> Result<()> {
		self.emit_from(id, event, id)
	}

	/// Calls every listener of `event` on `id`. The listener list is
	/// snapshotted first, so listeners are free to touch the tree. All
	/// listeners run; the first failure is returned.
	fn emit_from(&self, id: NodeId, event: &str, origin: NodeId) -> Result<()> {
		let listeners: Vec<Listener> = {
			let arena = self.inner.borrow();
			let node = arena.node(id)?;
			node.listeners
				.iter()
				.filter(|s| s.event == event)
				.map(|s| s.listener.clone())
				.collect()
		};

		let event = Event {
			origin,
			name: event.to_owned(),
		};

		let mut outcome = Ok(());
		for listener in listeners {
			if let Err(err) = listener(&event) {
				if outcome.is_ok() {
					outcome = Err(err);
				} else {
					tracing::error!(%err, event = %event.name, "listener failed");
				}
			}
		}
		outcome
	}
}

impl<V> Debug for Tree<V>
where
	V: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let arena = self.inner.borrow();
		f.debug_map()
			.entries(arena.nodes.iter().map(|n| (&n.name, &n.value)))
			.finish()
	}
}
