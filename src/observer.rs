//! Tracked access to the node tree.
//!
//! An [`Observer`] stands in for one node. Reading through it records which
//! `(node, event)` pairs the current pass depends on. Navigating to another
//! node yields a fresh `Observer` over that node which shares the same
//! observation state, so reads through it land in the same pass and a
//! single [`Observer::kill`] tears all of them down.
//!
//! Every watch pass records into a map of its own. The observer a watcher
//! block receives is bound to that pass, which keeps a suspended async pass
//! apart from the sync passes that run while it waits.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::hash::Hash;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::dependencies::Dependencies;
use crate::receipts::{Receipts, WatchId};
use crate::tree::{count_event, prop_event, NodeId, Tree, COMMIT};
use crate::{Error, Result};

thread_local! {
	static REVOKED: RefCell<FxHashSet<u64>> = RefCell::new(FxHashSet::default());
	static NEXT_OBSERVER: Cell<u64> = const { Cell::new(0) };
}

/// Observation state shared by an observer and every observer reached
/// through it.
pub(crate) struct Core<V> {
	id: u64,
	pub(crate) tree: Tree<V>,
	alive: Cell<bool>,
	/// Manual `observe` map, overwritten by every finished watch pass.
	deps: RefCell<Dependencies>,
	passes: RefCell<BTreeMap<WatchId, Dependencies>>,
	/// Sync pass in progress. Reads through unbound observers go there.
	current: Cell<Option<WatchId>>,
	pub(crate) receipts: RefCell<Receipts>,
	next_watch: Cell<u64>,
}

impl<V> Core<V> {
	pub(crate) fn is_alive(&self) -> bool {
		self.alive.get()
	}

	pub(crate) fn begin_pass(&self, pass: WatchId) {
		let mut deps = Dependencies::new();
		deps.observe();
		self.passes.borrow_mut().insert(pass, deps);
	}

	/// Ends `pass` and returns what it read.
	pub(crate) fn end_pass(&self, pass: WatchId) -> Dependencies {
		let mut current = self.passes.borrow_mut().remove(&pass).unwrap_or_default();
		current.stop();

		let mut last = self.deps.borrow_mut();
		if !last.is_active() {
			*last = current.clone();
		}
		current
	}

	/// Runs `func` with unbound reads going to `pass`.
	pub(crate) fn within<R>(&self, pass: WatchId, func: impl FnOnce() -> R) -> R {
		let outer = self.current.replace(Some(pass));
		let result = func();
		self.current.set(outer);
		result
	}
}

pub struct Observer<V> {
	pub(crate) core: Rc<Core<V>>,
	node: NodeId,
	pass: Option<WatchId>,
}

impl<V> Clone for Observer<V> {
	fn clone(&self) -> Self {
		Self {
			core: self.core.clone(),
			node: self.node,
			pass: self.pass,
		}
	}
}

/// Wraps `node` for tracked access.
pub fn wrap<V>(tree: &Tree<V>, node: NodeId) -> Result<Observer<V>>
where
	V: Clone + Hash + 'static,
{
	if !tree.contains(node) {
		return Err(Error::UnknownNode(node));
	}

	let id = NEXT_OBSERVER.with(|n| {
		let id = n.get();
		n.set(id + 1);
		id
	});

	Ok(Observer {
		core: Rc::new(Core {
			id,
			tree: tree.clone(),
			alive: Cell::new(true),
			deps: RefCell::new(Dependencies::new()),
			passes: RefCell::new(BTreeMap::new()),
			current: Cell::new(None),
			receipts: RefCell::new(Receipts::default()),
			next_watch: Cell::new(0),
		}),
		node,
		pass: None,
	})
}

/// Whether `observer` has been killed. Looks the observer up in the
/// revoked registry and never touches the observer itself.
pub fn is_killed<V>(observer: &Observer<V>) -> bool {
	REVOKED.with(|r| r.borrow().contains(&observer.core.id))
}

impl<V> Observer<V>
where
	V: Clone + Hash + 'static,
{
	pub(crate) fn live(&self) -> Result<&Core<V>> {
		if self.core.is_alive() {
			Ok(&self.core)
		} else {
			Err(Error::Killed)
		}
	}

	fn record(&self, event: &str) {
		match self.pass.or(self.core.current.get()) {
			Some(pass) => {
				if let Some(deps) = self.core.passes.borrow_mut().get_mut(&pass) {
					deps.add(self.node, event);
				}
			}
			None => self.core.deps.borrow_mut().add(self.node, event),
		}
	}

	fn spawn(&self, node: NodeId) -> Observer<V> {
		Observer {
			core: self.core.clone(),
			node,
			pass: self.pass,
		}
	}

	/// The same node, recording into `pass`.
	pub(crate) fn bind(&self, pass: WatchId) -> Observer<V> {
		Observer {
			pass: Some(pass),
			..self.clone()
		}
	}

	/// The wrapped node. Identity only, nothing is recorded.
	pub fn node(&self) -> NodeId {
		self.node
	}

	pub fn read_value(&self) -> Result<V> {
		let value = self.live()?.tree.value(self.node)?;
		self.record(COMMIT);
		Ok(value)
	}

	pub fn props(&self) -> Result<Props<'_, V>> {
		self.live()?;
		Ok(Props { observer: self })
	}

	pub fn read_prop(&self, key: &str) -> Result<Option<V>> {
		let value = self.live()?.tree.prop(self.node, key)?;
		self.record(&prop_event(key));
		Ok(value)
	}

	pub fn ledger(&self) -> Result<Ledger<'_, V>> {
		self.live()?;
		Ok(Ledger { observer: self })
	}

	pub fn read_count(&self, key: &str) -> Result<i64> {
		let count = self.live()?.tree.count(self.node, key)?;
		self.record(&count_event(key));
		Ok(count)
	}

	/// Depends on an arbitrary event of this node, e.g. `"child"`.
	pub fn track(&self, event: &str) -> Result<()> {
		self.live()?;
		self.record(event);
		Ok(())
	}

	pub fn child(&self, address: &str) -> Result<Option<Observer<V>>> {
		let found = self.live()?.tree.at(self.node, address)?;
		Ok(found.map(|node| self.spawn(node)))
	}

	pub fn parent(&self) -> Result<Option<Observer<V>>> {
		let parent = self.live()?.tree.parent(self.node)?;
		Ok(parent.map(|node| self.spawn(node)))
	}

	pub fn children(&self) -> Result<Vec<Observer<V>>> {
		let children = self.live()?.tree.children(self.node)?;
		Ok(children.into_iter().map(|node| self.spawn(node)).collect())
	}

	pub fn name(&self) -> Result<String> {
		self.live()?.tree.name(self.node)
	}

	pub fn address(&self) -> Result<Vec<String>> {
		self.live()?.tree.address(self.node)
	}

	/// Raw access to the tree. Nothing read inside `func` is recorded.
	pub fn untracked<R>(&self, func: impl FnOnce(&Tree<V>, NodeId) -> R) -> Result<R> {
		let core = self.live()?;
		Ok(func(&core.tree, self.node))
	}

	/// Snapshot of the dependency map. Inside a watcher block that is the
	/// pass in progress, elsewhere the last finished pass (or the manual
	/// [`Observer::observe`] map).
	pub fn deps(&self) -> Result<Dependencies> {
		let core = self.live()?;
		let pass = self.pass.or(core.current.get());
		if let Some(deps) = pass.and_then(|pass| core.passes.borrow().get(&pass).cloned()) {
			return Ok(deps);
		}
		Ok(core.deps.borrow().clone())
	}

	/// Clears the dependency map, starts recording, and returns what the
	/// map held before.
	pub fn observe(&self) -> Result<Dependencies> {
		Ok(self.live()?.deps.borrow_mut().observe())
	}

	/// Stops recording and returns what this pass recorded.
	pub fn stop_observe(&self) -> Result<Dependencies> {
		Ok(self.live()?.deps.borrow_mut().stop())
	}

	/// Every `(node, event)` subscription currently held on behalf of
	/// this observer, across all of its watch cycles.
	pub fn receipts(&self) -> Result<Vec<(NodeId, String)>> {
		Ok(self.live()?.receipts.borrow().pairs())
	}

	pub(crate) fn next_watch(&self) -> Result<WatchId> {
		let core = self.live()?;
		let id = core.next_watch.get();
		core.next_watch.set(id + 1);
		Ok(WatchId(id))
	}

	/// Removes every listener installed through this observer and
	/// invalidates it, together with every observer reached through it.
	pub fn kill(&self) -> Result<()> {
		let core = self.live()?;
		core.alive.set(false);
		core.deps.borrow_mut().stop();
		core.passes.borrow_mut().clear();
		core.current.set(None);

		let receipts = core.receipts.borrow_mut().drain();
		let count = receipts.len();
		for (node, receipt) in receipts {
			let removed = core.tree.off(node, receipt);
			if !matches!(removed, Ok(true)) {
				tracing::error!(%node, ?receipt, "receipt had no listener");
			}
			debug_assert!(matches!(removed, Ok(true)), "receipt on {node} had no listener");
		}

		REVOKED.with(|r| r.borrow_mut().insert(core.id));
		tracing::debug!(observer = core.id, released = count, "observer killed");
		Ok(())
	}
}

impl<V> std::fmt::Debug for Observer<V> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Observer")
			.field("node", &self.node)
			.field("alive", &self.core.is_alive())
			.finish()
	}
}

/// Tracked view of a node's property bag.
pub struct Props<'a, V> {
	observer: &'a Observer<V>,
}

impl<V> Props<'_, V>
where
	V: Clone + Hash + 'static,
{
	pub fn get(&self, key: &str) -> Result<Option<V>> {
		self.observer.read_prop(key)
	}
}

/// Tracked view of a node's ledger.
pub struct Ledger<'a, V> {
	observer: &'a Observer<V>,
}

impl<V> Ledger<'_, V>
where
	V: Clone + Hash + 'static,
{
	pub fn value(&self, key: &str) -> Result<i64> {
		self.observer.read_count(key)
	}
}
