use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::batch::{self, Rerun};
use crate::dependencies::Dependencies;
use crate::diff::{diff, Diff};
use crate::observer::Observer;
use crate::receipts::WatchId;
use crate::tree::{Event, Order};
use crate::Result;

/// Bookkeeping of one `watch` call, shared by sync and async watchers.
pub(crate) struct Cycle<V> {
	pub(crate) id: WatchId,
	pub(crate) observer: Observer<V>,
	order: Order,
	previous: RefCell<Dependencies>,
}

impl<V> Cycle<V>
where
	V: Clone + Hash + 'static,
{
	pub fn new(observer: &Observer<V>, order: Order) -> Result<Self> {
		let id = observer.next_watch()?;
		Ok(Cycle {
			id,
			observer: observer.bind(id),
			order,
			previous: RefCell::new(Dependencies::new()),
		})
	}

	pub fn is_alive(&self) -> bool {
		self.observer.core.is_alive()
	}

	pub fn begin(&self) -> Result<()> {
		let core = self.observer.live()?;
		tracing::trace!(watch = ?self.id, "cycle started");
		core.begin_pass(self.id);
		Ok(())
	}

	/// Ends the pass started by [`Cycle::begin`]. On success the listeners
	/// are brought in line with what the block read and the block's value
	/// is handed back. A failed block keeps the previous listeners.
	/// Returns `Ok(None)` when the observer was killed during the pass.
	pub fn finish<R>(&self, result: Result<R>, rerun: &Rc<dyn Rerun>) -> Result<Option<R>> {
		if !self.is_alive() {
			tracing::trace!(watch = ?self.id, "observer killed during its own cycle");
			return result.map(|_| None);
		}

		let current = self.observer.core.end_pass(self.id);
		let value = result?;

		let changes = diff(&self.previous.borrow(), &current);
		self.apply(changes, rerun)?;
		*self.previous.borrow_mut() = current;

		Ok(Some(value))
	}

	fn apply(&self, changes: Diff, rerun: &Rc<dyn Rerun>) -> Result<()> {
		let core = &self.observer.core;

		for (node, event) in changes.remove.pairs() {
			let receipt = core.receipts.borrow_mut().take(self.id, node, event);
			let Some(receipt) = receipt else {
				tracing::error!(watch = ?self.id, %node, event, "no receipt to remove");
				debug_assert!(false, "no receipt for {event} on {node}");
				continue;
			};
			let removed = core.tree.off(node, receipt)?;
			if !removed {
				tracing::error!(watch = ?self.id, %node, event, ?receipt, "receipt had no listener");
			}
			debug_assert!(removed, "receipt for {event} on {node} had no listener");
			tracing::trace!(watch = ?self.id, %node, event, "unsubscribed");
		}

		for (node, event) in changes.add.pairs() {
			let task = rerun.clone();
			let receipt = core.tree.on(
				node,
				event,
				move |_: &Event| batch::schedule(task.clone()),
				self.order,
			)?;
			core.receipts.borrow_mut().insert(self.id, node, event, receipt);
			tracing::trace!(watch = ?self.id, %node, event, "subscribed");
		}

		Ok(())
	}
}

type Block<V, R> = Box<dyn Fn(&Observer<V>) -> Result<R>>;
type After<R> = Box<dyn Fn(&R)>;

pub(crate) struct Watcher<V, R> {
	cycle: Cycle<V>,
	block: Block<V, R>,
	after: Option<After<R>>,
	this: Weak<Watcher<V, R>>,
}

impl<V, R> Watcher<V, R>
where
	V: Clone + Hash + 'static,
	R: 'static,
{
	fn run(&self) -> Result<()> {
		let Some(this) = self.this.upgrade() else {
			return Ok(());
		};
		let rerun: Rc<dyn Rerun> = this;

		self.cycle.begin()?;
		let core = &self.cycle.observer.core;
		let result = core.within(self.cycle.id, || (self.block)(&self.cycle.observer));
		if let Some(value) = self.cycle.finish(result, &rerun)? {
			if let Some(after) = &self.after {
				after(&value);
			}
		}
		Ok(())
	}
}

impl<V, R> Rerun for Watcher<V, R>
where
	V: Clone + Hash + 'static,
	R: 'static,
{
	fn rerun(self: Rc<Self>) -> Result<()> {
		if !self.cycle.is_alive() {
			return Ok(());
		}
		self.run()
	}
}

impl<V> Observer<V>
where
	V: Clone + Hash + 'static,
{
	/// Runs `block` now, then again every time something it read changes.
	/// Each run re-discovers its dependencies from scratch. Errors of the
	/// first run are returned here; errors of later runs go to whoever
	/// emitted the triggering event.
	pub fn watch<R, F>(&self, block: F) -> Result<()>
	where
		F: Fn(&Observer<V>) -> Result<R> + 'static,
		R: 'static,
	{
		self.install(Box::new(block), None, Order::Push)
	}

	/// Like [`Observer::watch`], calling `after` with the value of every
	/// successful run. `order` decides whether this watcher's listeners go
	/// ahead of or behind listeners already on the same events.
	pub fn watch_with<R, F, A>(&self, block: F, after: A, order: Order) -> Result<()>
	where
		F: Fn(&Observer<V>) -> Result<R> + 'static,
		A: Fn(&R) + 'static,
		R: 'static,
	{
		self.install(Box::new(block), Some(Box::new(after)), order)
	}

	fn install<R: 'static>(
		&self,
		block: Block<V, R>,
		after: Option<After<R>>,
		order: Order,
	) -> Result<()> {
		let cycle = Cycle::new(self, order)?;
		let watcher = Rc::new_cyclic(|this| Watcher {
			cycle,
			block,
			after,
			this: this.clone(),
		});
		// Firings caused by the first run are handled once it has finished.
		batch::batch(|| watcher.run())
	}
}
