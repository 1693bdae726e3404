use std::future::Future;
use std::hash::Hash;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::batch::Rerun;
use crate::observer::Observer;
use crate::tree::Order;
use crate::watch::Cycle;
use crate::Result;

type AsyncBlock<V, R> = Box<dyn Fn(Observer<V>) -> LocalBoxFuture<'static, Result<R>>>;
type After<R> = Box<dyn Fn(&R)>;

/// Watcher whose block suspends. Recording stays on until the block's
/// future completes, so reads on both sides of an `.await` count.
pub(crate) struct AsyncWatcher<V, R> {
	cycle: Cycle<V>,
	block: AsyncBlock<V, R>,
	after: Option<After<R>>,
}

/// Wakes the future driving an async watcher. Only the watcher's listeners
/// hold it, so the channel closes once nothing is subscribed.
struct Trigger {
	tx: UnboundedSender<()>,
}

impl Rerun for Trigger {
	fn rerun(self: Rc<Self>) -> Result<()> {
		if self.tx.send(()).is_err() {
			tracing::trace!("async watcher is no longer driven");
		}
		Ok(())
	}
}

impl<V, R> AsyncWatcher<V, R>
where
	V: Clone + Hash + 'static,
	R: 'static,
{
	async fn run(&self, trigger: Rc<Trigger>) -> Result<()> {
		self.cycle.begin()?;
		let result = (self.block)(self.cycle.observer.clone()).await;

		let rerun: Rc<dyn Rerun> = trigger;
		if let Some(value) = self.cycle.finish(result, &rerun)? {
			if let Some(after) = &self.after {
				after(&value);
			}
		}
		Ok(())
	}

	/// Runs the first cycle, then one cycle per wake-up. Wake-ups that
	/// arrive during a cycle are folded into the next one.
	async fn drive(self) -> Result<()> {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let trigger = Rc::new(Trigger { tx });
		let weak = Rc::downgrade(&trigger);
		self.run(trigger).await?;

		while rx.recv().await.is_some() {
			while rx.try_recv().is_ok() {}

			let Some(trigger) = weak.upgrade().filter(|_| self.cycle.is_alive()) else {
				break;
			};
			if let Err(err) = self.run(trigger).await {
				tracing::error!(watch = ?self.cycle.id, %err, "async watcher failed");
			}
		}

		tracing::trace!(watch = ?self.cycle.id, "async watcher finished");
		Ok(())
	}
}

impl<V> Observer<V>
where
	V: Clone + Hash + 'static,
{
	/// Asynchronous [`Observer::watch`]. The returned future runs every
	/// cycle itself: the first one right away, then one per change, until
	/// the observer is killed or a pass leaves nothing to watch. It fails
	/// with the first run's error. Errors of later runs are logged.
	///
	/// Nothing is spawned. Poll the future wherever it fits, e.g. on a
	/// `LocalSet` or joined with other work.
	pub fn watch_async<R, F, Fut>(&self, block: F) -> impl Future<Output = Result<()>>
	where
		F: Fn(Observer<V>) -> Fut + 'static,
		Fut: Future<Output = Result<R>> + 'static,
		R: 'static,
	{
		self.install_async(Box::new(move |o| block(o).boxed_local()), None, Order::Push)
	}

	pub fn watch_async_with<R, F, Fut, A>(
		&self,
		block: F,
		after: A,
		order: Order,
	) -> impl Future<Output = Result<()>>
	where
		F: Fn(Observer<V>) -> Fut + 'static,
		Fut: Future<Output = Result<R>> + 'static,
		A: Fn(&R) + 'static,
		R: 'static,
	{
		self.install_async(
			Box::new(move |o| block(o).boxed_local()),
			Some(Box::new(after)),
			order,
		)
	}

	fn install_async<R: 'static>(
		&self,
		block: AsyncBlock<V, R>,
		after: Option<After<R>>,
		order: Order,
	) -> impl Future<Output = Result<()>> {
		let cycle = Cycle::new(self, order);
		async move {
			let watcher = AsyncWatcher {
				cycle: cycle?,
				block,
				after,
			};
			watcher.drive().await
		}
	}
}
