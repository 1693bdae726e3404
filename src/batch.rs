//! Re-run queue.
//!
//! A listener never re-runs its watcher in place. It queues the cycle and,
//! unless a batch or a flush is already in progress, drains the queue right
//! away. Nested firings therefore extend the running loop instead of the
//! call stack.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use crate::addr::RcAddr;
use crate::Result;

/// One queued unit of work: the next cycle of a watcher.
pub(crate) trait Rerun {
	fn rerun(self: Rc<Self>) -> Result<()>;
}

#[derive(Default)]
struct Queue {
	order: VecDeque<Rc<dyn Rerun>>,
	pending: BTreeSet<RcAddr<dyn Rerun>>,
}

thread_local! {
	static STARTED: Cell<bool> = const { Cell::new(false) };
	static QUEUE: RefCell<Queue> = RefCell::new(Queue::default());
}

pub fn in_batch() -> bool {
	STARTED.with(|s| s.get())
}

/// Runs `func` with re-runs deferred. Every watcher whose dependencies
/// fired inside runs once when the outermost batch ends. The first error,
/// from `func` or from a re-run, is returned.
pub fn batch<R>(func: impl FnOnce() -> Result<R>) -> Result<R> {
	let Some(_root) = Started::claim() else {
		return func();
	};

	let result = func();
	let flushed = batch_run();
	let value = result?;
	flushed?;
	Ok(value)
}

/// Queues `task` and drains the queue unless someone up the stack will.
pub(crate) fn schedule(task: Rc<dyn Rerun>) -> Result<()> {
	QUEUE.with(|q| {
		let mut queue = q.borrow_mut();
		if queue.pending.insert(RcAddr::new(task.clone())) {
			queue.order.push_back(task);
		}
	});

	match Started::claim() {
		Some(_root) => batch_run(),
		None => Ok(()),
	}
}

/// Drains the queue, including work queued while draining. Keeps going
/// after a failure and returns the first one.
fn batch_run() -> Result<()> {
	let mut outcome = Ok(());
	loop {
		let next = QUEUE.with(|q| {
			let mut queue = q.borrow_mut();
			let task = queue.order.pop_front()?;
			queue.pending.remove(&RcAddr::new(task.clone()));
			Some(task)
		});

		let Some(task) = next else {
			break;
		};

		if let Err(err) = task.rerun() {
			if outcome.is_ok() {
				outcome = Err(err);
			} else {
				tracing::error!(%err, "watcher re-run failed");
			}
		}
	}
	outcome
}

/// Holds the batching flag. Dropping it (unwinding included) clears it.
struct Started;

impl Started {
	fn claim() -> Option<Started> {
		STARTED.with(|s| {
			if s.get() {
				None
			} else {
				s.set(true);
				Some(Started)
			}
		})
	}
}

impl Drop for Started {
	fn drop(&mut self) {
		STARTED.with(|s| s.set(false));
	}
}
