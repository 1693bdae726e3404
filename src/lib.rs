pub mod macros;

mod addr;
mod r#async;
mod batch;
mod dependencies;
mod diff;
mod error;
mod hashed;
mod observer;
mod receipts;
mod tree;
mod watch;

pub use batch::{batch, in_batch};
pub use dependencies::{Dependencies, Events};
pub use diff::{diff, Diff};
pub use error::{Error, Result};
pub use observer::{is_killed, wrap, Ledger, Observer, Props};
pub use tree::{
	count_event, prop_event, Event, Listener, NodeId, Order, Receipt, Tree, CHILD, CHILD_REMOVED,
	COMMIT, INPUT,
};
