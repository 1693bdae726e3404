use std::cell::Cell;
use std::rc::Rc;

use observer::{is_killed, wrap, Error, Tree, COMMIT};


#[test]
fn kill_is_total() {
	mock::init_tracing();
	let tree = Tree::new();
	let form = tree.create("form", 0u64);
	let child = tree.create("child", 0u64);
	tree.adopt(form, child).unwrap();

	let w = wrap(&tree, form).unwrap();
	let calls = Rc::new(Cell::new(0));
	w.watch({
		let calls = calls.clone();
		move |w| {
			calls.set(calls.get() + 1);
			w.read_value()?;
			w.child("child")?.map(|c| c.read_prop("label")).transpose()
		}
	})
	.unwrap();
	assert_eq!(tree.listener_count(child, "prop:label").unwrap(), 1);

	let other = wrap(&tree, form).unwrap();
	other.watch(|w| w.read_value()).unwrap();

	w.kill().unwrap();

	assert!(is_killed(&w));
	assert_eq!(w.read_value(), Err(Error::Killed));
	assert!(matches!(w.props(), Err(Error::Killed)));
	assert!(matches!(w.child("child"), Err(Error::Killed)));
	assert_eq!(w.deps(), Err(Error::Killed));
	assert_eq!(w.kill(), Err(Error::Killed));

	tree.input(form, 1).unwrap();
	tree.set_prop(child, "label", 1).unwrap();
	assert_eq!(calls.get(), 1);
	assert_eq!(tree.listener_count(child, "prop:label").unwrap(), 0);
	assert_eq!(tree.listener_count(form, COMMIT).unwrap(), 1);

	assert!(!is_killed(&other));
	assert_eq!(other.read_value(), Ok(1));
}

#[test]
fn navigated_observers_share_liveness() {
	let tree = Tree::new();
	let form = tree.create("form", 0u64);
	let child = tree.create("child", 0u64);
	tree.adopt(form, child).unwrap();

	let w = wrap(&tree, form).unwrap();
	let nested = w.child("child").unwrap().unwrap();
	assert_eq!(nested.node(), child);
	assert_eq!(nested.parent().unwrap().map(|p| p.node()), Some(form));

	nested.kill().unwrap();
	assert!(is_killed(&w));
	assert!(is_killed(&nested));
	assert_eq!(w.read_value(), Err(Error::Killed));
}

#[test]
fn kill_from_inside_a_watcher() {
	let tree = Tree::new();
	let node = tree.create("field", 0u64);
	let w = wrap(&tree, node).unwrap();
	let calls = Rc::new(Cell::new(0));

	w.watch({
		let calls = calls.clone();
		move |w| {
			calls.set(calls.get() + 1);
			let value = w.read_value()?;
			if value == 2 {
				w.kill()?;
			}
			Ok(())
		}
	})
	.unwrap();

	tree.input(node, 1).unwrap();
	tree.input(node, 2).unwrap();
	tree.input(node, 3).unwrap();

	assert_eq!(calls.get(), 3);
	assert!(is_killed(&w));
	assert_eq!(tree.listener_count(node, COMMIT).unwrap(), 0);
}

#[test]
fn watch_after_kill_fails() {
	let tree = Tree::new();
	let node = tree.create("field", 0u64);
	let w = wrap(&tree, node).unwrap();
	w.kill().unwrap();

	assert_eq!(w.watch(|w| w.read_value()), Err(Error::Killed));
	assert_eq!(w.observe(), Err(Error::Killed));
}

#[test]
fn wrapping_an_unknown_node_fails() {
	let tree: Tree<u64> = Tree::new();
	tree.create("only", 0);

	let other = Tree::new();
	other.create("x", 0u64);
	let missing = other.create("y", 0u64);

	assert!(matches!(wrap(&tree, missing), Err(Error::UnknownNode(_))));
}
