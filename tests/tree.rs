use std::cell::RefCell;
use std::rc::Rc;

use observer::{Error, Event, Order, Tree, CHILD, CHILD_REMOVED, COMMIT, INPUT};

fn recorder(tree: &Tree<u64>, node: observer::NodeId, events: &[&str]) -> Rc<RefCell<Vec<String>>> {
	let log = Rc::new(RefCell::new(Vec::new()));
	for event in events {
		let log = log.clone();
		tree.on(
			node,
			event,
			move |e: &Event| {
				log.borrow_mut().push(e.name.clone());
				Ok(())
			},
			Order::Push,
		)
		.unwrap();
	}
	log
}

#[test]
fn navigation() {
	let tree = Tree::new();
	let form = tree.create("form", 0u64);
	let address = tree.create("address", 0u64);
	let street = tree.create("street", 0u64);
	tree.adopt(form, address).unwrap();
	tree.adopt(address, street).unwrap();

	assert_eq!(tree.at(form, "address.street").unwrap(), Some(street));
	assert_eq!(tree.at(street, "$parent").unwrap(), Some(address));
	assert_eq!(tree.at(street, "$root.address").unwrap(), Some(address));
	assert_eq!(tree.at(street, "$self").unwrap(), Some(street));
	assert_eq!(tree.at(form, "").unwrap(), Some(form));
	assert_eq!(tree.at(form, "missing").unwrap(), None);
	assert_eq!(tree.at(form, "$parent").unwrap(), None);

	assert_eq!(tree.address(street).unwrap(), vec!["form", "address", "street"]);
	assert_eq!(tree.root(street).unwrap(), form);
	assert_eq!(tree.children(form).unwrap(), vec![address]);
}

#[test]
fn commit_only_on_change() {
	let tree = Tree::new();
	let node = tree.create("field", 1u64);
	let log = recorder(&tree, node, &[INPUT, COMMIT]);

	tree.input(node, 1).unwrap();
	tree.input(node, 2).unwrap();

	assert_eq!(*log.borrow(), vec![INPUT, INPUT, COMMIT]);
	assert_eq!(tree.value(node).unwrap(), 2);
}

#[test]
fn props_and_counts_emit_on_change() {
	let tree = Tree::new();
	let node = tree.create("field", 0u64);
	let log = recorder(&tree, node, &["prop:label", "count:blocking"]);

	tree.set_prop(node, "label", 1).unwrap();
	tree.set_prop(node, "label", 1).unwrap();
	tree.set_count(node, "blocking", 0).unwrap();
	tree.add_count(node, "blocking", 1).unwrap();
	assert_eq!(tree.remove_prop(node, "label").unwrap(), Some(1));
	assert_eq!(tree.remove_prop(node, "label").unwrap(), None);

	assert_eq!(
		*log.borrow(),
		vec!["prop:label", "count:blocking", "prop:label"]
	);
	assert_eq!(tree.count(node, "blocking").unwrap(), 1);
	assert_eq!(tree.count(node, "never").unwrap(), 0);
}

#[test]
fn counter_overflow_is_an_error() {
	let tree = Tree::new();
	let node = tree.create("field", 0u64);
	tree.set_count(node, "blocking", i64::MAX).unwrap();
	let log = recorder(&tree, node, &["count:blocking"]);

	assert_eq!(
		tree.add_count(node, "blocking", 1),
		Err(Error::CountOverflow {
			node,
			key: "blocking".into()
		})
	);
	assert_eq!(tree.count(node, "blocking").unwrap(), i64::MAX);
	assert!(log.borrow().is_empty());

	tree.add_count(node, "blocking", -1).unwrap();
	assert_eq!(tree.count(node, "blocking").unwrap(), i64::MAX - 1);
}

#[test]
fn receipts_remove_exactly_one_listener() {
	let tree = Tree::new();
	let node = tree.create("field", 0u64);
	let first = tree.on(node, COMMIT, |_| Ok(()), Order::Push).unwrap();
	tree.on(node, COMMIT, |_| Ok(()), Order::Push).unwrap();

	assert!(tree.off(node, first).unwrap());
	assert!(!tree.off(node, first).unwrap());
	assert_eq!(tree.listener_count(node, COMMIT).unwrap(), 1);
}

#[test]
fn adoption_moves_children() {
	let tree = Tree::new();
	let a = tree.create("a", 0u64);
	let b = tree.create("b", 0u64);
	let field = tree.create("field", 0u64);
	let log_a = recorder(&tree, a, &[CHILD, CHILD_REMOVED]);
	let log_b = recorder(&tree, b, &[CHILD, CHILD_REMOVED]);

	tree.adopt(a, field).unwrap();
	tree.adopt(b, field).unwrap();
	tree.detach(field).unwrap();

	assert_eq!(*log_a.borrow(), vec![CHILD, CHILD_REMOVED]);
	assert_eq!(*log_b.borrow(), vec![CHILD, CHILD_REMOVED]);
	assert_eq!(tree.parent(field).unwrap(), None);
	assert!(tree.children(b).unwrap().is_empty());
}

#[test]
fn no_adopting_an_ancestor() {
	let tree = Tree::new();
	let a = tree.create("a", 0u64);
	let b = tree.create("b", 0u64);
	tree.adopt(a, b).unwrap();

	assert_eq!(tree.adopt(b, a), Err(Error::Ancestor { parent: b, child: a }));
	assert_eq!(tree.adopt(a, a), Err(Error::Ancestor { parent: a, child: a }));
}

#[test]
fn all_listeners_run_and_first_error_wins() {
	let tree = Tree::new();
	let node = tree.create("field", 0u64);
	tree.on(node, COMMIT, |_| Err(Error::watcher("first")), Order::Push)
		.unwrap();
	tree.on(node, COMMIT, |_| Err(Error::watcher("second")), Order::Push)
		.unwrap();
	let log = recorder(&tree, node, &[COMMIT]);

	assert_eq!(tree.emit(node, COMMIT), Err(Error::watcher("first")));
	assert_eq!(*log.borrow(), vec![COMMIT]);
}
