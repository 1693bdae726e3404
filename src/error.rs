use std::fmt::Display;

use thiserror::Error;

use crate::tree::NodeId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
	/// The observer (or one of the wrappers sharing its state) was killed.
	#[error("observer used after kill")]
	Killed,

	#[error("node {0} does not exist in this tree")]
	UnknownNode(NodeId),

	#[error("node {child} cannot be adopted by its own descendant {parent}")]
	Ancestor { parent: NodeId, child: NodeId },

	#[error("counter {key} on {node} would overflow")]
	CountOverflow { node: NodeId, key: String },

	/// A watcher block gave up.
	#[error("watcher failed: {0}")]
	Watcher(String),
}

impl Error {
	pub fn watcher(reason: impl Display) -> Self {
		Error::Watcher(reason.to_string())
	}
}
