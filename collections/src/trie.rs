//! An arena-backed trie over label sequences.
//!
//! Generalizes the "radix trie over DNS labels" that `rpz`'s name summary
//! tree is built on. Labels are opaque, comparable, hashable keys; this
//! module has no notion of what a DNS label is beyond that.

use hashbrown::HashMap;
use slab::Slab;

struct TrieNode<L, D> {
	parent: Option<usize>,
	label: Option<L>,
	children: HashMap<L, usize, ahash::RandomState>,
	data: Option<D>,
}

/// A trie over sequences of labels, ordered root-to-leaf as given by the
/// caller (e.g. most-significant DNS label first).
pub struct Trie<L, D> {
	arena: Slab<TrieNode<L, D>>,
	root: usize,
}

impl<L: Eq + std::hash::Hash + Clone, D> Default for Trie<L, D> {
	fn default() -> Self {
		Self::new()
	}
}

impl<L: Eq + std::hash::Hash + Clone, D> Trie<L, D> {
	pub fn new() -> Self {
		let mut arena = Slab::new();
		let root = arena.insert(TrieNode { parent: None, label: None, children: HashMap::default(), data: None });
		Self { arena, root }
	}

	pub fn root(&self) -> usize {
		self.root
	}

	pub fn data(&self, node: usize) -> Option<&D> {
		self.arena[node].data.as_ref()
	}

	pub fn data_mut(&mut self, node: usize) -> &mut Option<D> {
		&mut self.arena[node].data
	}

	/// Walk `path` from the root, stopping at the deepest node that exists.
	/// Returns `(node, matched_len)`; `matched_len == path.len()` means the
	/// full path exists as a node (it may or may not carry `data`).
	pub fn walk(&self, path: &[L]) -> (usize, usize) {
		let mut cur = self.root;

		for (i, label) in path.iter().enumerate() {
			match self.arena[cur].children.get(label) {
				Some(&next) => cur = next,
				None => return (cur, i),
			}
		}

		(cur, path.len())
	}

	/// Insert (creating intermediate nodes as needed) the node for the
	/// full `path`, returning its index.
	pub fn insert(&mut self, path: &[L]) -> usize {
		let mut cur = self.root;

		for label in path {
			if let Some(&next) = self.arena[cur].children.get(label) {
				cur = next;
				continue;
			}

			let child = self.arena.insert(TrieNode {
				parent: Some(cur),
				label: Some(label.clone()),
				children: HashMap::default(),
				data: None,
			});

			self.arena[cur].children.insert(label.clone(), child);
			cur = child;
		}

		cur
	}

	/// Indices from `node` up to (and including) the root, nearest first.
	pub fn ancestors(&self, node: usize) -> Vec<usize> {
		let mut out = Vec::new();
		let mut cur = Some(node);

		while let Some(n) = cur {
			out.push(n);
			cur = self.arena[n].parent;
		}

		out
	}

	/// Remove `node` if it now carries no data and has no children,
	/// repeating for ancestors left in the same state (mirrors the CIDR
	/// tree's prune-on-delete).
	pub fn prune_if_empty(&mut self, node: usize, is_empty: impl Fn(&D) -> bool) {
		let mut cur = node;

		loop {
			if cur == self.root {
				break;
			}

			let empty = match &self.arena[cur].data {
				Some(d) => is_empty(d),
				None => true,
			};

			if !empty || !self.arena[cur].children.is_empty() {
				break;
			}

			let parent = self.arena[cur].parent.expect("non-root node has a parent");
			let label = self.arena[cur].label.clone().expect("non-root node has a label");

			self.arena[parent].children.remove(&label);
			self.arena.remove(cur);

			cur = parent;
		}
	}

	/// Depth-first iteration over every node carrying data, yielding the
	/// full root-to-node label path alongside it.
	pub fn iter(&self) -> impl Iterator<Item = (Vec<L>, &D)> + '_ {
		let mut stack: Vec<(usize, Vec<L>)> = vec![(self.root, Vec::new())];

		core::iter::from_fn(move || loop {
			let (idx, path) = stack.pop()?;
			let node = &self.arena[idx];

			for (label, &child) in node.children.iter() {
				let mut next = path.clone();
				next.push(label.clone());
				stack.push((child, next));
			}

			if let Some(data) = node.data.as_ref() {
				return Some((path, data));
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn walk_stops_at_first_missing_label() {
		let mut t: Trie<String, u32> = Trie::new();

		let path = vec!["com".to_string(), "example".to_string()];
		let node = t.insert(&path);
		*t.data_mut(node) = Some(1);

		let (found, len) = t.walk(&["com".to_string(), "example".to_string(), "www".to_string()]);
		assert_eq!(len, 2);
		assert_eq!(t.data(found), Some(&1));

		let (_, len2) = t.walk(&["com".to_string(), "other".to_string()]);
		assert_eq!(len2, 1);
	}

	#[test]
	fn prune_removes_empty_leaf_chain() {
		let mut t: Trie<String, u32> = Trie::new();

		let path = vec!["com".to_string(), "example".to_string()];
		let node = t.insert(&path);
		*t.data_mut(node) = Some(1);

		*t.data_mut(node) = None;
		t.prune_if_empty(node, |_| true);

		let (found, len) = t.walk(&path);
		assert_eq!(len, 0);
		assert_eq!(found, t.root());
	}
}
