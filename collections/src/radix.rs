//! An arena-backed Patricia (radix) tree over fixed-width binary keys.
//!
//! Nodes live in a `slab::Slab` and reference each other by index, never by
//! raw pointer; this is the "arena + index handles" approach the design
//! notes call for so that parent pointers don't need unsafe aliasing.
//!
//! The tree is generic over the payload type `P` (a `Summable`, i.e.
//! something that behaves like a set with a cheap union) and over the key
//! width in 32-bit words, `WORDS`. `rpz` instantiates this with
//! `WORDS = 4` (128-bit IP keys) and `P = ZonePair`.

use slab::Slab;

/// A fixed-width binary key, stored most-significant word first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Key<const WORDS: usize>(pub [u32; WORDS]);

impl<const WORDS: usize> Key<WORDS> {
	pub const BITS: u32 = (WORDS * 32) as u32;

	pub const fn zero() -> Self {
		Self([0; WORDS])
	}

	/// The bit at position `i`, counting from the most significant bit of
	/// word 0.
	#[inline]
	pub fn bit(&self, i: u32) -> bool {
		debug_assert!(i < Self::BITS);

		let word = (i / 32) as usize;
		let off = 31 - (i % 32);

		(self.0[word] >> off) & 1 != 0
	}

	/// Zero every bit at or beyond `prefix`, restoring the invariant that a
	/// key carries no bits below its own prefix length.
	pub fn mask_to_prefix(&mut self, prefix: u32) {
		for i in 0..Self::BITS {
			if i >= prefix && self.bit(i) {
				self.clear_bit(i);
			}
		}
	}

	#[inline]
	fn clear_bit(&mut self, i: u32) {
		let word = (i / 32) as usize;
		let off = 31 - (i % 32);
		self.0[word] &= !(1u32 << off);
	}

	/// First bit at which `self` (truncated to `prefix`) and `other`
	/// (truncated to `other_prefix`) differ, bounded by
	/// `min(prefix, other_prefix)`. Returns that bound if no difference is
	/// found within it — i.e. one key is a prefix of the other.
	pub fn first_differing_bit(&self, prefix: u32, other: &Self, other_prefix: u32) -> u32 {
		let bound = prefix.min(other_prefix).min(Self::BITS);

		for i in 0..bound {
			if self.bit(i) != other.bit(i) {
				return i;
			}
		}

		bound
	}
}

/// A set-like payload a tree node can carry. The tree itself never
/// inspects which bits mean what; it only needs to union, intersect, and
/// trim (see `Bits64::trim`) payloads together.
pub trait Summable: Copy + PartialEq {
	const EMPTY: Self;

	fn union(self, other: Self) -> Self;
	fn intersection(self, other: Self) -> Self;
	fn is_empty(self) -> bool;

	/// Restrict `self` given that `hit` is the (non-empty) portion of a
	/// node's own payload that already matched the request. For a
	/// precedence-ordered bit vector this drops lower-precedence bits; for
	/// a payload with no such ordering this can simply return `self`.
	fn trim(self, hit: Self) -> Self;
}

struct Node<P, const WORDS: usize> {
	parent: Option<usize>,
	children: [Option<usize>; 2],
	key: Key<WORDS>,
	prefix: u32,
	/// This node's own contribution.
	pair: P,
	/// `pair | children[0].sum | children[1].sum`.
	sum: P,
}

/// Outcome of a `search`. `Found`/`AlreadyPresent` only arise in
/// create-mode; `Partial`/`NotFound` only arise when not creating (creating
/// always finds or makes an exact node).
pub enum Search {
	/// Exact node for `(key, prefix)`, freshly unioned with the requested
	/// payload (create-mode), or already satisfying the request
	/// (non-create mode; returned instead of `Partial` for an exact hit).
	Found(usize),
	/// Create-mode only: the requested bits were already present at the
	/// exact node — the caller is re-adding a trigger that already exists.
	AlreadyPresent(usize),
	/// Non-create only: the deepest ancestor whose own `pair` intersected
	/// the (possibly trimmed) request during descent.
	Partial(usize),
	NotFound,
}

pub struct PatriciaTree<P, const WORDS: usize> {
	arena: Slab<Node<P, WORDS>>,
	root: Option<usize>,
}

impl<P: Summable, const WORDS: usize> Default for PatriciaTree<P, WORDS> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: Summable, const WORDS: usize> PatriciaTree<P, WORDS> {
	pub fn new() -> Self {
		Self { arena: Slab::new(), root: None }
	}

	pub fn is_empty(&self) -> bool {
		self.root.is_none()
	}

	pub fn pair(&self, node: usize) -> P {
		self.arena[node].pair
	}

	pub fn sum(&self, node: usize) -> P {
		self.arena[node].sum
	}

	pub fn root_sum(&self) -> P {
		self.root.map_or(P::EMPTY, |r| self.arena[r].sum)
	}

	pub fn key_prefix(&self, node: usize) -> (Key<WORDS>, u32) {
		let n = &self.arena[node];
		(n.key, n.prefix)
	}

	fn alloc(&mut self, key: Key<WORDS>, prefix: u32, pair: P, parent: Option<usize>) -> usize {
		self.arena.insert(Node { parent, children: [None, None], key, prefix, pair, sum: pair })
	}

	fn link_child(&mut self, parent: usize, bit: bool, child: usize) {
		self.arena[parent].children[bit as usize] = Some(child);
		self.arena[child].parent = Some(parent);
	}

	/// Implements the six-step search/insert algorithm.
	pub fn search(&mut self, key: &Key<WORDS>, prefix: u32, mut requested: P, create: bool) -> Search {
		let Some(mut cur) = self.root else {
			if create {
				let idx = self.alloc(*key, prefix, requested, None);
				self.root = Some(idx);
				return Search::Found(idx);
			}

			return Search::NotFound;
		};

		let mut best_partial = None;

		loop {
			let node = &self.arena[cur];

			// Step 1: subtree holds nothing relevant.
			if !create && node.sum.intersection(requested).is_empty() {
				return Self::fallback(best_partial);
			}

			let dbit = key.first_differing_bit(prefix, &node.key, node.prefix);

			if dbit == prefix && dbit == node.prefix {
				// Step 3: exact hit.
				let already = node.pair.intersection(requested);

				if !already.is_empty() {
					return if create { Search::AlreadyPresent(cur) } else { Search::Found(cur) };
				}

				if create {
					self.union_pair(cur, requested);
					return Search::Found(cur);
				}

				return Self::fallback(best_partial);
			}

			if dbit == prefix {
				// Step 4: target is a (strict) ancestor of `cur`.
				if create {
					let idx = self.insert_parent_above(cur, *key, prefix, requested);
					return Search::Found(idx);
				}

				return Self::fallback(best_partial);
			}

			if dbit == node.prefix {
				// Step 5: target is a descendant of `cur`.
				let hit = node.pair.intersection(requested);

				if !hit.is_empty() {
					best_partial = Some(cur);
					requested = requested.trim(hit);
				}

				let bit = key.bit(dbit);

				match node.children[bit as usize] {
					Some(child) => {
						cur = child;
						continue;
					}
					None => {
						if create {
							let idx = self.alloc(*key, prefix, requested, None);
							self.link_child(cur, bit, idx);
							self.recompute_sum_to_root(cur);
							return Search::Found(idx);
						}

						return Self::fallback(best_partial);
					}
				}
			}

			// Step 6: `dbit` splits before reaching either prefix — fork.
			if create {
				let idx = self.fork(cur, *key, prefix, requested, dbit);
				return Search::Found(idx);
			}

			return Self::fallback(best_partial);
		}
	}

	fn fallback(best_partial: Option<usize>) -> Search {
		match best_partial {
			Some(n) => Search::Partial(n),
			None => Search::NotFound,
		}
	}

	/// The non-mutating subset of `search`: exact match or longest-prefix
	/// partial match, never allocating. Unlike `search`, this only needs
	/// `&self`, so callers can run it under a shared lock and get genuine
	/// concurrent lookups; `search(create=true)` remains the only path
	/// that touches the arena.
	pub fn find(&self, key: &Key<WORDS>, prefix: u32, mut requested: P) -> Search {
		let Some(mut cur) = self.root else {
			return Search::NotFound;
		};

		let mut best_partial = None;

		loop {
			let node = &self.arena[cur];

			if node.sum.intersection(requested).is_empty() {
				return Self::fallback(best_partial);
			}

			let dbit = key.first_differing_bit(prefix, &node.key, node.prefix);

			if dbit == prefix && dbit == node.prefix {
				let already = node.pair.intersection(requested);
				return if already.is_empty() { Self::fallback(best_partial) } else { Search::Found(cur) };
			}

			if dbit == prefix {
				// Target is an ancestor of `cur`; nothing to find without creating.
				return Self::fallback(best_partial);
			}

			if dbit == node.prefix {
				let hit = node.pair.intersection(requested);

				if !hit.is_empty() {
					best_partial = Some(cur);
					requested = requested.trim(hit);
				}

				match node.children[key.bit(dbit) as usize] {
					Some(child) => {
						cur = child;
						continue;
					}
					None => return Self::fallback(best_partial),
				}
			}

			return Self::fallback(best_partial);
		}
	}

	fn union_pair(&mut self, node: usize, bits: P) {
		self.arena[node].pair = self.arena[node].pair.union(bits);
		self.recompute_sum_to_root(node);
	}

	/// Overwrite `node`'s own payload with `new_pair` (the caller already
	/// computed the bits to keep — `Summable` has no generic complement
	/// operator), propagate the new `sum` to the root, then prune any node
	/// left holding nothing.
	pub fn clear_bits_and_prune(&mut self, node: usize, new_pair: P) {
		self.arena[node].pair = new_pair;
		self.recompute_sum_to_root(node);
		self.prune_from(node);
	}

	fn recompute_sum_to_root(&mut self, mut node: usize) {
		loop {
			let new_sum = {
				let n = &self.arena[node];
				let mut s = n.pair;

				for c in n.children.into_iter().flatten() {
					s = s.union(self.arena[c].sum);
				}

				s
			};

			let changed = self.arena[node].sum != new_sum;
			self.arena[node].sum = new_sum;

			if !changed {
				break;
			}

			match self.arena[node].parent {
				Some(p) => node = p,
				None => break,
			}
		}
	}

	/// Splice out any node on the path from `node` to the root that holds
	/// an empty `pair` and has at most one child. Two consecutive prunes
	/// can be required: pruning `node` can leave its former parent in the
	/// same trivial state.
	fn prune_from(&mut self, mut node: usize) {
		loop {
			let (pair_empty, children, parent) = {
				let n = &self.arena[node];
				(n.pair.is_empty(), n.children, n.parent)
			};

			if !pair_empty {
				break;
			}

			match (children[0], children[1]) {
				(None, None) => {
					self.arena.remove(node);

					match parent {
						Some(p) => {
							self.unlink(p, node);
							node = p;
							continue;
						}
						None => {
							self.root = None;
							break;
						}
					}
				}
				(Some(c), None) | (None, Some(c)) => {
					self.splice(node, c, parent);
					node = c;
					continue;
				}
				(Some(_), Some(_)) => break,
			}
		}
	}

	fn unlink(&mut self, parent: usize, child: usize) {
		for slot in self.arena[parent].children.iter_mut() {
			if *slot == Some(child) {
				*slot = None;
			}
		}
	}

	/// Remove `node`, promoting its single child `c` into `node`'s old
	/// slot under `parent` (or making `c` the new root).
	fn splice(&mut self, node: usize, c: usize, parent: Option<usize>) {
		self.arena[c].parent = parent;

		match parent {
			Some(p) => {
				for slot in self.arena[p].children.iter_mut() {
					if *slot == Some(node) {
						*slot = Some(c);
					}
				}
			}
			None => self.root = Some(c),
		}

		self.arena.remove(node);
	}

	/// Insert a new node carrying `(key, prefix, pair)` as the parent of
	/// `cur` (used when the target prefix strictly contains `cur`'s key).
	fn insert_parent_above(&mut self, cur: usize, key: Key<WORDS>, prefix: u32, pair: P) -> usize {
		let old_parent = self.arena[cur].parent;
		let bit = self.arena[cur].key.bit(prefix);

		let idx = self.alloc(key, prefix, pair, old_parent);
		self.arena[idx].children[bit as usize] = Some(cur);
		self.arena[cur].parent = Some(idx);

		match old_parent {
			Some(p) => {
				for slot in self.arena[p].children.iter_mut() {
					if *slot == Some(cur) {
						*slot = Some(idx);
					}
				}
			}
			None => self.root = Some(idx),
		}

		self.recompute_sum_to_root(idx);
		idx
	}

	/// Allocate a branch node at `dbit` holding `cur` and a fresh leaf for
	/// `(key, prefix, pair)` as its two children, replacing `cur` in its
	/// old parent's slot.
	fn fork(&mut self, cur: usize, key: Key<WORDS>, prefix: u32, pair: P, dbit: u32) -> usize {
		let old_parent = self.arena[cur].parent;

		let mut branch_key = self.arena[cur].key;
		branch_key.mask_to_prefix(dbit);

		let branch = self.alloc(branch_key, dbit, P::EMPTY, old_parent);
		let leaf = self.alloc(key, prefix, pair, Some(branch));

		let cur_bit = self.arena[cur].key.bit(dbit);
		let leaf_bit = key.bit(dbit);
		debug_assert!(cur_bit != leaf_bit);

		self.arena[branch].children[cur_bit as usize] = Some(cur);
		self.arena[branch].children[leaf_bit as usize] = Some(leaf);
		self.arena[cur].parent = Some(branch);

		match old_parent {
			Some(p) => {
				for slot in self.arena[p].children.iter_mut() {
					if *slot == Some(cur) {
						*slot = Some(branch);
					}
				}
			}
			None => self.root = Some(branch),
		}

		self.recompute_sum_to_root(branch);
		leaf
	}

	/// Depth-first walk over every node carrying a non-empty `pair`,
	/// yielding `(key, prefix, pair)`. Used by the reload protocol to copy
	/// another zone's triggers into a staging tree.
	pub fn iter(&self) -> impl Iterator<Item = (Key<WORDS>, u32, P)> + '_ {
		let mut stack: Vec<usize> = self.root.into_iter().collect();

		core::iter::from_fn(move || loop {
			let idx = stack.pop()?;
			let n = &self.arena[idx];

			for c in n.children.into_iter().flatten() {
				stack.push(c);
			}

			if !n.pair.is_empty() {
				return Some((n.key, n.prefix, n.pair));
			}
		})
	}

	/// Debug/test helper checking invariant I1 for every node:
	/// `sum == pair | child0.sum | child1.sum`.
	pub fn check_sum_invariant(&self) -> bool {
		self.arena.iter().all(|(_, n)| {
			let mut expect = n.pair;

			for c in n.children.into_iter().flatten() {
				expect = expect.union(self.arena[c].sum);
			}

			expect == n.sum
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	struct Set(u32);

	impl Summable for Set {
		const EMPTY: Self = Set(0);

		fn union(self, other: Self) -> Self {
			Set(self.0 | other.0)
		}

		fn intersection(self, other: Self) -> Self {
			Set(self.0 & other.0)
		}

		fn is_empty(self) -> bool {
			self.0 == 0
		}

		fn trim(self, _hit: Self) -> Self {
			self
		}
	}

	fn key32(v: u32) -> Key<1> {
		Key([v])
	}

	#[test]
	fn insert_and_exact_find() {
		let mut t: PatriciaTree<Set, 1> = PatriciaTree::new();

		let k = key32(0xC0000200); // 192.0.2.0
		match t.search(&k, 24, Set(0b1), true) {
			Search::Found(_) => {}
			_ => panic!("expected Found"),
		}

		match t.search(&k, 24, Set(0b1), false) {
			Search::Found(n) => assert_eq!(t.pair(n).0, 0b1),
			_ => panic!("expected exact hit"),
		}

		assert!(t.check_sum_invariant());
	}

	#[test]
	fn longest_prefix_match_prefers_deeper_node() {
		let mut t: PatriciaTree<Set, 1> = PatriciaTree::new();

		t.search(&key32(0x0A000000), 8, Set(0b10), true); // 10.0.0.0/8, zone 1
		t.search(&key32(0x0A000000), 16, Set(0b1), true); // 10.0.0.0/16, zone 0

		let addr = key32(0x0A000001); // 10.0.0.1, /32 effective lookup

		match t.search(&addr, 32, Set(0b11), false) {
			Search::Partial(n) => {
				let (_, prefix) = t.key_prefix(n);
				assert_eq!(prefix, 16);
			}
			_ => panic!("expected partial match"),
		}

		assert!(t.check_sum_invariant());
	}

	#[test]
	fn delete_prunes_empty_chain() {
		let mut t: PatriciaTree<Set, 1> = PatriciaTree::new();

		let a = key32(0x0A000000);
		let b = key32(0x0A800000);

		let Search::Found(na) = t.search(&a, 8, Set(0b1), true) else { panic!() };
		let Search::Found(_nb) = t.search(&b, 9, Set(0b10), true) else { panic!() };

		t.clear_bits_and_prune(na, Set::EMPTY);

		assert!(t.check_sum_invariant());
		assert!(!t.is_empty());
	}
}
