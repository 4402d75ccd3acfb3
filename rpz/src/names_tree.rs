//! The name summary tree: maps DNS names to the zones that trigger on them,
//! either as exact QNAME/NSDNAME owners or as `*.owner` wildcards.

use collections::trie::Trie;

use crate::name::{Label, Name};
use crate::zone::{InsertOutcome, TriggerType, ZoneBits, ZoneNum, ZonePair};

#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct NameData {
	/// Set by an exact-owner trigger.
	pair: ZonePair,
	/// Set by a `*.owner` wildcard trigger; applies to strict subdomains
	/// of the node it's stored on, never to the node itself.
	wild: ZonePair,
}

impl NameData {
	fn is_empty(&self) -> bool {
		self.pair.is_empty() && self.wild.is_empty()
	}
}

pub struct NamesTree {
	trie: Trie<Label, NameData>,
}

impl Default for NamesTree {
	fn default() -> Self {
		Self::new()
	}
}

impl NamesTree {
	pub fn new() -> Self {
		Self { trie: Trie::new() }
	}

	/// `*.X` owners store only their `wild` field under `X`; everything
	/// else stores its `pair` field under the full name.
	fn split_owner(owner: &Name) -> (Name, bool) {
		match owner.strip_wildcard() {
			Some(rest) => (rest, true),
			None => (owner.clone(), false),
		}
	}

	pub fn insert(&mut self, owner: &Name, kind: TriggerType, zone: ZoneNum) -> InsertOutcome {
		let (target, is_wild) = Self::split_owner(owner);
		let node = self.trie.insert(&target.root_first());
		let bits = ZonePair::single(kind, zone);

		let data = self.trie.data_mut(node);

		if data.is_none() {
			*data = Some(if is_wild { NameData { pair: ZonePair::EMPTY, wild: bits } } else { NameData { pair: bits, wild: ZonePair::EMPTY } });
			return InsertOutcome::Inserted;
		}

		let d = data.as_mut().expect("checked above");
		let field = if is_wild { &mut d.wild } else { &mut d.pair };
		let already = field.intersection(bits);
		*field = field.union(bits);

		if already.is_empty() { InsertOutcome::Inserted } else { InsertOutcome::AlreadyPresent }
	}

	pub fn delete(&mut self, owner: &Name, kind: TriggerType, zone: ZoneNum) -> bool {
		let (target, is_wild) = Self::split_owner(owner);
		let path = target.root_first();
		let (node, matched) = self.trie.walk(&path);

		if matched != path.len() {
			return false;
		}

		let bits = ZonePair::single(kind, zone);

		let found = match self.trie.data_mut(node).as_mut() {
			Some(d) => {
				let field = if is_wild { &mut d.wild } else { &mut d.pair };
				let before = *field;
				*field = field.remove(bits);
				before != *field
			}
			None => false,
		};

		if found {
			self.trie.prune_if_empty(node, NameData::is_empty);
		}

		found
	}

	/// Longest-match lookup: the exact node's `pair` (if `name` itself was
	/// stored), OR-ed with every strict ancestor's `wild` field, masked to
	/// `eligible`.
	pub fn find(&self, name: &Name, kind: TriggerType, eligible: ZoneBits) -> ZoneBits {
		let path = name.root_first();
		let (node, matched) = self.trie.walk(&path);

		let mut acc = ZoneBits::EMPTY;
		let ancestors = self.trie.ancestors(node);

		let wild_ancestors: &[usize] = if matched == path.len() {
			if let Some(d) = self.trie.data(node) {
				acc = acc.union(d.pair.side(kind));
			}

			&ancestors[1..]
		} else {
			&ancestors[..]
		};

		for &anc in wild_ancestors {
			if let Some(d) = self.trie.data(anc) {
				acc = acc.union(d.wild.side(kind));
			}
		}

		acc.intersection(eligible)
	}

	/// Set `(pair, wild)` directly on the node for `name`, bypassing the
	/// wildcard-splitting and duplicate-trigger bookkeeping `insert` does.
	/// Used only to copy another zone's triggers forward into a fresh
	/// staging tree during a reload, where each source node is visited
	/// exactly once.
	pub fn insert_raw(&mut self, name: &Name, pair: ZonePair, wild: ZonePair) {
		let node = self.trie.insert(&name.root_first());
		*self.trie.data_mut(node) = Some(NameData { pair, wild });
	}

	pub fn iter(&self) -> impl Iterator<Item = (Name, ZonePair, ZonePair)> + '_ {
		self.trie.iter().map(|(path, d)| (Name::from_labels(path.into_iter().rev().collect()), d.pair, d.wild))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn z(n: u32) -> ZoneNum {
		ZoneNum::new(n).unwrap()
	}

	#[test]
	fn exact_match_does_not_apply_to_wildcard_sibling() {
		let mut t = NamesTree::new();
		t.insert(&Name::parse("evil.example."), TriggerType::Qname, z(0));

		let hit = t.find(&Name::parse("evil.example."), TriggerType::Qname, ZoneBits::ALL);
		assert!(hit.bit(0));
	}

	#[test]
	fn wildcard_covers_subdomains_but_not_itself() {
		let mut t = NamesTree::new();
		t.insert(&Name::parse("*.evil.example."), TriggerType::Qname, z(2));

		let sub = t.find(&Name::parse("www.evil.example."), TriggerType::Qname, ZoneBits::ALL);
		assert!(sub.bit(2));

		let exact = t.find(&Name::parse("evil.example."), TriggerType::Qname, ZoneBits::ALL);
		assert!(!exact.bit(2));
	}

	#[test]
	fn delete_prunes_empty_node() {
		let mut t = NamesTree::new();
		t.insert(&Name::parse("evil.example."), TriggerType::Qname, z(0));
		assert!(t.delete(&Name::parse("evil.example."), TriggerType::Qname, z(0)));

		let hit = t.find(&Name::parse("evil.example."), TriggerType::Qname, ZoneBits::ALL);
		assert!(hit.is_empty());
	}

	#[test]
	fn duplicate_insert_is_reported() {
		let mut t = NamesTree::new();
		assert_eq!(t.insert(&Name::parse("evil.example."), TriggerType::Qname, z(0)), InsertOutcome::Inserted);
		assert_eq!(t.insert(&Name::parse("evil.example."), TriggerType::Qname, z(0)), InsertOutcome::AlreadyPresent);
	}
}
